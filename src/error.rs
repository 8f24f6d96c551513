#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    MaxThreadsReached,
    MaxAlarmsReached,
    MaxSynchronizersReached,
    InvalidThreadId,
    StackTooSmall,
    StackExhausted,
    NotInitialized,
    AlreadyInitialized,
}

impl KernelError {
    pub fn as_str(self) -> &'static str {
        match self {
            KernelError::MaxThreadsReached => "Maximum number of threads reached",
            KernelError::MaxAlarmsReached => "Maximum number of alarms reached",
            KernelError::MaxSynchronizersReached => "Maximum number of synchronizers reached",
            KernelError::InvalidThreadId => "Invalid thread ID provided",
            KernelError::StackTooSmall => "Requested stack size is below the minimum",
            KernelError::StackExhausted => "No stack memory left in the pool",
            KernelError::NotInitialized => "Kernel has not been initialized",
            KernelError::AlreadyInitialized => "Kernel has already been initialized",
        }
    }
}

pub type KernelResult<T> = Result<T, KernelError>;
