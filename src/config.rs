//! Compile-time configuration.
//!
//! Every parameter of the kernel is fixed at build time: CPU count, tick
//! frequency, scheduling quantum, arena capacities, stack sizes and the
//! priority-inversion protocol. Cargo features select the scheduling policy
//! the same way they select the architecture back end.

use crate::sched::criterion;

/// Upper bound on the number of CPUs any configuration may use.
///
/// Per-CPU arrays (ready queues, chosen slots, quantum counters) are sized
/// by this so the kernel state has a fixed layout regardless of features.
pub const MAX_CPUS: usize = 8;

/// Number of CPUs the build targets.
pub const CPUS: usize = if cfg!(feature = "smp") { 4 } else { 1 };

/// System timer frequency: one tick per millisecond.
pub const TICK_FREQUENCY_HZ: u64 = 1_000;

/// Time-slice quantum for timed policies, in microseconds.
pub const QUANTUM_US: u64 = 10_000;

/// Maximum number of live threads, including main and the per-CPU idles.
pub const MAX_THREADS: usize = 128;

/// Maximum number of live alarms.
pub const MAX_ALARMS: usize = 64;

/// Maximum number of live synchronizers (mutexes, semaphores, conditions).
pub const MAX_SYNCHRONIZERS: usize = 128;

/// Maximum number of resources a task ledger can track.
pub const MAX_RESOURCES: usize = MAX_THREADS + MAX_ALARMS + MAX_SYNCHRONIZERS;

/// Default thread stack size in bytes.
pub const STACK_SIZE: usize = 16 * 1024;

/// Smallest stack a thread may be created with.
pub const MIN_STACK_SIZE: usize = 1024;

/// Whether the time slicer also posts `UPDATE` to all ready threads on each
/// quantum expiry, so laxity-driven policies reorder even between voluntary
/// scheduling events.
pub const LLF_UPDATE_ON_TICK: bool = true;

/// Whether the machine reboots (instead of halting) when the last thread
/// exits.
pub const REBOOT_ON_LAST_EXIT: bool = cfg!(feature = "reboot-on-exit");

/// Priority-inversion control protocol applied by synchronizers that opt in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// No inversion control at all.
    None,
    /// Holders inherit the priority of the highest-priority blocked thread.
    Inheritance,
    /// Holders are raised to the resource ceiling on acquisition.
    Ceiling,
}

/// Protocol used by synchronizers constructed with the defaults.
pub const PRIORITY_INVERSION_PROTOCOL: Protocol = if cfg!(feature = "ceiling") {
    Protocol::Ceiling
} else {
    Protocol::Inheritance
};

// Default scheduling criterion, selected by feature the same way the
// architecture back end is. Features are additive, so the chain gives the
// more specific disciplines precedence.
#[cfg(feature = "policy-gllf")]
pub type DefaultCriterion = criterion::Gllf;

#[cfg(all(feature = "policy-pllf", not(feature = "policy-gllf")))]
pub type DefaultCriterion = criterion::Pllf;

#[cfg(all(
    feature = "policy-llf",
    not(any(feature = "policy-gllf", feature = "policy-pllf"))
))]
pub type DefaultCriterion = criterion::Llf;

#[cfg(all(
    feature = "policy-edf",
    not(any(feature = "policy-gllf", feature = "policy-pllf", feature = "policy-llf"))
))]
pub type DefaultCriterion = criterion::Edf;

#[cfg(all(
    feature = "policy-lm",
    not(any(
        feature = "policy-gllf",
        feature = "policy-pllf",
        feature = "policy-llf",
        feature = "policy-edf"
    ))
))]
pub type DefaultCriterion = criterion::Lm;

#[cfg(all(
    feature = "policy-dm",
    not(any(
        feature = "policy-gllf",
        feature = "policy-pllf",
        feature = "policy-llf",
        feature = "policy-edf",
        feature = "policy-lm"
    ))
))]
pub type DefaultCriterion = criterion::Dm;

#[cfg(all(
    feature = "policy-rm",
    not(any(
        feature = "policy-gllf",
        feature = "policy-pllf",
        feature = "policy-llf",
        feature = "policy-edf",
        feature = "policy-lm",
        feature = "policy-dm"
    ))
))]
pub type DefaultCriterion = criterion::Rm;

#[cfg(all(
    feature = "policy-fcfs",
    not(any(
        feature = "policy-gllf",
        feature = "policy-pllf",
        feature = "policy-llf",
        feature = "policy-edf",
        feature = "policy-lm",
        feature = "policy-dm",
        feature = "policy-rm"
    ))
))]
pub type DefaultCriterion = criterion::Fcfs;

#[cfg(not(any(
    feature = "policy-fcfs",
    feature = "policy-rm",
    feature = "policy-dm",
    feature = "policy-lm",
    feature = "policy-edf",
    feature = "policy-llf",
    feature = "policy-pllf",
    feature = "policy-gllf",
)))]
pub type DefaultCriterion = criterion::Rr;
