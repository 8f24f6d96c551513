#![no_std]

pub mod arch;
pub mod boot;
pub mod config;
pub mod error;
pub mod kernel;
pub mod list;
pub mod mem;
pub mod rt;
pub mod sched;
pub mod sync;
pub mod task;
pub mod thread;
pub mod time;

#[cfg(any(test, feature = "std"))]
extern crate std;

#[cfg(all(not(test), not(feature = "std")))]
use core::panic::PanicInfo;

#[cfg(all(not(test), not(feature = "std")))]
#[panic_handler]
fn panic(_info: &PanicInfo) -> ! {
    loop {}
}

pub use boot::BootSynchronizer;
pub use config::Protocol;
pub use error::{KernelError, KernelResult};
pub use kernel::{init, reschedule_interrupt, tick_interrupt, Kernel};
pub use rt::{PeriodicThread, RtConf, RtThread};
pub use sched::criterion::{rank, Criterion, Event, Statistics};
pub use sync::{Condition, Mutex, Semaphore, SyncConfig};
pub use thread::{exit, yield_now, Configuration, State, Thread, ThreadEntry, ThreadId};
pub use time::{Alarm, AlarmHandler, Chronometer, Delay, Microsecond, Tick, INFINITE};
