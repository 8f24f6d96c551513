//! Time base: ticks, conversions and simple time-keeping utilities.
//!
//! The fundamental unit is the tick, the period of the system timer
//! interrupt. Everything that deals in time (alarms, quanta, real-time
//! criteria) converts microseconds to ticks once, up front, and then counts
//! ticks.

pub mod alarm;

pub use alarm::{Alarm, AlarmHandler, INFINITE};

use crate::config::TICK_FREQUENCY_HZ;

/// Monotonic tick count.
pub type Tick = u64;

/// Time expressed in microseconds.
pub type Microsecond = u64;

/// Convert a duration in microseconds to ticks, rounding up so a nonzero
/// request never degenerates to a zero-tick alarm.
pub const fn ticks_from_us(us: Microsecond) -> Tick {
    (us * TICK_FREQUENCY_HZ + 999_999) / 1_000_000
}

/// Convert a tick count back to microseconds.
pub const fn us_from_ticks(ticks: Tick) -> Microsecond {
    ticks * 1_000_000 / TICK_FREQUENCY_HZ
}

/// Stopwatch over the global tick counter.
///
/// Mirrors the classic chronometer used by application code: start, stop,
/// read the accumulated time in microseconds.
#[derive(Debug, Default, Clone, Copy)]
pub struct Chronometer {
    start: Tick,
    stop: Tick,
    running: bool,
}

impl Chronometer {
    pub const fn new() -> Self {
        Chronometer { start: 0, stop: 0, running: false }
    }

    pub fn start(&mut self) {
        self.start = crate::kernel::elapsed();
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.stop = crate::kernel::elapsed();
        self.running = false;
    }

    pub fn reset(&mut self) {
        self.start = crate::kernel::elapsed();
        self.stop = self.start;
    }

    /// Accumulated time in microseconds.
    pub fn read(&self) -> Microsecond {
        let end = if self.running { crate::kernel::elapsed() } else { self.stop };
        us_from_ticks(end.saturating_sub(self.start))
    }
}

/// Busy-wait for the given number of microseconds.
///
/// Constructing a `Delay` spins on the tick counter until the deadline
/// passes; it never blocks and never fails.
pub struct Delay;

impl Delay {
    pub fn new(us: Microsecond) -> Self {
        crate::kernel::busy_wait(us);
        Delay
    }
}
