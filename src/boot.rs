//! Multicore boot arbitration.

use crate::config::MAX_CPUS;
use portable_atomic::{AtomicU32, Ordering};

/// One-shot per-step arbiter for multicore startup.
///
/// Each CPU calls [`try_acquire`](BootSynchronizer::try_acquire) at every
/// initialization step, in the same order. The first caller of a step wins
/// and performs it; everyone else skips it. Each subsequent step is
/// arbitrated afresh, without a full lock.
pub struct BootSynchronizer {
    counters: [AtomicU32; MAX_CPUS],
    max: AtomicU32,
}

impl BootSynchronizer {
    #[allow(clippy::declare_interior_mutable_const)]
    const ZERO: AtomicU32 = AtomicU32::new(0);

    pub const fn new() -> Self {
        BootSynchronizer { counters: [Self::ZERO; MAX_CPUS], max: AtomicU32::new(0) }
    }

    /// `true` for exactly one CPU per initialization step.
    pub fn try_acquire(&self, cpu: usize) -> bool {
        let step = self.counters[cpu].fetch_add(1, Ordering::AcqRel) + 1;
        if step > self.max.load(Ordering::Acquire) {
            self.max.fetch_add(1, Ordering::AcqRel);
            true
        } else {
            false
        }
    }
}

impl Default for BootSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Arbiter used by the platform bring-up.
pub static BOOT_SYNCHRONIZER: BootSynchronizer = BootSynchronizer::new();
