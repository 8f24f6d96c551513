//! Kernel state and the module-scoped handle.
//!
//! Every global of the classic design (ready queue, alarm queue, tick
//! counter, thread table, current task) lives in one [`Kernel`] struct. The
//! only statics are the cell holding the kernel and the kernel-wide
//! spinlock protecting it: every scheduler, synchronizer, thread-state or
//! alarm mutation happens under that lock, and the context-switch primitive
//! hands the lock off to the incoming thread.

use crate::arch::{Arch, DefaultArch};
use crate::config::{self, DefaultCriterion, MAX_CPUS};
use crate::error::{KernelError, KernelResult};
use crate::list::QueueHead;
use crate::sched::criterion::rank;
use crate::sched::{Criterion, Event, Scheduler};
use crate::sync::SyncTable;
use crate::task::Task;
use crate::thread::{idle_main, Configuration, State, ThreadId, ThreadTable};
use crate::time::alarm::AlarmTable;
use crate::time::{ticks_from_us, Microsecond, Tick};
use core::cell::UnsafeCell;
use log::trace;
use portable_atomic::{AtomicBool, AtomicU64, Ordering};

/// The thread kernel: arenas, queues and the time base, as one value.
pub struct Kernel<A: Arch, C: Criterion> {
    pub(crate) threads: ThreadTable<A, C>,
    pub(crate) scheduler: Scheduler<C>,
    pub(crate) suspended: QueueHead,
    pub(crate) alarms: AlarmTable,
    pub(crate) syncs: SyncTable,
    pub(crate) task: Option<Task>,
    ticks: AtomicU64,
    pub(crate) quantum_ticks: Tick,
    pub(crate) quantum_left: [Tick; MAX_CPUS],
    /// Live threads other than the idles; the machine shuts down when the
    /// last one exits.
    pub(crate) thread_count: usize,
    pub(crate) booting: bool,
    pub(crate) cpus: usize,
    initialized: bool,
}

impl<A: Arch, C: Criterion> Kernel<A, C> {
    pub const fn new(cpus: usize) -> Self {
        let cpus = if cpus > MAX_CPUS { MAX_CPUS } else { cpus };
        Kernel {
            threads: ThreadTable::new(),
            scheduler: Scheduler::new(),
            suspended: QueueHead::new(),
            alarms: AlarmTable::new(),
            syncs: SyncTable::new(),
            task: None,
            ticks: AtomicU64::new(0),
            quantum_ticks: ticks_from_us(config::QUANTUM_US),
            quantum_left: [0; MAX_CPUS],
            thread_count: 0,
            booting: true,
            cpus,
            initialized: false,
        }
    }

    /// Bring the threading system up on the calling context.
    ///
    /// The caller becomes the main thread (rank `MAIN`, running on CPU 0);
    /// one idle thread is created per CPU, and secondary CPUs start out
    /// running theirs. Returns the main thread's id.
    pub fn init(&mut self) -> KernelResult<ThreadId> {
        if self.initialized {
            return Err(KernelError::AlreadyInitialized);
        }
        self.booting = true;
        let now = self.elapsed();
        trace!("kernel init: {} cpus", self.cpus);

        let main_conf = Configuration::new(State::Running, C::from_rank(rank::MAIN, 0, now));
        let main = self.threads.allocate(&main_conf, bootstrap_stub, 0)?;
        {
            let tcb = self.threads.tcb_mut(main);
            tcb.state = State::Running;
            tcb.criterion.handle(Event::CREATE, now);
        }
        self.scheduler.set_chosen(0, Some(main));
        self.thread_count += 1;

        for cpu in 0..self.cpus {
            let conf = Configuration::new(State::Ready, C::from_rank(rank::IDLE, cpu, now));
            let idle = self.threads.allocate(&conf, idle_main, cpu)?;
            self.threads.tcb_mut(idle).criterion.handle(Event::CREATE, now);
            if cpu == 0 {
                self.threads.tcb_mut(idle).state = State::Ready;
                self.scheduler.insert(&mut self.threads, idle, now);
            } else {
                self.threads.tcb_mut(idle).state = State::Running;
                self.scheduler.set_chosen(cpu, Some(idle));
            }
        }

        self.task = Some(Task::new(main));
        self.quantum_left = [self.quantum_ticks; MAX_CPUS];
        self.booting = false;
        self.initialized = true;
        Ok(main)
    }

    /// Whether `init` has completed on this kernel.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Monotonic tick count since boot.
    pub fn elapsed(&self) -> Tick {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Timer-interrupt entry: CPU 0 advances the clock and services the
    /// alarms, then every CPU runs its time slicer.
    pub fn tick(&mut self, cpu: usize) {
        if cpu == 0 {
            let now = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
            self.alarm_service(now);
        }

        if C::TIMED && !self.booting {
            if self.quantum_left[cpu] > 0 {
                self.quantum_left[cpu] -= 1;
            }
            if self.quantum_left[cpu] == 0 {
                self.quantum_left[cpu] = self.quantum_ticks;
                if !C::DYNAMIC || config::LLF_UPDATE_ON_TICK {
                    self.reschedule(cpu);
                }
            }
        }
    }

    /// Number of live threads excluding the idles.
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    pub fn cpus(&self) -> usize {
        self.cpus
    }
}

// Entry placeholder for the bootstrap (main) thread: its context is only
// ever written by the first dispatch away from it.
fn bootstrap_stub(_arg: usize) -> i32 {
    0
}

/// Kernel-wide spinlock with exponential backoff.
pub struct KernelLock {
    locked: AtomicBool,
}

impl KernelLock {
    pub const fn new() -> Self {
        KernelLock { locked: AtomicBool::new(false) }
    }

    pub fn acquire(&self) {
        let mut backoff = 1;
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            for _ in 0..backoff {
                core::hint::spin_loop();
            }
            backoff = (backoff * 2).min(1024);
        }
    }

    pub fn release(&self) {
        self.locked.store(false, Ordering::Release);
    }

    pub fn taken(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

impl Default for KernelLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Cell holding the one kernel instance of the running system.
pub struct KernelCell(UnsafeCell<Kernel<DefaultArch, DefaultCriterion>>);

unsafe impl Sync for KernelCell {}

impl KernelCell {
    pub const fn new() -> Self {
        KernelCell(UnsafeCell::new(Kernel::new(config::CPUS)))
    }

    /// # Safety
    /// Returns a mutable reference to the kernel. The caller must hold the
    /// kernel lock.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get(&self) -> &mut Kernel<DefaultArch, DefaultCriterion> {
        &mut *self.0.get()
    }
}

pub static KERNEL: KernelCell = KernelCell::new();

static LOCK: KernelLock = KernelLock::new();

/// Run `f` on the global kernel under the kernel lock, with interrupts
/// fenced for the duration.
pub fn with<R>(f: impl FnOnce(&mut Kernel<DefaultArch, DefaultCriterion>) -> R) -> R {
    let ints = DefaultArch::int_enabled();
    DefaultArch::int_disable();
    LOCK.acquire();
    let result = f(unsafe { KERNEL.get() });
    LOCK.release();
    if ints {
        DefaultArch::int_enable();
    }
    result
}

static BOOTED: spin::Once<ThreadId> = spin::Once::new();

/// Initialize the global kernel; the caller becomes the main thread.
///
/// Exactly one caller wins; everyone else gets `AlreadyInitialized`. A
/// failure to bring the kernel up is fatal.
pub fn init() -> KernelResult<ThreadId> {
    let mut fresh = false;
    let main = BOOTED.call_once(|| {
        fresh = true;
        with(|k| k.init()).expect("kernel bring-up failed")
    });
    if fresh {
        Ok(*main)
    } else {
        Err(KernelError::AlreadyInitialized)
    }
}

/// The main thread of the global kernel, once booted.
pub fn main_thread() -> Option<ThreadId> {
    BOOTED.get().copied()
}

/// Monotonic tick count of the global kernel. Lock-free: the counter is a
/// plain atomic so busy-waits never contend with the scheduler.
pub fn elapsed() -> Tick {
    unsafe { KERNEL.get() }.elapsed()
}

/// Busy-wait on the tick counter. Never fails.
pub fn busy_wait(us: Microsecond) {
    let target = elapsed() + ticks_from_us(us);
    while elapsed() < target {
        core::hint::spin_loop();
    }
}

/// Architecture timer ISR body: alarm service plus time slicing.
pub fn tick_interrupt() {
    with(|k| k.tick(DefaultArch::cpu_id()));
}

/// Software-IPI ISR body: another CPU made a higher-priority thread ready
/// for this one, so re-enter the scheduler.
pub fn reschedule_interrupt() {
    with(|k| k.reschedule(DefaultArch::cpu_id()));
}
