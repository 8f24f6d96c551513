//! Periodic threads: one released job per period.
//!
//! A periodic thread composes a thread, a semaphore initialized to zero and
//! an alarm whose handler releases exactly one job per period. The
//! scheduler stays agnostic of periodicity: a release is just a semaphore
//! signal delivered by the tick handler. The thread body runs
//! `do { job } while (wait_next())`.

use crate::arch::Arch;
use crate::config;
use crate::error::KernelResult;
use crate::kernel::Kernel;
use crate::sched::criterion::{Event, ANY};
use crate::sched::Criterion;
use crate::sync::{SyncConfig, SyncId, SyncKind};
use crate::thread::{
    Configuration, PeriodicBinding, Place, State, ThreadEntry, ThreadId,
};
use crate::time::alarm::{AlarmHandler, AlarmId, INFINITE};
use crate::time::{ticks_from_us, Microsecond};
use log::trace;

/// Configuration of a periodic thread.
///
/// Deadline defaults to the period, capacity to unknown, activation to now,
/// repetitions to infinite.
#[derive(Debug, Clone, Copy)]
pub struct RtConf {
    pub period_us: Microsecond,
    pub deadline_us: Microsecond,
    pub capacity_us: Microsecond,
    /// Delay before the first release; zero releases the first job
    /// immediately.
    pub activation_us: Microsecond,
    pub times: u32,
    /// CPU for partitioned policies; `ANY` lets the policy place the
    /// thread.
    pub cpu: usize,
    pub stack_size: usize,
    /// Create parked; the first job runs only after an explicit resume.
    pub start_suspended: bool,
}

impl RtConf {
    pub fn new(period_us: Microsecond) -> Self {
        RtConf {
            period_us,
            deadline_us: 0,
            capacity_us: 0,
            activation_us: 0,
            times: INFINITE,
            cpu: ANY,
            stack_size: config::STACK_SIZE,
            start_suspended: false,
        }
    }

    pub fn deadline(mut self, us: Microsecond) -> Self {
        self.deadline_us = us;
        self
    }

    pub fn capacity(mut self, us: Microsecond) -> Self {
        self.capacity_us = us;
        self
    }

    pub fn activation(mut self, us: Microsecond) -> Self {
        self.activation_us = us;
        self
    }

    pub fn times(mut self, n: u32) -> Self {
        self.times = n;
        self
    }

    pub fn cpu(mut self, cpu: usize) -> Self {
        self.cpu = cpu;
        self
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    pub fn suspended(mut self) -> Self {
        self.start_suspended = true;
        self
    }
}

impl<A: Arch, C: Criterion> Kernel<A, C> {
    /// Create a periodic thread: the thread itself (suspended until its
    /// first release), the release semaphore and the release alarm.
    pub fn spawn_periodic(
        &mut self,
        conf: RtConf,
        entry: ThreadEntry,
        arg: usize,
    ) -> KernelResult<(ThreadId, SyncId, AlarmId)> {
        let now = self.elapsed();
        let criterion =
            C::real_time(conf.period_us, conf.deadline_us, conf.capacity_us, conf.cpu, now);
        let thread = self.spawn(
            Configuration::new(State::Suspended, criterion).stack_size(conf.stack_size),
            entry,
            arg,
        )?;

        let semaphore = self.create_synchronizer(SyncKind::Semaphore, 0, SyncConfig::default())?;
        // Dynamic policies need the release delivered to the criterion as
        // well; the deferred-activation path needs the resume side of the
        // same handler.
        let handler = if C::DYNAMIC || conf.activation_us > 0 {
            AlarmHandler::JobRelease { semaphore, thread }
        } else {
            AlarmHandler::SemaphoreV(semaphore)
        };
        let alarm = self.create_alarm(conf.period_us, handler, conf.times)?;
        self.threads.tcb_mut(thread).periodic = Some(PeriodicBinding { semaphore, alarm });
        trace!("spawn_periodic(p={}us, x={}) => thread {}", conf.period_us, conf.times, thread);

        if conf.activation_us > 0 {
            // First release at the activation time; the rebase keeps every
            // later one a full period apart.
            let first = self.elapsed() + ticks_from_us(conf.activation_us);
            self.alarms.dequeue(alarm);
            self.alarms.enqueue(alarm, first);
        } else if !conf.start_suspended {
            // Initial release: the first job runs immediately.
            self.resume(thread)?;
            let now = self.elapsed();
            self.threads.tcb_mut(thread).criterion.handle(Event::JOB_RELEASE, now);
            if let Place::Ready(_) = self.threads.tcb(thread).place {
                self.scheduler.remove(&mut self.threads, thread);
                self.scheduler.insert(&mut self.threads, thread, now);
            }
        }

        Ok((thread, semaphore, alarm))
    }

    /// End the current job and block until the next release.
    ///
    /// Returns `false` once the alarm has no repetitions left, so the
    /// thread's job loop exits.
    pub fn wait_next(&mut self, cpu: usize) -> bool {
        let Some(me) = self.current(cpu) else { return false };
        let Some(binding) = self.threads.tcb(me).periodic else { return false };
        let now = self.elapsed();
        trace!("wait_next(thread={}, times={})", me, self.alarm_times(binding.alarm));

        self.threads.tcb_mut(me).criterion.handle(Event::JOB_FINISH, now);

        let more = self.alarm_times(binding.alarm) != 0;
        if more {
            self.sem_p(cpu, binding.semaphore);
        }
        more
    }
}

use crate::arch::DefaultArch as A;

/// Handle to a periodic thread on the global kernel.
pub struct PeriodicThread {
    thread: ThreadId,
    semaphore: SyncId,
    alarm: AlarmId,
}

impl PeriodicThread {
    /// Infinite periodic thread with default configuration.
    pub fn new(period_us: Microsecond, entry: ThreadEntry, arg: usize) -> KernelResult<Self> {
        Self::with_config(RtConf::new(period_us), entry, arg)
    }

    pub fn with_config(conf: RtConf, entry: ThreadEntry, arg: usize) -> KernelResult<Self> {
        crate::kernel::with(|k| k.spawn_periodic(conf, entry, arg))
            .map(|(thread, semaphore, alarm)| PeriodicThread { thread, semaphore, alarm })
    }

    pub fn id(&self) -> ThreadId {
        self.thread
    }

    /// Block between jobs; `false` ends the job loop. Called by the
    /// thread's own entry function.
    pub fn wait_next() -> bool {
        crate::kernel::with(|k| k.wait_next(A::cpu_id()))
    }

    pub fn join(&self) -> i32 {
        loop {
            if let Some(status) =
                crate::kernel::with(|k| k.join_prepare(A::cpu_id(), self.thread))
            {
                return status;
            }
        }
    }

    pub fn resume(&self) {
        let _ = crate::kernel::with(|k| k.resume(self.thread));
    }

    pub fn period_us(&self) -> Microsecond {
        crate::kernel::with(|k| k.alarm_period_us(self.alarm))
    }

    pub fn set_period(&self, period_us: Microsecond) {
        crate::kernel::with(|k| k.alarm_set_period(self.alarm, period_us));
    }

    pub fn priority(&self) -> i32 {
        crate::kernel::with(|k| k.rank_of(self.thread))
    }

    pub fn statistics(&self) -> crate::sched::Statistics {
        crate::kernel::with(|k| *k.statistics_of(self.thread))
    }
}

impl Drop for PeriodicThread {
    fn drop(&mut self) {
        crate::kernel::with(|k| {
            k.destroy_alarm(self.alarm);
            k.destroy_synchronizer(self.semaphore);
            let _ = k.destroy(self.thread);
        });
    }
}

/// Real-time thread: a periodic thread with explicit deadline, capacity,
/// activation delay and repetition count.
pub struct RtThread {
    inner: PeriodicThread,
}

impl RtThread {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        entry: ThreadEntry,
        arg: usize,
        period_us: Microsecond,
        deadline_us: Microsecond,
        capacity_us: Microsecond,
        activation_us: Microsecond,
        times: u32,
    ) -> KernelResult<Self> {
        let conf = RtConf::new(period_us)
            .deadline(deadline_us)
            .capacity(capacity_us)
            .activation(activation_us)
            .times(times);
        PeriodicThread::with_config(conf, entry, arg).map(|inner| RtThread { inner })
    }

    pub fn join(&self) -> i32 {
        self.inner.join()
    }

    pub fn id(&self) -> ThreadId {
        self.inner.id()
    }
}

