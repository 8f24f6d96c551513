//! Alarms: deadline-ordered one-shot and periodic handler activations.
//!
//! The request queue is ordered by absolute deadline in ticks. The tick
//! handler amortizes its work through a countdown to the next due entry and
//! a preloaded handler, so most ticks do constant small work: decrement,
//! occasionally fire, pop and reload.
//!
//! Handlers run inside the tick interrupt with the kernel lock held: they
//! must not block and must not yield.

use crate::arch::Arch;
use crate::config::MAX_ALARMS;
use crate::error::{KernelError, KernelResult};
use crate::kernel::Kernel;
use crate::list::{self, Link, LinkedArena, QueueHead};
use crate::sched::criterion::Event;
use crate::sched::Criterion;
use crate::sync::SyncId;
use crate::thread::{Place, ThreadId};
use crate::time::{ticks_from_us, us_from_ticks, Microsecond, Tick};
use log::trace;

/// Index into the alarm arena.
pub type AlarmId = usize;

/// Repeat forever.
pub const INFINITE: u32 = u32::MAX;

/// What a due alarm does.
///
/// The variants cover the classic handler objects: a plain function, the
/// periodic-release signals, and the thread/synchronizer triggers.
#[derive(Debug, Clone, Copy)]
pub enum AlarmHandler {
    /// Call a plain function.
    Function(fn()),
    /// Release one token of a semaphore.
    SemaphoreV(SyncId),
    /// Periodic job release under a dynamic policy: post `JOB_RELEASE` to
    /// the thread's criterion, then release the semaphore.
    JobRelease { semaphore: SyncId, thread: ThreadId },
    /// Resume a suspended thread.
    ThreadResume(ThreadId),
    /// Unlock a mutex.
    MutexUnlock(SyncId),
    /// Signal a condition variable.
    ConditionSignal(SyncId),
}

pub(crate) struct AlarmSlot {
    pub period: Tick,
    pub times: u32,
    pub handler: AlarmHandler,
    pub link: Link,
    pub queued: bool,
}

pub(crate) struct AlarmArena {
    slots: [Option<AlarmSlot>; MAX_ALARMS],
}

impl AlarmArena {
    pub const fn new() -> Self {
        AlarmArena { slots: [const { None }; MAX_ALARMS] }
    }

    fn allocate(&mut self, period: Tick, handler: AlarmHandler, times: u32) -> KernelResult<AlarmId> {
        let id = self
            .slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(KernelError::MaxAlarmsReached)?;
        self.slots[id] = Some(AlarmSlot {
            period,
            times,
            handler,
            link: Link::new(),
            queued: false,
        });
        Ok(id)
    }

    pub fn exists(&self, id: AlarmId) -> bool {
        self.slots.get(id).map_or(false, |s| s.is_some())
    }

    pub fn free(&mut self, id: AlarmId) {
        self.slots[id] = None;
    }

    pub fn slot(&self, id: AlarmId) -> &AlarmSlot {
        self.slots[id].as_ref().expect("stale alarm index")
    }

    pub fn slot_mut(&mut self, id: AlarmId) -> &mut AlarmSlot {
        self.slots[id].as_mut().expect("stale alarm index")
    }
}

impl LinkedArena for AlarmArena {
    fn link(&self, index: usize) -> &Link {
        &self.slot(index).link
    }
    fn link_mut(&mut self, index: usize) -> &mut Link {
        &mut self.slot_mut(index).link
    }
}

/// Alarm arena plus the pending-request queue and the amortized tick state.
pub(crate) struct AlarmTable {
    pub arena: AlarmArena,
    pub queue: QueueHead,
    /// Ticks left until the preloaded handler fires.
    pub next_tick: Tick,
    /// Alarm preloaded from the queue head.
    pub next_handler: Option<(AlarmId, AlarmHandler)>,
    seq: u64,
}

impl AlarmTable {
    pub const fn new() -> Self {
        AlarmTable {
            arena: AlarmArena::new(),
            queue: QueueHead::new(),
            next_tick: 0,
            next_handler: None,
            seq: 0,
        }
    }

    pub(crate) fn enqueue(&mut self, id: AlarmId, deadline: Tick) {
        self.seq += 1;
        {
            let slot = self.arena.slot_mut(id);
            slot.link.key = deadline as i64;
            slot.link.seq = self.seq;
        }
        list::insert_ordered(&mut self.arena, &mut self.queue, id);
        self.arena.slot_mut(id).queued = true;
    }

    pub(crate) fn dequeue(&mut self, id: AlarmId) {
        if self.arena.slot(id).queued {
            list::remove(&mut self.arena, &mut self.queue, id);
            self.arena.slot_mut(id).queued = false;
        }
        // Recall a pending activation of this alarm; the service reloads
        // from the queue head on the next tick.
        if let Some((loaded, _)) = self.next_handler {
            if loaded == id {
                self.next_handler = None;
                self.next_tick = 0;
            }
        }
    }
}

impl<A: Arch, C: Criterion> Kernel<A, C> {
    /// Register a handler to fire every `period_us`, `times` times.
    ///
    /// A zero period with a single repetition fires synchronously and is
    /// never enqueued.
    pub fn create_alarm(
        &mut self,
        period_us: Microsecond,
        handler: AlarmHandler,
        times: u32,
    ) -> KernelResult<AlarmId> {
        if !self.is_initialized() {
            return Err(KernelError::NotInitialized);
        }
        let ticks = ticks_from_us(period_us);
        let now = self.elapsed();
        let id = self.alarms.arena.allocate(ticks, handler, times)?;
        trace!("create_alarm(p={}us, x={}) => {}", period_us, times, id);

        if ticks > 0 {
            self.alarms.enqueue(id, now + ticks);
        } else {
            debug_assert_eq!(times, 1);
            self.alarms.arena.slot_mut(id).times = 0;
            self.fire_handler(handler, now);
        }
        self.enroll(crate::task::Resource::Alarm(id));
        Ok(id)
    }

    pub fn destroy_alarm(&mut self, id: AlarmId) {
        if !self.alarms.arena.exists(id) {
            return;
        }
        trace!("destroy_alarm({})", id);
        self.alarms.dequeue(id);
        self.alarms.arena.free(id);
        self.dismiss(crate::task::Resource::Alarm(id));
    }

    /// Rearm the alarm a full period from now.
    pub fn alarm_reset(&mut self, id: AlarmId) {
        let now = self.elapsed();
        self.alarms.dequeue(id);
        let deadline = now + self.alarms.arena.slot(id).period;
        self.alarms.enqueue(id, deadline);
    }

    /// Change the period and rearm.
    pub fn alarm_set_period(&mut self, id: AlarmId, period_us: Microsecond) {
        let now = self.elapsed();
        self.alarms.dequeue(id);
        let ticks = ticks_from_us(period_us);
        self.alarms.arena.slot_mut(id).period = ticks;
        self.alarms.enqueue(id, now + ticks);
    }

    /// Remaining activations (`INFINITE` for unbounded alarms).
    pub fn alarm_times(&self, id: AlarmId) -> u32 {
        self.alarms.arena.slot(id).times
    }

    pub fn alarm_period_us(&self, id: AlarmId) -> Microsecond {
        us_from_ticks(self.alarms.arena.slot(id).period)
    }

    /// Tick-interrupt half of the alarm service.
    ///
    /// Fires the preloaded handler when its countdown expires, then pops
    /// the queue head: its repetition count is charged, it is rebased one
    /// period past its old deadline while still active, and it becomes the
    /// new preloaded handler.
    pub(crate) fn alarm_service(&mut self, now: Tick) {
        if self.alarms.next_tick > 0 {
            self.alarms.next_tick -= 1;
        }
        while self.alarms.next_tick == 0 {
            if let Some((_, handler)) = self.alarms.next_handler.take() {
                trace!("alarm handler fires at tick {}", now);
                self.fire_handler(handler, now);
            }

            let Some(id) = list::pop_head(&mut self.alarms.arena, &mut self.alarms.queue) else {
                break;
            };
            let due = self.alarms.arena.slot(id).link.key as Tick;
            let (handler, reinsert) = {
                let slot = self.alarms.arena.slot_mut(id);
                slot.queued = false;
                if slot.times != INFINITE {
                    slot.times = slot.times.saturating_sub(1);
                }
                (slot.handler, slot.times != 0)
            };
            if reinsert {
                let period = self.alarms.arena.slot(id).period;
                self.alarms.enqueue(id, due + period);
            }

            self.alarms.next_handler = Some((id, handler));
            self.alarms.next_tick = due.saturating_sub(now);
            if self.alarms.next_tick > 0 {
                break;
            }
        }
    }

    fn fire_handler(&mut self, handler: AlarmHandler, now: Tick) {
        match handler {
            AlarmHandler::Function(f) => f(),
            AlarmHandler::SemaphoreV(sem) => {
                if self.syncs.exists(sem) {
                    self.sem_v(0, sem);
                }
            }
            AlarmHandler::JobRelease { semaphore, thread } => {
                if self.threads.exists(thread) {
                    self.threads.tcb_mut(thread).criterion.handle(Event::JOB_RELEASE, now);
                    match self.threads.tcb(thread).place {
                        Place::Ready(_) => {
                            // The release changed the rank; restore ordering.
                            self.scheduler.remove(&mut self.threads, thread);
                            self.scheduler.insert(&mut self.threads, thread, now);
                        }
                        Place::Suspended => {
                            // Deferred first activation: the job loop starts
                            // now, no token to consume.
                            let _ = self.resume(thread);
                            return;
                        }
                        _ => {}
                    }
                }
                if self.syncs.exists(semaphore) {
                    self.sem_v(0, semaphore);
                }
            }
            AlarmHandler::ThreadResume(thread) => {
                if self.threads.exists(thread) && self.threads.tcb(thread).place == Place::Suspended
                {
                    let _ = self.resume(thread);
                }
            }
            AlarmHandler::MutexUnlock(mutex) => {
                if self.syncs.exists(mutex) {
                    self.mutex_unlock(0, mutex);
                }
            }
            AlarmHandler::ConditionSignal(cond) => {
                if self.syncs.exists(cond) {
                    self.cond_signal(cond);
                }
            }
        }
    }
}

use crate::arch::DefaultArch as DA;
use crate::config::DefaultCriterion as DC;

/// Handle to a registered alarm.
pub struct Alarm {
    id: AlarmId,
}

impl Alarm {
    pub fn new(period_us: Microsecond, handler: AlarmHandler, times: u32) -> KernelResult<Alarm> {
        crate::kernel::with(|k: &mut Kernel<DA, DC>| k.create_alarm(period_us, handler, times))
            .map(|id| Alarm { id })
    }

    pub fn id(&self) -> AlarmId {
        self.id
    }

    pub fn reset(&self) {
        crate::kernel::with(|k: &mut Kernel<DA, DC>| k.alarm_reset(self.id));
    }

    pub fn set_period(&self, period_us: Microsecond) {
        crate::kernel::with(|k: &mut Kernel<DA, DC>| k.alarm_set_period(self.id, period_us));
    }

    pub fn times(&self) -> u32 {
        crate::kernel::with(|k: &mut Kernel<DA, DC>| k.alarm_times(self.id))
    }

    pub fn period_us(&self) -> Microsecond {
        crate::kernel::with(|k: &mut Kernel<DA, DC>| k.alarm_period_us(self.id))
    }

    /// Busy-wait for `us` microseconds on the tick counter. Never fails
    /// and cannot be interrupted.
    pub fn delay(us: Microsecond) {
        crate::kernel::busy_wait(us);
    }
}

impl Drop for Alarm {
    fn drop(&mut self) {
        crate::kernel::with(|k: &mut Kernel<DA, DC>| k.destroy_alarm(self.id));
    }
}
