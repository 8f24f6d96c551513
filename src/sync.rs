//! Synchronizers: mutex, counting semaphore and condition variable.
//!
//! All three share one representation: an ordered waiting queue of blocked
//! threads, a granted set, and the priority-inversion bookkeeping. A mutex
//! transfers ownership directly to the highest-priority waiter on unlock; a
//! semaphore hands its token the same way. Priority inversion is solved per
//! synchronizer by inheritance or ceiling: holders are boosted while a
//! higher-priority thread is blocked on something they hold, transitively,
//! and restored when they release the synchronizer that caused the boost.

use crate::arch::Arch;
use crate::config::{Protocol, MAX_SYNCHRONIZERS, PRIORITY_INVERSION_PROTOCOL};
use crate::error::{KernelError, KernelResult};
use crate::kernel::Kernel;
use crate::list::QueueHead;
use crate::sched::criterion::rank;
use crate::sched::Criterion;
use crate::thread::ThreadId;
use heapless::Vec;
use log::{trace, warn};
use portable_atomic::{AtomicBool, AtomicI64, Ordering};

/// Index into the synchronizer arena.
pub type SyncId = usize;

/// Most holders a granted set tracks (a mutex uses exactly one).
const MAX_GRANTED: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    Mutex,
    Semaphore,
    Condition,
}

/// Per-synchronizer configuration.
#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    pub protocol: Protocol,
    /// Ceiling rank used by [`Protocol::Ceiling`].
    pub ceiling: i32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig { protocol: PRIORITY_INVERSION_PROTOCOL, ceiling: rank::CEILING }
    }
}

impl SyncConfig {
    /// Disable inversion control for this synchronizer.
    pub fn plain() -> Self {
        SyncConfig { protocol: Protocol::None, ceiling: rank::CEILING }
    }

    /// Ceiling protocol with a per-resource ceiling rank.
    pub fn ceiling(ceiling: i32) -> Self {
        SyncConfig { protocol: Protocol::Ceiling, ceiling }
    }
}

pub(crate) struct SyncSlot {
    pub kind: SyncKind,
    /// Mutex test-and-set flag (fast path ahead of queue mutation).
    pub locked: AtomicBool,
    /// Semaphore counter (fast path ahead of queue mutation).
    pub value: AtomicI64,
    pub waiting: QueueHead,
    /// Threads currently granted the resource.
    pub granted: Vec<ThreadId, MAX_GRANTED>,
    /// Thread whose priority answers for this resource.
    pub holder: Option<ThreadId>,
    /// Priority currently demanded of the holder by this resource.
    pub locked_rank: i32,
    /// Links in the holder's held-synchronizer list.
    pub held_next: Option<SyncId>,
    pub held_prev: Option<SyncId>,
    pub protocol: Protocol,
    pub ceiling: i32,
}

pub(crate) struct SyncTable {
    slots: [Option<SyncSlot>; MAX_SYNCHRONIZERS],
}

impl SyncTable {
    pub const fn new() -> Self {
        SyncTable { slots: [const { None }; MAX_SYNCHRONIZERS] }
    }

    pub fn allocate(&mut self, kind: SyncKind, value: i64, cfg: SyncConfig) -> KernelResult<SyncId> {
        let id = self
            .slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(KernelError::MaxSynchronizersReached)?;
        self.slots[id] = Some(SyncSlot {
            kind,
            locked: AtomicBool::new(false),
            value: AtomicI64::new(value),
            waiting: QueueHead::new(),
            granted: Vec::new(),
            holder: None,
            locked_rank: rank::IDLE,
            held_next: None,
            held_prev: None,
            protocol: cfg.protocol,
            ceiling: cfg.ceiling,
        });
        Ok(id)
    }

    pub fn free(&mut self, id: SyncId) {
        self.slots[id] = None;
    }

    pub fn exists(&self, id: SyncId) -> bool {
        self.slots.get(id).map_or(false, |s| s.is_some())
    }

    pub fn slot(&self, id: SyncId) -> &SyncSlot {
        self.slots[id].as_ref().expect("stale synchronizer index")
    }

    pub fn slot_mut(&mut self, id: SyncId) -> &mut SyncSlot {
        self.slots[id].as_mut().expect("stale synchronizer index")
    }

    pub fn waiting_mut(&mut self, id: SyncId) -> &mut QueueHead {
        &mut self.slot_mut(id).waiting
    }
}

impl<A: Arch, C: Criterion> Kernel<A, C> {
    pub fn create_synchronizer(
        &mut self,
        kind: SyncKind,
        value: i64,
        cfg: SyncConfig,
    ) -> KernelResult<SyncId> {
        if !self.is_initialized() {
            return Err(KernelError::NotInitialized);
        }
        let id = self.syncs.allocate(kind, value, cfg)?;
        trace!("create_synchronizer(kind={:?}) => {}", kind, id);
        self.enroll(match kind {
            SyncKind::Mutex => crate::task::Resource::Mutex(id),
            SyncKind::Semaphore => crate::task::Resource::Semaphore(id),
            SyncKind::Condition => crate::task::Resource::Condition(id),
        });
        Ok(id)
    }

    /// Destroy a synchronizer, waking any blocked clients.
    ///
    /// Woken threads observe a spurious wake and must re-check their
    /// condition.
    pub fn destroy_synchronizer(&mut self, id: SyncId) {
        if !self.syncs.exists(id) {
            return;
        }
        trace!("destroy_synchronizer({})", id);
        if self.syncs.slot(id).holder.is_some() {
            self.inversion_release(id);
        }
        if !self.syncs.slot(id).waiting.is_empty() {
            warn!("destroy_synchronizer({}) called with active blocked clients!", id);
            self.wakeup_all_from(id);
        }
        let kind = self.syncs.slot(id).kind;
        self.syncs.free(id);
        self.dismiss(match kind {
            SyncKind::Mutex => crate::task::Resource::Mutex(id),
            SyncKind::Semaphore => crate::task::Resource::Semaphore(id),
            SyncKind::Condition => crate::task::Resource::Condition(id),
        });
    }

    // -- Mutex ------------------------------------------------------------

    /// Returns `true` when the lock was taken on the fast path. On `false`
    /// the caller blocked; by the time it runs again the unlock path has
    /// transferred ownership to it.
    pub fn mutex_lock(&mut self, cpu: usize, id: SyncId) -> bool {
        let me = self.current(cpu).expect("lock from no running thread");
        debug_assert_eq!(self.syncs.slot(id).kind, SyncKind::Mutex);
        trace!("mutex_lock({}) [thread={}]", id, me);

        if self.syncs.slot(id).locked.swap(true, Ordering::AcqRel) {
            self.inversion_blocked(id, me);
            self.sleep_on(cpu, id);
            false
        } else {
            let _ = self.syncs.slot_mut(id).granted.push(me);
            self.inversion_acquire(id, me);
            true
        }
    }

    pub fn mutex_unlock(&mut self, cpu: usize, id: SyncId) {
        let me = self.current(cpu).expect("unlock from no running thread");
        debug_assert_eq!(self.syncs.slot(id).kind, SyncKind::Mutex);
        trace!("mutex_unlock({}) [thread={}]", id, me);

        self.inversion_release(id);
        self.revoke_grant(id, me);

        if self.syncs.slot(id).waiting.is_empty() {
            self.syncs.slot(id).locked.store(false, Ordering::Release);
        } else {
            // Ownership transfers atomically: the flag stays set.
            if let Some(next) = self.wakeup_core(id) {
                let _ = self.syncs.slot_mut(id).granted.push(next);
                self.inversion_acquire(id, next);
                if C::PREEMPTIVE && !self.booting {
                    self.reschedule_for(next);
                }
            }
        }
    }

    // -- Semaphore --------------------------------------------------------

    /// Returns `true` when a token was taken; `false` when the caller
    /// blocked waiting for one.
    pub fn sem_p(&mut self, cpu: usize, id: SyncId) -> bool {
        let me = self.current(cpu).expect("p() from no running thread");
        debug_assert_eq!(self.syncs.slot(id).kind, SyncKind::Semaphore);
        let prior = self.syncs.slot(id).value.fetch_sub(1, Ordering::AcqRel);
        trace!("sem_p({}) [thread={}, value={}]", id, me, prior - 1);

        if prior < 1 {
            self.inversion_blocked(id, me);
            self.sleep_on(cpu, id);
            false
        } else {
            if prior == 1 {
                // Last token: this thread now answers for the resource.
                let _ = self.syncs.slot_mut(id).granted.push(me);
                self.inversion_acquire(id, me);
            }
            true
        }
    }

    pub fn sem_v(&mut self, cpu: usize, id: SyncId) {
        let me = self.current(cpu).expect("v() from no running thread");
        debug_assert_eq!(self.syncs.slot(id).kind, SyncKind::Semaphore);
        let prior = self.syncs.slot(id).value.fetch_add(1, Ordering::AcqRel);
        trace!("sem_v({}) [thread={}, value={}]", id, me, prior + 1);

        if prior < 0 {
            // The token passes straight to the highest-priority waiter.
            self.inversion_release(id);
            self.revoke_grant(id, me);
            if let Some(next) = self.wakeup_core(id) {
                let _ = self.syncs.slot_mut(id).granted.push(next);
                self.inversion_acquire(id, next);
                if C::PREEMPTIVE && !self.booting {
                    self.reschedule_for(next);
                }
            }
        } else if prior == 0 {
            // Back from exhausted to free: the holder unsubscribes.
            self.inversion_release(id);
            self.revoke_grant(id, me);
        }
    }

    pub fn sem_value(&self, id: SyncId) -> i64 {
        self.syncs.slot(id).value.load(Ordering::Acquire)
    }

    // -- Condition --------------------------------------------------------

    pub fn cond_wait(&mut self, cpu: usize, id: SyncId) {
        debug_assert_eq!(self.syncs.slot(id).kind, SyncKind::Condition);
        self.sleep_on(cpu, id);
    }

    pub fn cond_signal(&mut self, id: SyncId) {
        debug_assert_eq!(self.syncs.slot(id).kind, SyncKind::Condition);
        let _ = self.wakeup_from(id);
    }

    pub fn cond_broadcast(&mut self, id: SyncId) {
        debug_assert_eq!(self.syncs.slot(id).kind, SyncKind::Condition);
        self.wakeup_all_from(id);
    }

    // -- Introspection used by the inversion machinery and tests ----------

    fn revoke_grant(&mut self, id: SyncId, thread: ThreadId) {
        let slot = self.syncs.slot_mut(id);
        if let Some(at) = slot.granted.iter().position(|&t| t == thread) {
            slot.granted.swap_remove(at);
        }
    }

    pub fn holder_of(&self, id: SyncId) -> Option<ThreadId> {
        self.syncs.slot(id).holder
    }

    pub fn granted_of(&self, id: SyncId) -> &[ThreadId] {
        &self.syncs.slot(id).granted
    }

    pub fn waiters_of(&self, id: SyncId) -> usize {
        self.syncs.slot(id).waiting.len
    }

    // -- Priority-inversion control ---------------------------------------

    /// Record `thread` as the critical-section holder of `sync` and, under
    /// the ceiling protocol, raise it to the resource ceiling.
    pub(crate) fn inversion_acquire(&mut self, sync: SyncId, thread: ThreadId) {
        let protocol = self.syncs.slot(sync).protocol;
        if protocol == Protocol::None {
            return;
        }
        let natural = self.threads.tcb(thread).natural_rank;
        if natural == rank::MAIN || natural == rank::IDLE {
            return;
        }

        if let Some(old) = self.syncs.slot(sync).holder {
            if old != thread {
                // Stale holder left behind by misuse; detach it.
                self.held_remove(old, sync);
            }
        }

        // First resource held: snapshot the unboosted rank. Dynamic
        // policies move their ranks between acquisitions, so the snapshot
        // is taken here, not at creation.
        if self.threads.tcb(thread).held.is_none() {
            let current = self.threads.tcb(thread).criterion.rank();
            self.threads.tcb_mut(thread).natural_rank = current;
        }
        let natural = self.threads.tcb(thread).natural_rank;

        self.syncs.slot_mut(sync).holder = Some(thread);
        self.held_push(thread, sync);
        self.syncs.slot_mut(sync).locked_rank = natural;

        if protocol == Protocol::Ceiling {
            let ceiling = self.syncs.slot(sync).ceiling;
            self.syncs.slot_mut(sync).locked_rank = ceiling;
            if ceiling < self.threads.tcb(thread).criterion.rank() {
                self.apply_rank(thread, ceiling);
                self.reprioritize_reschedule(thread);
            }
        }
    }

    /// Release `sync` from its holder and restore the holder's effective
    /// priority to the highest still demanded by its remaining held
    /// synchronizers, or to its natural priority.
    pub(crate) fn inversion_release(&mut self, sync: SyncId) {
        let protocol = self.syncs.slot(sync).protocol;
        if protocol == Protocol::None {
            return;
        }
        let Some(holder) = self.syncs.slot(sync).holder else {
            return;
        };
        let natural = self.threads.tcb(holder).natural_rank;
        if natural == rank::MAIN || natural == rank::IDLE {
            return;
        }

        self.held_remove(holder, sync);
        {
            let slot = self.syncs.slot_mut(sync);
            slot.holder = None;
            slot.locked_rank = rank::IDLE;
        }

        let mut new_rank = natural;
        let mut cursor = self.threads.tcb(holder).held;
        while let Some(s) = cursor {
            let slot = self.syncs.slot(s);
            if slot.locked_rank < new_rank {
                new_rank = slot.locked_rank;
            }
            cursor = slot.held_next;
        }

        // Restoration only ever lowers priority; a rank already past the
        // snapshot moved on its own (dynamic policy) and is left alone.
        if new_rank > self.threads.tcb(holder).criterion.rank() {
            self.apply_rank(holder, new_rank);
            self.reprioritize_reschedule(holder);
        }
    }

    /// A thread is about to block on `sync`: boost the holder chain so no
    /// scheduling decision can observe the pre-boost priorities.
    pub(crate) fn inversion_blocked(&mut self, sync: SyncId, blocked: ThreadId) {
        let blocked_rank = self.threads.tcb(blocked).criterion.rank();
        if blocked_rank == rank::MAIN || blocked_rank == rank::IDLE {
            return;
        }

        let mut cursor = sync;
        // Bounded walk: the held/wait-for chain cannot be longer than the
        // synchronizer arena.
        for _ in 0..MAX_SYNCHRONIZERS {
            let slot = self.syncs.slot(cursor);
            if slot.protocol == Protocol::None {
                return;
            }
            let Some(holder) = slot.holder else {
                return;
            };
            if blocked_rank >= self.threads.tcb(holder).criterion.rank() {
                return;
            }

            let boosted = if slot.protocol == Protocol::Ceiling {
                slot.ceiling
            } else {
                blocked_rank
            };
            self.syncs.slot_mut(cursor).locked_rank = boosted;
            self.apply_rank(holder, boosted);

            // The holder may itself be blocked: propagate transitively.
            match self.threads.tcb(holder).blocked_on {
                Some(next) => cursor = next,
                None => return,
            }
        }
    }

    /// After an effective-priority change, force the affected CPU to
    /// re-evaluate its schedule.
    fn reprioritize_reschedule(&mut self, thread: ThreadId) {
        if !C::PREEMPTIVE || self.booting {
            return;
        }
        for cpu in 0..self.cpus {
            if self.scheduler.chosen(cpu) == Some(thread) {
                if cpu == A::cpu_id() {
                    self.reschedule(cpu);
                } else {
                    A::send_ipi(cpu);
                }
                return;
            }
        }
        self.reschedule_for(thread);
    }

    fn held_push(&mut self, thread: ThreadId, sync: SyncId) {
        let head = self.threads.tcb(thread).held;
        {
            let slot = self.syncs.slot_mut(sync);
            slot.held_prev = None;
            slot.held_next = head;
        }
        if let Some(h) = head {
            self.syncs.slot_mut(h).held_prev = Some(sync);
        }
        self.threads.tcb_mut(thread).held = Some(sync);
    }

    fn held_remove(&mut self, thread: ThreadId, sync: SyncId) {
        let (prev, next) = {
            let slot = self.syncs.slot(sync);
            (slot.held_prev, slot.held_next)
        };
        match prev {
            Some(p) => self.syncs.slot_mut(p).held_next = next,
            None => {
                if self.threads.tcb(thread).held == Some(sync) {
                    self.threads.tcb_mut(thread).held = next;
                }
            }
        }
        if let Some(n) = next {
            self.syncs.slot_mut(n).held_prev = prev;
        }
        let slot = self.syncs.slot_mut(sync);
        slot.held_prev = None;
        slot.held_next = None;
    }
}

use crate::arch::DefaultArch as A;

/// Mutual exclusion with ownership transfer on unlock.
pub struct Mutex {
    id: SyncId,
}

impl Mutex {
    pub fn new() -> KernelResult<Mutex> {
        Self::with_config(SyncConfig::default())
    }

    pub fn with_config(cfg: SyncConfig) -> KernelResult<Mutex> {
        crate::kernel::with(|k| k.create_synchronizer(SyncKind::Mutex, 0, cfg))
            .map(|id| Mutex { id })
    }

    pub fn id(&self) -> SyncId {
        self.id
    }

    pub fn lock(&self) {
        crate::kernel::with(|k| {
            k.mutex_lock(A::cpu_id(), self.id);
        });
        // On the slow path we were slept and the unlock handed us the lock
        // before resuming us.
    }

    pub fn unlock(&self) {
        crate::kernel::with(|k| k.mutex_unlock(A::cpu_id(), self.id));
    }
}

impl Drop for Mutex {
    fn drop(&mut self) {
        crate::kernel::with(|k| k.destroy_synchronizer(self.id));
    }
}

/// Counting semaphore.
pub struct Semaphore {
    id: SyncId,
}

impl Semaphore {
    pub fn new(value: i64) -> KernelResult<Semaphore> {
        Self::with_config(value, SyncConfig::default())
    }

    pub fn with_config(value: i64, cfg: SyncConfig) -> KernelResult<Semaphore> {
        crate::kernel::with(|k| k.create_synchronizer(SyncKind::Semaphore, value, cfg))
            .map(|id| Semaphore { id })
    }

    pub fn id(&self) -> SyncId {
        self.id
    }

    pub fn p(&self) {
        crate::kernel::with(|k| {
            k.sem_p(A::cpu_id(), self.id);
        });
    }

    pub fn v(&self) {
        crate::kernel::with(|k| k.sem_v(A::cpu_id(), self.id));
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        crate::kernel::with(|k| k.destroy_synchronizer(self.id));
    }
}

/// Condition variable: a bare waiting queue, no ownership tracking.
pub struct Condition {
    id: SyncId,
}

impl Condition {
    pub fn new() -> KernelResult<Condition> {
        crate::kernel::with(|k| {
            k.create_synchronizer(SyncKind::Condition, 0, SyncConfig::plain())
        })
        .map(|id| Condition { id })
    }

    pub fn id(&self) -> SyncId {
        self.id
    }

    pub fn wait(&self) {
        crate::kernel::with(|k| k.cond_wait(A::cpu_id(), self.id));
    }

    pub fn signal(&self) {
        crate::kernel::with(|k| k.cond_signal(self.id));
    }

    pub fn broadcast(&self) {
        crate::kernel::with(|k| k.cond_broadcast(self.id));
    }
}

impl Drop for Condition {
    fn drop(&mut self) {
        crate::kernel::with(|k| k.destroy_synchronizer(self.id));
    }
}
