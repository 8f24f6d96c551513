//! Threads: control blocks, the state machine and every lifecycle operation.
//!
//! A thread is an arena slot owning a stack and a saved CPU context. It is
//! always in exactly one place: the ready queue, one synchronizer's waiting
//! queue, the suspended queue, or nowhere (running or finishing). The
//! operations here are the only legal transitions.

use crate::arch::Arch;
use crate::config::{self, MAX_THREADS};
use crate::error::{KernelError, KernelResult};
use crate::kernel::Kernel;
use crate::list::{self, Link, LinkedArena};
use crate::mem::Stack;
use crate::sched::criterion::{rank, Event};
use crate::sched::Criterion;
use crate::sync::SyncId;
use crate::time::alarm::AlarmId;
use log::{debug, trace, warn};

/// Index into the thread arena.
pub type ThreadId = usize;

/// Thread entry function: receives the spawn argument, returns the exit
/// status a joiner will observe.
pub type ThreadEntry = fn(usize) -> i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Running,
    Ready,
    Suspended,
    Waiting,
    Finishing,
}

/// Which queue a thread currently occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Place {
    None,
    Ready(usize),
    Waiting(SyncId),
    Suspended,
}

/// Binding of a periodic thread to its release semaphore and alarm.
#[derive(Debug, Clone, Copy)]
pub struct PeriodicBinding {
    pub semaphore: SyncId,
    pub alarm: AlarmId,
}

/// Spawn-time configuration.
#[derive(Debug, Clone, Copy)]
pub struct Configuration<C: Criterion> {
    pub state: State,
    pub criterion: C,
    pub stack_size: usize,
}

impl<C: Criterion> Configuration<C> {
    pub fn new(state: State, criterion: C) -> Self {
        Configuration { state, criterion, stack_size: config::STACK_SIZE }
    }

    pub fn ready(criterion: C) -> Self {
        Self::new(State::Ready, criterion)
    }

    pub fn suspended(criterion: C) -> Self {
        Self::new(State::Suspended, criterion)
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }
}

/// Thread control block.
pub(crate) struct Tcb<A: Arch, C: Criterion> {
    pub state: State,
    pub criterion: C,
    /// Unboosted rank, preserved so inversion control can restore it.
    pub natural_rank: i32,
    pub place: Place,
    pub link: Link,
    /// Thread waiting for this one to finish.
    pub joining: Option<ThreadId>,
    /// Synchronizer this thread is currently blocked on.
    pub blocked_on: Option<SyncId>,
    /// Head of the intrusive list of synchronizers this thread holds.
    pub held: Option<SyncId>,
    pub periodic: Option<PeriodicBinding>,
    pub exit_status: i32,
    #[allow(dead_code)]
    pub stack: Stack,
    pub context: *mut A::Context,
}

/// Arena of thread control blocks.
///
/// Queues refer to threads by index; removal is O(1) through the link
/// embedded in each slot.
pub(crate) struct ThreadTable<A: Arch, C: Criterion> {
    slots: [Option<Tcb<A, C>>; MAX_THREADS],
    seq: u64,
}

impl<A: Arch, C: Criterion> ThreadTable<A, C> {
    pub const fn new() -> Self {
        ThreadTable { slots: [const { None }; MAX_THREADS], seq: 0 }
    }

    pub fn allocate(
        &mut self,
        conf: &Configuration<C>,
        entry: ThreadEntry,
        arg: usize,
    ) -> KernelResult<ThreadId> {
        let id = self
            .slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(KernelError::MaxThreadsReached)?;

        let stack = Stack::allocate(conf.stack_size)?;
        let context =
            unsafe { A::init_context(stack.base(), stack.size(), entry_shim, entry as usize, arg) };

        self.slots[id] = Some(Tcb {
            state: conf.state,
            criterion: conf.criterion,
            natural_rank: conf.criterion.rank(),
            place: Place::None,
            link: Link::new(),
            joining: None,
            blocked_on: None,
            held: None,
            periodic: None,
            exit_status: 0,
            stack,
            context,
        });
        Ok(id)
    }

    pub fn free(&mut self, id: ThreadId) {
        self.slots[id] = None;
    }

    pub fn exists(&self, id: ThreadId) -> bool {
        self.slots.get(id).map_or(false, |s| s.is_some())
    }

    /// Panics on a stale index: queues only ever hold live threads.
    pub fn tcb(&self, id: ThreadId) -> &Tcb<A, C> {
        self.slots[id].as_ref().expect("stale thread index")
    }

    pub fn tcb_mut(&mut self, id: ThreadId) -> &mut Tcb<A, C> {
        self.slots[id].as_mut().expect("stale thread index")
    }

    /// Refresh the link key from the criterion and stamp the insertion
    /// sequence, so equal ranks keep FIFO order.
    pub fn stamp_link(&mut self, id: ThreadId) {
        self.seq += 1;
        let seq = self.seq;
        let tcb = self.tcb_mut(id);
        tcb.link.key = tcb.criterion.rank() as i64;
        tcb.link.seq = seq;
    }

}

impl<A: Arch, C: Criterion> LinkedArena for ThreadTable<A, C> {
    fn link(&self, index: usize) -> &Link {
        &self.tcb(index).link
    }
    fn link_mut(&mut self, index: usize) -> &mut Link {
        &mut self.tcb_mut(index).link
    }
}

impl<A: Arch, C: Criterion> Kernel<A, C> {
    /// Create a thread and make it schedulable (or park it suspended).
    pub fn spawn(
        &mut self,
        conf: Configuration<C>,
        entry: ThreadEntry,
        arg: usize,
    ) -> KernelResult<ThreadId> {
        if !self.is_initialized() {
            return Err(KernelError::NotInitialized);
        }
        let now = self.elapsed();
        let id = self.threads.allocate(&conf, entry, arg)?;
        self.threads.tcb_mut(id).criterion.handle(Event::CREATE, now);

        trace!(
            "spawn(entry={:p}, rank={}) => {}",
            entry as *const (),
            conf.criterion.rank(),
            id
        );

        match conf.state {
            State::Suspended => {
                self.threads.stamp_link(id);
                list::insert_ordered(&mut self.threads, &mut self.suspended, id);
                self.threads.tcb_mut(id).place = Place::Suspended;
                self.threads.tcb_mut(id).state = State::Suspended;
            }
            _ => {
                self.threads.tcb_mut(id).state = State::Ready;
                self.scheduler.insert(&mut self.threads, id, now);
            }
        }

        if conf.criterion.rank() != rank::IDLE {
            self.thread_count += 1;
            self.enroll(crate::task::Resource::Thread(id));
        }

        if C::PREEMPTIVE
            && !self.booting
            && self.threads.tcb(id).state == State::Ready
            && self.threads.tcb(id).criterion.rank() != rank::IDLE
        {
            self.reschedule_for(id);
        }

        Ok(id)
    }

    /// Destroy a thread explicitly, releasing its queue slot and stack.
    ///
    /// Destroying a running thread is a programmer error; it is refused
    /// with a warning rather than corrupting the CPU it occupies.
    pub fn destroy(&mut self, id: ThreadId) -> KernelResult<()> {
        if !self.threads.exists(id) {
            return Err(KernelError::InvalidThreadId);
        }
        trace!("destroy(thread={})", id);
        match self.threads.tcb(id).place {
            Place::Ready(_) => self.scheduler.remove(&mut self.threads, id),
            Place::Suspended => {
                list::remove(&mut self.threads, &mut self.suspended, id);
            }
            Place::Waiting(sync) => {
                let queue = self.syncs.waiting_mut(sync);
                // Split borrows: queue lives in the sync arena.
                list::remove(&mut self.threads, queue, id);
            }
            Place::None => {
                if self.threads.tcb(id).state == State::Running {
                    warn!("destroy(thread={}) refused: thread is running", id);
                    return Ok(());
                }
            }
        }
        // Orphan any synchronizers the thread still holds so later
        // operations never chase a dead index.
        let mut cursor = self.threads.tcb_mut(id).held.take();
        while let Some(sync) = cursor {
            let slot = self.syncs.slot_mut(sync);
            cursor = slot.held_next;
            slot.holder = None;
            slot.locked_rank = rank::IDLE;
            slot.held_prev = None;
            slot.held_next = None;
        }

        if self.threads.tcb(id).state != State::Finishing
            && self.threads.tcb(id).criterion.rank() != rank::IDLE
        {
            self.thread_count -= 1;
        }
        self.threads.free(id);
        self.dismiss(crate::task::Resource::Thread(id));
        Ok(())
    }

    /// The thread currently chosen on `cpu`.
    pub fn current(&self, cpu: usize) -> Option<ThreadId> {
        self.scheduler.chosen(cpu)
    }

    pub fn state(&self, id: ThreadId) -> State {
        self.threads.tcb(id).state
    }

    pub fn rank_of(&self, id: ThreadId) -> i32 {
        self.threads.tcb(id).criterion.rank()
    }

    pub fn exit_status(&self, id: ThreadId) -> i32 {
        self.threads.tcb(id).exit_status
    }

    pub fn statistics_of(&self, id: ThreadId) -> &crate::sched::Statistics {
        self.threads.tcb(id).criterion.statistics()
    }

    /// Contents of one ready queue in priority order, for inspection.
    pub fn ready_ids(&self, queue: usize) -> heapless::Vec<ThreadId, MAX_THREADS> {
        let mut out = heapless::Vec::new();
        self.scheduler.collect_ready(&self.threads, queue, &mut out);
        out
    }

    /// Voluntarily give up the CPU: back to the ready queue, highest rank
    /// runs next.
    pub fn yield_now(&mut self, cpu: usize) {
        let now = self.elapsed();
        let Some(prev) = self.scheduler.chosen(cpu) else {
            // The CPU went idle with nothing runnable; pick up whatever
            // became ready since.
            if let Some(next) = self.scheduler.choose(&mut self.threads, cpu) {
                self.threads.tcb_mut(next).state = State::Running;
                self.quantum_left[cpu] = self.quantum_ticks;
            }
            return;
        };
        trace!("yield(running={})", prev);

        if self.scheduler.peek(cpu).is_none() {
            return;
        }
        if self.threads.tcb(prev).state == State::Running {
            self.threads.tcb_mut(prev).state = State::Ready;
            self.scheduler.insert(&mut self.threads, prev, now);
        }
        if let Some(next) = self.scheduler.choose(&mut self.threads, cpu) {
            self.threads.tcb_mut(next).state = State::Running;
            self.dispatch(cpu, prev, next, true);
        }
    }

    /// Cooperative handoff: make `target` run next regardless of rank.
    pub fn pass(&mut self, cpu: usize, target: ThreadId) {
        let now = self.elapsed();
        let Some(prev) = self.scheduler.chosen(cpu) else { return };
        if prev == target || self.threads.tcb(target).place == Place::None {
            return;
        }
        trace!("pass(from={}, to={})", prev, target);

        self.threads.tcb_mut(prev).state = State::Ready;
        self.scheduler.insert(&mut self.threads, prev, now);

        self.scheduler.remove(&mut self.threads, target);
        self.threads.tcb_mut(target).state = State::Running;
        self.scheduler.set_chosen(cpu, Some(target));
        self.dispatch(cpu, prev, target, true);
    }

    /// Move a thread to the suspended queue. Suspending the running thread
    /// dispatches the next ready one.
    pub fn suspend(&mut self, cpu: usize, id: ThreadId) {
        trace!("suspend(thread={})", id);
        let running = self.scheduler.chosen(cpu) == Some(id);
        if !running {
            match self.threads.tcb(id).place {
                Place::Ready(_) => self.scheduler.remove(&mut self.threads, id),
                Place::Waiting(sync) => {
                    let queue = self.syncs.waiting_mut(sync);
                    list::remove(&mut self.threads, queue, id);
                    self.threads.tcb_mut(id).blocked_on = None;
                }
                _ => return,
            }
        }

        self.threads.tcb_mut(id).state = State::Suspended;
        self.threads.stamp_link(id);
        list::insert_ordered(&mut self.threads, &mut self.suspended, id);
        self.threads.tcb_mut(id).place = Place::Suspended;

        if running {
            if let Some(next) = self.scheduler.choose(&mut self.threads, cpu) {
                self.threads.tcb_mut(next).state = State::Running;
                self.dispatch(cpu, id, next, true);
            } else {
                self.scheduler.set_chosen(cpu, None);
            }
        }
    }

    /// Move a thread from the suspended queue back to ready. Resuming a
    /// thread that is not suspended is a no-op.
    pub fn resume(&mut self, id: ThreadId) -> KernelResult<()> {
        if !self.threads.exists(id) {
            return Err(KernelError::InvalidThreadId);
        }
        trace!("resume(thread={})", id);
        if self.threads.tcb(id).place != Place::Suspended {
            return Ok(());
        }
        self.unsuspend(id);
        if C::PREEMPTIVE && !self.booting {
            self.reschedule_for(id);
        }
        Ok(())
    }

    /// Ready a suspended thread without a preemption check. Used inside
    /// operations that pick the next thread themselves (exit, init).
    pub(crate) fn unsuspend(&mut self, id: ThreadId) {
        let now = self.elapsed();
        list::remove(&mut self.threads, &mut self.suspended, id);
        self.threads.tcb_mut(id).state = State::Ready;
        self.scheduler.insert(&mut self.threads, id, now);
    }

    /// Terminate the running thread, storing the status for its joiner.
    pub fn exit(&mut self, cpu: usize, status: i32) {
        let now = self.elapsed();
        let Some(prev) = self.scheduler.chosen(cpu) else { return };
        trace!("exit(status={}) [running={}]", status, prev);

        {
            let tcb = self.threads.tcb_mut(prev);
            tcb.state = State::Finishing;
            tcb.exit_status = status;
            tcb.criterion.handle(Event::FINISH, now);
        }

        if let Some(joiner) = self.threads.tcb_mut(prev).joining.take() {
            self.unsuspend(joiner);
        }

        if self.threads.tcb(prev).criterion.rank() != rank::IDLE {
            self.thread_count -= 1;
            if self.thread_count == 0 {
                warn!("the last thread has exited");
                if config::REBOOT_ON_LAST_EXIT {
                    warn!("rebooting the machine ...");
                    A::reboot();
                } else {
                    warn!("halting the CPU ...");
                    A::halt();
                }
            }
        }

        if let Some(next) = self.scheduler.choose(&mut self.threads, cpu) {
            self.threads.tcb_mut(next).state = State::Running;
            self.dispatch(cpu, prev, next, true);
        } else {
            self.scheduler.set_chosen(cpu, None);
        }
    }

    /// First half of `join`: either the target already finished and its
    /// status is returned, or the caller is registered as the joiner and
    /// suspended until `exit` wakes it.
    ///
    /// Only one joiner per target is supported.
    pub fn join_prepare(&mut self, cpu: usize, target: ThreadId) -> Option<i32> {
        trace!("join(target={}, state={:?})", target, self.threads.tcb(target).state);
        if self.threads.tcb(target).state == State::Finishing {
            return Some(self.threads.tcb(target).exit_status);
        }
        let joiner = self.scheduler.chosen(cpu).expect("join from no running thread");
        debug_assert!(self.threads.tcb(target).joining.is_none(), "double join");
        self.threads.tcb_mut(target).joining = Some(joiner);
        self.suspend(cpu, joiner);
        None
    }

    /// Change a thread's (natural) priority and reposition it.
    pub fn set_priority(&mut self, id: ThreadId, new_rank: i32) -> KernelResult<()> {
        if !self.threads.exists(id) {
            return Err(KernelError::InvalidThreadId);
        }
        trace!("priority(thread={}, rank={})", id, new_rank);
        self.threads.tcb_mut(id).natural_rank = new_rank;
        self.apply_rank(id, new_rank);
        if C::PREEMPTIVE && !self.booting {
            self.reschedule_for(id);
        }
        Ok(())
    }

    /// Overwrite the effective rank and reposition the thread in whichever
    /// ordered queue it occupies. Does not touch the natural rank.
    pub(crate) fn apply_rank(&mut self, id: ThreadId, new_rank: i32) {
        let now = self.elapsed();
        self.threads.tcb_mut(id).criterion.set_rank(new_rank);
        match self.threads.tcb(id).place {
            Place::Ready(_) => {
                self.scheduler.remove(&mut self.threads, id);
                self.scheduler.insert(&mut self.threads, id, now);
            }
            Place::Waiting(sync) => {
                let queue = self.syncs.waiting_mut(sync);
                list::remove(&mut self.threads, queue, id);
                self.threads.stamp_link(id);
                let queue = self.syncs.waiting_mut(sync);
                list::insert_ordered(&mut self.threads, queue, id);
                self.threads.tcb_mut(id).place = Place::Waiting(sync);
            }
            _ => {}
        }
    }

    /// Block the running thread on a synchronizer's waiting queue and
    /// dispatch the next ready thread.
    pub(crate) fn sleep_on(&mut self, cpu: usize, sync: SyncId) {
        let Some(prev) = self.scheduler.chosen(cpu) else { return };
        trace!("sleep(thread={}, sync={})", prev, sync);

        {
            let tcb = self.threads.tcb_mut(prev);
            tcb.state = State::Waiting;
            tcb.blocked_on = Some(sync);
        }
        self.threads.stamp_link(prev);
        let queue = self.syncs.waiting_mut(sync);
        list::insert_ordered(&mut self.threads, queue, prev);
        self.threads.tcb_mut(prev).place = Place::Waiting(sync);

        if let Some(next) = self.scheduler.choose(&mut self.threads, cpu) {
            self.threads.tcb_mut(next).state = State::Running;
            self.dispatch(cpu, prev, next, true);
        } else {
            self.scheduler.set_chosen(cpu, None);
        }
    }

    /// Wake the highest-priority waiter of a synchronizer, without the
    /// preemption check. Callers that transfer ownership finish their
    /// bookkeeping first and then reschedule themselves.
    pub(crate) fn wakeup_core(&mut self, sync: SyncId) -> Option<ThreadId> {
        let now = self.elapsed();
        let queue = self.syncs.waiting_mut(sync);
        let id = list::pop_head(&mut self.threads, queue)?;
        trace!("wakeup(thread={}, sync={})", id, sync);

        {
            let tcb = self.threads.tcb_mut(id);
            tcb.state = State::Ready;
            tcb.place = Place::None;
            tcb.blocked_on = None;
        }
        self.scheduler.insert(&mut self.threads, id, now);
        Some(id)
    }

    /// Wake the highest-priority waiter of a synchronizer.
    pub(crate) fn wakeup_from(&mut self, sync: SyncId) -> Option<ThreadId> {
        let id = self.wakeup_core(sync)?;
        if C::PREEMPTIVE && !self.booting {
            self.reschedule_for(id);
        }
        Some(id)
    }

    /// Wake every waiter of a synchronizer (destruction, broadcast).
    pub(crate) fn wakeup_all_from(&mut self, sync: SyncId) {
        while self.wakeup_from(sync).is_some() {}
    }

    /// Re-evaluate the schedule on the CPU that serves `id`'s queue,
    /// interrupting it if it is a different CPU.
    pub(crate) fn reschedule_for(&mut self, id: ThreadId) {
        let cpu = if C::PARTITIONED {
            self.threads.tcb(id).criterion.queue()
        } else {
            A::cpu_id()
        };
        if cpu == A::cpu_id() {
            self.reschedule(cpu);
        } else {
            A::send_ipi(cpu);
        }
    }

    /// Scheduling-event entry point: refresh dynamic ranks, then preempt
    /// only if a strictly higher-priority thread is ready.
    pub fn reschedule(&mut self, cpu: usize) {
        if !C::PREEMPTIVE {
            return;
        }
        if C::DYNAMIC {
            self.update_ready_ranks();
            if let Some(prev) = self.scheduler.chosen(cpu) {
                if self.threads.tcb(prev).state == State::Running {
                    match self.scheduler.peek(cpu) {
                        Some(best)
                            if self.threads.tcb(best).criterion.rank()
                                < self.threads.tcb(prev).criterion.rank() => {}
                        _ => return,
                    }
                }
            }
        }
        self.yield_now(cpu);
    }

    /// Post `UPDATE` to every non-idle thread and restore queue order.
    ///
    /// Traversal is in queue order so equal ranks keep their FIFO
    /// positions across the re-sort.
    pub(crate) fn update_ready_ranks(&mut self) {
        let now = self.elapsed();
        for queue in 0..self.queues_in_use() {
            let mut order: heapless::Vec<ThreadId, MAX_THREADS> = heapless::Vec::new();
            self.scheduler.collect_ready(&self.threads, queue, &mut order);
            for &id in order.iter() {
                if self.threads.tcb(id).criterion.rank() == rank::IDLE {
                    continue;
                }
                self.scheduler.remove(&mut self.threads, id);
                self.scheduler.insert(&mut self.threads, id, now);
            }
        }
        for cpu in 0..self.cpus {
            if let Some(chosen) = self.scheduler.chosen(cpu) {
                let tcb = self.threads.tcb_mut(chosen);
                if tcb.criterion.rank() != rank::IDLE {
                    tcb.criterion.handle(Event::UPDATE, now);
                }
            }
        }
    }

    pub(crate) fn queues_in_use(&self) -> usize {
        if C::PARTITIONED {
            self.cpus
        } else {
            1
        }
    }

    /// Switch CPUs between two distinct threads, charging statistics.
    pub(crate) fn dispatch(&mut self, cpu: usize, prev: ThreadId, next: ThreadId, charge: bool) {
        if prev == next {
            return;
        }
        let now = self.elapsed();
        debug_assert!(self.threads.tcb(prev).state != State::Running);
        debug_assert!(self.threads.tcb(next).state == State::Running);
        debug!("dispatch(prev={}, next={}) on cpu {}", prev, next, cpu);

        let leave = if charge { Event::LEAVE | Event::CHARGE } else { Event::LEAVE };
        self.threads.tcb_mut(prev).criterion.handle(leave, now);
        self.threads.tcb_mut(next).criterion.handle(Event::ENTER | Event::AWARD, now);

        self.quantum_left[cpu] = self.quantum_ticks;

        let prev_ctx = &mut self.threads.tcb_mut(prev).context as *mut *mut A::Context;
        let next_ctx = self.threads.tcb(next).context;
        // The kernel lock is handed off across the switch: the incoming
        // thread releases it in its own resumption scope.
        unsafe { A::context_switch(prev_ctx, next_ctx) };
    }
}

// First Rust frame of every thread: run the entry function, then deliver
// its status through the regular exit path.
pub(crate) extern "C" fn entry_shim(entry: usize, arg: usize) -> ! {
    let entry: ThreadEntry = unsafe { core::mem::transmute(entry) };
    let status = entry(arg);
    exit(status)
}

/// Entry function of the per-CPU idle threads.
pub(crate) fn idle_main(_arg: usize) -> i32 {
    loop {
        A::int_enable();
        A::wait_for_interrupt();
    }
}

use crate::arch::DefaultArch as A;
use crate::config::DefaultCriterion as DC;

/// Handle to a spawned thread.
///
/// Dropping the handle destroys the thread; join first, as application
/// code would delete it after join.
pub struct Thread {
    id: ThreadId,
}

impl Thread {
    /// Spawn with the default configuration. Partitioned policies place
    /// the thread round-robin across CPUs.
    pub fn spawn(entry: ThreadEntry, arg: usize) -> KernelResult<Thread> {
        Self::spawn_with(
            Configuration::ready(DC::from_rank(
                rank::NORMAL,
                crate::sched::criterion::ANY,
                crate::kernel::elapsed(),
            )),
            entry,
            arg,
        )
    }

    /// Spawn with an explicit configuration.
    pub fn spawn_with(
        conf: Configuration<DC>,
        entry: ThreadEntry,
        arg: usize,
    ) -> KernelResult<Thread> {
        crate::kernel::with(|k| k.spawn(conf, entry, arg)).map(|id| Thread { id })
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// The identity of the calling thread.
    pub fn self_id() -> Option<ThreadId> {
        crate::kernel::with(|k| k.current(A::cpu_id()))
    }

    /// Wait for this thread to finish and collect its exit status.
    pub fn join(&self) -> i32 {
        loop {
            if let Some(status) = crate::kernel::with(|k| k.join_prepare(A::cpu_id(), self.id)) {
                return status;
            }
            // We were suspended and resumed by the target's exit; loop to
            // fetch the status (and to survive spurious wakeups).
        }
    }

    /// Hand the CPU to this thread, ignoring priority.
    pub fn pass(&self) {
        crate::kernel::with(|k| k.pass(A::cpu_id(), self.id));
    }

    pub fn suspend(&self) {
        crate::kernel::with(|k| k.suspend(A::cpu_id(), self.id));
    }

    pub fn resume(&self) {
        let _ = crate::kernel::with(|k| k.resume(self.id));
    }

    pub fn state(&self) -> State {
        crate::kernel::with(|k| k.state(self.id))
    }

    pub fn priority(&self) -> i32 {
        crate::kernel::with(|k| k.rank_of(self.id))
    }

    pub fn set_priority(&self, rank: i32) {
        let _ = crate::kernel::with(|k| k.set_priority(self.id, rank));
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        let _ = crate::kernel::with(|k| k.destroy(self.id));
    }
}

/// Voluntarily yield the CPU.
pub fn yield_now() {
    crate::kernel::with(|k| k.yield_now(A::cpu_id()));
}

/// Terminate the calling thread.
pub fn exit(status: i32) -> ! {
    crate::kernel::with(|k| k.exit(A::cpu_id(), status));
    loop {
        A::wait_for_interrupt();
    }
}
