//! Ready-queue management.
//!
//! The scheduler is an ordered multiset of thread indices keyed by the
//! scheduling criterion. Depending on the policy it runs one shared queue,
//! one queue per CPU (partitioned), or one shared queue with per-CPU chosen
//! slots (multihead): `choose` removes the winner from the queue, so
//! concurrent choices on different CPUs can never return the same thread.

pub mod criterion;

pub use criterion::{rank, Criterion, Event, Statistics};

use crate::arch::Arch;
use crate::config::MAX_CPUS;
use crate::list::{self, LinkedArena, QueueHead};
use crate::thread::{Place, ThreadId, ThreadTable};
use crate::time::Tick;

/// Ordered ready queues plus the per-CPU chosen thread.
pub(crate) struct Scheduler<C: Criterion> {
    ready: [QueueHead; MAX_CPUS],
    chosen: [Option<ThreadId>; MAX_CPUS],
    _criterion: core::marker::PhantomData<C>,
}

impl<C: Criterion> Scheduler<C> {
    pub(crate) const fn new() -> Self {
        Scheduler {
            ready: [QueueHead::new(); MAX_CPUS],
            chosen: [None; MAX_CPUS],
            _criterion: core::marker::PhantomData,
        }
    }

    /// Queue an element is inserted into.
    fn home_queue<A: Arch>(threads: &ThreadTable<A, C>, id: ThreadId) -> usize {
        if C::PARTITIONED {
            threads.tcb(id).criterion.queue()
        } else {
            0
        }
    }

    /// Queue a CPU chooses from.
    fn pick_queue(cpu: usize) -> usize {
        if C::PARTITIONED {
            cpu
        } else {
            0
        }
    }

    /// Insert a ready thread, refreshing a dynamic rank first.
    pub(crate) fn insert<A: Arch>(&mut self, threads: &mut ThreadTable<A, C>, id: ThreadId, now: Tick) {
        if C::DYNAMIC {
            threads.tcb_mut(id).criterion.handle(Event::UPDATE, now);
        }
        let queue = Self::home_queue(threads, id);
        threads.stamp_link(id);
        list::insert_ordered(threads, &mut self.ready[queue], id);
        threads.tcb_mut(id).place = Place::Ready(queue);
    }

    /// Remove a thread from whatever ready queue it occupies.
    pub(crate) fn remove<A: Arch>(&mut self, threads: &mut ThreadTable<A, C>, id: ThreadId) {
        if let Place::Ready(queue) = threads.tcb(id).place {
            list::remove(threads, &mut self.ready[queue], id);
            threads.tcb_mut(id).place = Place::None;
        }
    }

    /// Highest-priority ready thread for this CPU, without removing it.
    pub(crate) fn peek(&self, cpu: usize) -> Option<ThreadId> {
        self.ready[Self::pick_queue(cpu)].head
    }

    /// Remove and return the highest-priority ready thread for this CPU,
    /// recording it as the CPU's chosen thread.
    pub(crate) fn choose<A: Arch>(&mut self, threads: &mut ThreadTable<A, C>, cpu: usize) -> Option<ThreadId> {
        let queue = Self::pick_queue(cpu);
        let id = list::pop_head(threads, &mut self.ready[queue])?;
        threads.tcb_mut(id).place = Place::None;
        self.chosen[cpu] = Some(id);
        Some(id)
    }

    /// The last `choose` result for this CPU.
    pub(crate) fn chosen(&self, cpu: usize) -> Option<ThreadId> {
        self.chosen[cpu]
    }

    pub(crate) fn set_chosen(&mut self, cpu: usize, id: Option<ThreadId>) {
        self.chosen[cpu] = id;
    }

    pub(crate) fn ready_len(&self, queue: usize) -> usize {
        self.ready[queue].len
    }

    /// Ready threads of one queue, in priority order.
    pub(crate) fn collect_ready<A: Arch>(
        &self,
        threads: &ThreadTable<A, C>,
        queue: usize,
        out: &mut heapless::Vec<ThreadId, { crate::config::MAX_THREADS }>,
    ) {
        let mut at = self.ready[queue].head;
        while let Some(id) = at {
            let _ = out.push(id);
            at = threads.link(id).next;
        }
    }
}

impl<C: Criterion> Default for Scheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}
