//! Scheduling criteria.
//!
//! A criterion is the per-thread ordering key of the ready queue plus the
//! policy that evolves it. The rank is an `i32` where smaller means higher
//! priority; reserved sentinels pin main, idle and the ceiling below and
//! above every application rank. Policies advertise three traits: `TIMED`
//! (quantum-driven preemption), `DYNAMIC` (rank recomputed on events) and
//! `PREEMPTIVE`.

use crate::config;
use crate::time::{ticks_from_us, us_from_ticks, Microsecond, Tick};
use bitflags::bitflags;
use portable_atomic::{AtomicUsize, Ordering};

/// Reserved rank values, ordered `CEILING < MAIN < HIGH < NORMAL < LOW < IDLE`.
pub mod rank {
    pub const CEILING: i32 = -1000;
    pub const MAIN: i32 = -1;
    pub const HIGH: i32 = 0;
    pub const NORMAL: i32 = (1 << 29) - 1;
    pub const LOW: i32 = (1 << 30) - 1;
    pub const IDLE: i32 = i32::MAX;

    /// Periodic threads rank inside `[PERIODIC, SPORADIC]`.
    pub const PERIODIC: i32 = HIGH;
    pub const SPORADIC: i32 = NORMAL;
    pub const APERIODIC: i32 = LOW;
}

/// Constructor helpers mirroring the classic configuration shorthands.
pub const SAME: Microsecond = 0;
pub const NOW: Microsecond = 0;
pub const UNKNOWN: Microsecond = 0;
pub const ANY: usize = usize::MAX;

bitflags! {
    /// Scheduling events and operation bits delivered to `handle`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Event: u32 {
        const CREATE      = 1 << 0;
        const FINISH      = 1 << 1;
        const ENTER       = 1 << 2;
        const LEAVE       = 1 << 3;
        const JOB_RELEASE = 1 << 4;
        const JOB_FINISH  = 1 << 5;

        const COLLECT     = 1 << 16;
        const CHARGE      = 1 << 17;
        const AWARD       = 1 << 18;
        const UPDATE      = 1 << 19;
    }
}

/// Runtime statistics kept per criterion.
#[derive(Debug, Default, Clone, Copy)]
pub struct Statistics {
    /// Tick at which the thread was created.
    pub thread_creation: Tick,
    /// Accumulated execution time, in ticks.
    pub thread_execution_time: Tick,
    /// Tick of the last dispatch to a CPU.
    pub thread_last_dispatch: Tick,
    /// Tick at which the thread last left a CPU.
    pub thread_last_preemption: Tick,

    /// Whether a job is currently released and unfinished.
    pub job_released: bool,
    /// Tick at which the current job was released.
    pub job_release: Tick,
    /// Tick at which the current job first got the CPU.
    pub job_start: Tick,
    /// Tick at which the last job finished.
    pub job_finish: Tick,
    /// Execution time consumed by the current job, in ticks.
    pub job_utilization: Tick,
    /// Number of jobs released so far.
    pub jobs_released: u32,
    /// Number of jobs finished so far.
    pub jobs_finished: u32,
}

impl Statistics {
    fn collect(&mut self, event: Event, now: Tick, periodic: bool) {
        if event.contains(Event::CREATE) {
            self.thread_creation = now;
            self.job_released = false;
        }
        if event.contains(Event::ENTER) {
            self.thread_last_dispatch = now;
            if periodic && self.job_released && self.job_start == 0 {
                self.job_start = now;
            }
        }
        if event.contains(Event::LEAVE) {
            let slice = now.saturating_sub(self.thread_last_dispatch);
            self.thread_last_preemption = now;
            self.thread_execution_time += slice;
            if self.job_released {
                self.job_utilization += slice;
            }
        }
        if periodic && event.contains(Event::JOB_RELEASE) {
            self.job_released = true;
            self.job_release = now;
            self.job_start = 0;
            self.job_utilization = 0;
            self.jobs_released += 1;
        }
        if periodic && event.contains(Event::JOB_FINISH) {
            self.job_released = false;
            self.job_finish = now;
            self.jobs_finished += 1;
        }
    }
}

/// A scheduling discipline: the ready-queue ordering key and its evolution.
pub trait Criterion: Copy + core::fmt::Debug {
    /// Quantum expiry forces a reschedule.
    const TIMED: bool;
    /// Ranks change on scheduling events; the scheduler must reorder on
    /// `UPDATE`.
    const DYNAMIC: bool;
    /// Wakeups and creations may preempt the running thread.
    const PREEMPTIVE: bool;
    /// One ready queue per CPU instead of a single shared one.
    const PARTITIONED: bool = false;

    /// Criterion for a plain thread at the given rank (sentinels included).
    fn from_rank(rank: i32, cpu: usize, now: Tick) -> Self;

    /// Criterion for a periodic thread. Deadline defaults to the period and
    /// `cpu == ANY` lets the policy place the thread.
    fn real_time(
        period_us: Microsecond,
        deadline_us: Microsecond,
        capacity_us: Microsecond,
        cpu: usize,
        now: Tick,
    ) -> Self;

    /// Current ordering key; smaller is higher priority.
    fn rank(&self) -> i32;

    /// Overwrite the ordering key (priority changes, inversion control).
    fn set_rank(&mut self, rank: i32);

    fn statistics(&self) -> &Statistics;

    fn statistics_mut(&mut self) -> &mut Statistics;

    /// Deliver a scheduling event; dynamic policies recompute their rank.
    fn handle(&mut self, event: Event, now: Tick);

    /// Period in ticks; zero when aperiodic.
    fn period(&self) -> Tick {
        0
    }

    /// Relative deadline in ticks; zero when aperiodic.
    fn deadline(&self) -> Tick {
        0
    }

    /// Worst-case capacity in ticks; zero when unknown.
    fn capacity(&self) -> Tick {
        0
    }

    fn periodic(&self) -> bool {
        self.rank() >= rank::PERIODIC && self.rank() <= rank::SPORADIC
    }

    /// Ready queue this thread belongs to (partitioned policies only).
    fn queue(&self) -> usize {
        0
    }
}

// Round-robin CPU assignment for partitioned policies.
static NEXT_QUEUE: AtomicUsize = AtomicUsize::new(0);

fn assign_queue(cpu: usize) -> usize {
    if cpu != ANY {
        cpu % config::MAX_CPUS
    } else {
        (NEXT_QUEUE.fetch_add(1, Ordering::Relaxed) + 1) % config::CPUS
    }
}

/// Static priority.
#[derive(Debug, Clone, Copy)]
pub struct Priority {
    rank: i32,
    stats: Statistics,
}

impl Priority {
    pub fn new(rank: i32) -> Self {
        Priority { rank, stats: Statistics::default() }
    }
}

impl Criterion for Priority {
    const TIMED: bool = false;
    const DYNAMIC: bool = false;
    const PREEMPTIVE: bool = true;

    fn from_rank(rank: i32, _cpu: usize, _now: Tick) -> Self {
        Priority::new(rank)
    }

    fn real_time(
        period_us: Microsecond,
        _deadline_us: Microsecond,
        _capacity_us: Microsecond,
        _cpu: usize,
        _now: Tick,
    ) -> Self {
        Priority::new(period_us as i32)
    }

    fn rank(&self) -> i32 {
        self.rank
    }

    fn set_rank(&mut self, rank: i32) {
        self.rank = rank;
    }

    fn statistics(&self) -> &Statistics {
        &self.stats
    }

    fn statistics_mut(&mut self) -> &mut Statistics {
        &mut self.stats
    }

    fn handle(&mut self, event: Event, now: Tick) {
        let periodic = self.periodic();
        self.stats.collect(event, now, periodic);
    }
}

/// Round-robin: static priority plus time slicing among equals.
#[derive(Debug, Clone, Copy)]
pub struct Rr(Priority);

impl Rr {
    pub fn new(rank: i32) -> Self {
        Rr(Priority::new(rank))
    }
}

impl Criterion for Rr {
    const TIMED: bool = true;
    const DYNAMIC: bool = false;
    const PREEMPTIVE: bool = true;

    fn from_rank(rank: i32, cpu: usize, now: Tick) -> Self {
        Rr(Priority::from_rank(rank, cpu, now))
    }

    fn real_time(
        period_us: Microsecond,
        deadline_us: Microsecond,
        capacity_us: Microsecond,
        cpu: usize,
        now: Tick,
    ) -> Self {
        Rr(Priority::real_time(period_us, deadline_us, capacity_us, cpu, now))
    }

    fn rank(&self) -> i32 {
        self.0.rank()
    }

    fn set_rank(&mut self, rank: i32) {
        self.0.set_rank(rank);
    }

    fn statistics(&self) -> &Statistics {
        self.0.statistics()
    }

    fn statistics_mut(&mut self) -> &mut Statistics {
        self.0.statistics_mut()
    }

    fn handle(&mut self, event: Event, now: Tick) {
        self.0.handle(event, now);
    }
}

/// First-come first-served: rank is the creation tick, never preempted.
#[derive(Debug, Clone, Copy)]
pub struct Fcfs(Priority);

impl Criterion for Fcfs {
    const TIMED: bool = false;
    const DYNAMIC: bool = false;
    const PREEMPTIVE: bool = false;

    fn from_rank(rank: i32, _cpu: usize, now: Tick) -> Self {
        // Sentinels keep their place; everything else is ordered by arrival.
        let rank = if rank <= rank::MAIN || rank == rank::IDLE { rank } else { now as i32 };
        Fcfs(Priority::new(rank))
    }

    fn real_time(
        _period_us: Microsecond,
        _deadline_us: Microsecond,
        _capacity_us: Microsecond,
        _cpu: usize,
        now: Tick,
    ) -> Self {
        Fcfs(Priority::new(now as i32))
    }

    fn rank(&self) -> i32 {
        self.0.rank()
    }

    fn set_rank(&mut self, rank: i32) {
        self.0.set_rank(rank);
    }

    fn statistics(&self) -> &Statistics {
        self.0.statistics()
    }

    fn statistics_mut(&mut self) -> &mut Statistics {
        self.0.statistics_mut()
    }

    fn handle(&mut self, event: Event, now: Tick) {
        self.0.handle(event, now);
    }
}

/// Shared state of the real-time disciplines: rank plus the task parameters
/// in ticks.
#[derive(Debug, Clone, Copy)]
struct RtCommon {
    rank: i32,
    period: Tick,
    deadline: Tick,
    capacity: Tick,
    stats: Statistics,
}

impl RtCommon {
    fn aperiodic(rank: i32) -> Self {
        RtCommon { rank, period: 0, deadline: 0, capacity: 0, stats: Statistics::default() }
    }

    fn new(rank: i32, p: Microsecond, d: Microsecond, c: Microsecond) -> Self {
        RtCommon {
            rank,
            period: ticks_from_us(p),
            deadline: ticks_from_us(if d != 0 { d } else { p }),
            capacity: ticks_from_us(c),
            stats: Statistics::default(),
        }
    }

    fn periodic(&self) -> bool {
        self.rank >= rank::PERIODIC && self.rank <= rank::SPORADIC
    }
}

macro_rules! rt_criterion_common {
    () => {
        fn rank(&self) -> i32 {
            self.common.rank
        }

        fn set_rank(&mut self, rank: i32) {
            self.common.rank = rank;
        }

        fn statistics(&self) -> &Statistics {
            &self.common.stats
        }

        fn statistics_mut(&mut self) -> &mut Statistics {
            &mut self.common.stats
        }

        fn period(&self) -> Tick {
            self.common.period
        }

        fn deadline(&self) -> Tick {
            self.common.deadline
        }

        fn capacity(&self) -> Tick {
            self.common.capacity
        }
    };
}

/// Rate monotonic: rank is the period.
#[derive(Debug, Clone, Copy)]
pub struct Rm {
    common: RtCommon,
}

impl Criterion for Rm {
    const TIMED: bool = true;
    const DYNAMIC: bool = false;
    const PREEMPTIVE: bool = true;

    fn from_rank(rank: i32, _cpu: usize, _now: Tick) -> Self {
        Rm { common: RtCommon::aperiodic(rank) }
    }

    fn real_time(p: Microsecond, d: Microsecond, c: Microsecond, _cpu: usize, _now: Tick) -> Self {
        Rm { common: RtCommon::new(ticks_from_us(p) as i32, p, d, c) }
    }

    fn handle(&mut self, event: Event, now: Tick) {
        let periodic = self.common.periodic();
        self.common.stats.collect(event, now, periodic);
    }

    rt_criterion_common!();
}

/// Deadline monotonic: rank is the relative deadline.
#[derive(Debug, Clone, Copy)]
pub struct Dm {
    common: RtCommon,
}

impl Criterion for Dm {
    const TIMED: bool = true;
    const DYNAMIC: bool = false;
    const PREEMPTIVE: bool = true;

    fn from_rank(rank: i32, _cpu: usize, _now: Tick) -> Self {
        Dm { common: RtCommon::aperiodic(rank) }
    }

    fn real_time(p: Microsecond, d: Microsecond, c: Microsecond, _cpu: usize, _now: Tick) -> Self {
        let d = if d != 0 { d } else { p };
        Dm { common: RtCommon::new(ticks_from_us(d) as i32, p, d, c) }
    }

    fn handle(&mut self, event: Event, now: Tick) {
        let periodic = self.common.periodic();
        self.common.stats.collect(event, now, periodic);
    }

    rt_criterion_common!();
}

/// Laxity monotonic: rank is deadline minus capacity.
#[derive(Debug, Clone, Copy)]
pub struct Lm {
    common: RtCommon,
}

impl Criterion for Lm {
    const TIMED: bool = true;
    const DYNAMIC: bool = false;
    const PREEMPTIVE: bool = true;

    fn from_rank(rank: i32, _cpu: usize, _now: Tick) -> Self {
        Lm { common: RtCommon::aperiodic(rank) }
    }

    fn real_time(p: Microsecond, d: Microsecond, c: Microsecond, _cpu: usize, _now: Tick) -> Self {
        let d = if d != 0 { d } else { p };
        Lm { common: RtCommon::new(ticks_from_us(d.saturating_sub(c)) as i32, p, d, c) }
    }

    fn handle(&mut self, event: Event, now: Tick) {
        let periodic = self.common.periodic();
        self.common.stats.collect(event, now, periodic);
    }

    rt_criterion_common!();
}

/// Earliest deadline first: rank is the absolute deadline, recomputed on
/// every job release.
#[derive(Debug, Clone, Copy)]
pub struct Edf {
    common: RtCommon,
}

impl Criterion for Edf {
    const TIMED: bool = true;
    const DYNAMIC: bool = true;
    const PREEMPTIVE: bool = true;

    fn from_rank(rank: i32, _cpu: usize, _now: Tick) -> Self {
        Edf { common: RtCommon::aperiodic(rank) }
    }

    fn real_time(p: Microsecond, d: Microsecond, c: Microsecond, _cpu: usize, now: Tick) -> Self {
        let d = if d != 0 { d } else { p };
        Edf { common: RtCommon::new((now + ticks_from_us(d)) as i32, p, d, c) }
    }

    fn handle(&mut self, event: Event, now: Tick) {
        let periodic = self.common.periodic();
        self.common.stats.collect(event, now, periodic);
        if periodic && event.contains(Event::JOB_RELEASE) {
            self.common.rank = (now + self.common.deadline) as i32;
        }
    }

    rt_criterion_common!();
}

/// Least laxity first: rank is the absolute laxity, tracking consumed
/// capacity on every scheduling event.
#[derive(Debug, Clone, Copy)]
pub struct Llf {
    common: RtCommon,
}

impl Llf {
    fn update_rank(&mut self, now: Tick) {
        let consumed = self.common.stats.job_utilization;
        let laxity = (now + self.common.deadline + consumed).saturating_sub(self.common.capacity);
        self.common.rank = laxity as i32;
    }
}

impl Criterion for Llf {
    const TIMED: bool = true;
    const DYNAMIC: bool = true;
    const PREEMPTIVE: bool = true;

    fn from_rank(rank: i32, _cpu: usize, _now: Tick) -> Self {
        Llf { common: RtCommon::aperiodic(rank) }
    }

    fn real_time(p: Microsecond, d: Microsecond, c: Microsecond, _cpu: usize, now: Tick) -> Self {
        let d = if d != 0 { d } else { p };
        let rank = (now + ticks_from_us(d)).saturating_sub(ticks_from_us(c)) as i32;
        Llf { common: RtCommon::new(rank, p, d, c) }
    }

    fn handle(&mut self, event: Event, now: Tick) {
        let periodic = self.common.periodic();
        self.common.stats.collect(event, now, periodic);
        if periodic && event.intersects(Event::JOB_RELEASE | Event::UPDATE) {
            self.update_rank(now);
        }
    }

    rt_criterion_common!();
}

/// Partitioned least laxity first: LLF over one ready queue per CPU, with
/// round-robin placement at creation unless the caller pins a CPU.
#[derive(Debug, Clone, Copy)]
pub struct Pllf {
    inner: Llf,
    queue: usize,
}

impl Criterion for Pllf {
    const TIMED: bool = true;
    const DYNAMIC: bool = true;
    const PREEMPTIVE: bool = true;
    const PARTITIONED: bool = true;

    fn from_rank(rank: i32, cpu: usize, now: Tick) -> Self {
        // Main and idle stay with the CPU that created them; everything
        // else is placed like any other thread: the caller's CPU if one
        // was named, round-robin otherwise.
        let queue = if rank == rank::IDLE || rank == rank::MAIN {
            cpu % config::MAX_CPUS
        } else {
            assign_queue(cpu)
        };
        Pllf { inner: Llf::from_rank(rank, cpu, now), queue }
    }

    fn real_time(p: Microsecond, d: Microsecond, c: Microsecond, cpu: usize, now: Tick) -> Self {
        Pllf { inner: Llf::real_time(p, d, c, cpu, now), queue: assign_queue(cpu) }
    }

    fn rank(&self) -> i32 {
        self.inner.rank()
    }

    fn set_rank(&mut self, rank: i32) {
        self.inner.set_rank(rank);
    }

    fn statistics(&self) -> &Statistics {
        self.inner.statistics()
    }

    fn statistics_mut(&mut self) -> &mut Statistics {
        self.inner.statistics_mut()
    }

    fn handle(&mut self, event: Event, now: Tick) {
        self.inner.handle(event, now);
    }

    fn period(&self) -> Tick {
        self.inner.period()
    }

    fn deadline(&self) -> Tick {
        self.inner.deadline()
    }

    fn capacity(&self) -> Tick {
        self.inner.capacity()
    }

    fn queue(&self) -> usize {
        self.queue
    }
}

/// Global least laxity first: LLF over a single queue shared by all CPUs,
/// each CPU heading its own front slot.
#[derive(Debug, Clone, Copy)]
pub struct Gllf {
    inner: Llf,
}

impl Criterion for Gllf {
    const TIMED: bool = true;
    const DYNAMIC: bool = true;
    const PREEMPTIVE: bool = true;

    fn from_rank(rank: i32, cpu: usize, now: Tick) -> Self {
        Gllf { inner: Llf::from_rank(rank, cpu, now) }
    }

    fn real_time(p: Microsecond, d: Microsecond, c: Microsecond, cpu: usize, now: Tick) -> Self {
        Gllf { inner: Llf::real_time(p, d, c, cpu, now) }
    }

    fn rank(&self) -> i32 {
        self.inner.rank()
    }

    fn set_rank(&mut self, rank: i32) {
        self.inner.set_rank(rank);
    }

    fn statistics(&self) -> &Statistics {
        self.inner.statistics()
    }

    fn statistics_mut(&mut self) -> &mut Statistics {
        self.inner.statistics_mut()
    }

    fn handle(&mut self, event: Event, now: Tick) {
        self.inner.handle(event, now);
    }

    fn period(&self) -> Tick {
        self.inner.period()
    }

    fn deadline(&self) -> Tick {
        self.inner.deadline()
    }

    fn capacity(&self) -> Tick {
        self.inner.capacity()
    }
}

/// Real-time parameters of a criterion, reported back in microseconds.
pub fn period_us<C: Criterion>(c: &C) -> Microsecond {
    us_from_ticks(c.period())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_ordering() {
        assert!(rank::CEILING < rank::MAIN);
        assert!(rank::MAIN < rank::HIGH);
        assert!(rank::HIGH < rank::NORMAL);
        assert!(rank::NORMAL < rank::LOW);
        assert!(rank::LOW < rank::IDLE);
    }

    #[test]
    fn monotonic_rank_formulas() {
        // 100 ms period, 40 ms deadline, 10 ms capacity; 1 kHz tick.
        let rm = Rm::real_time(100_000, 40_000, 10_000, ANY, 0);
        assert_eq!(rm.rank(), 100);
        let dm = Dm::real_time(100_000, 40_000, 10_000, ANY, 0);
        assert_eq!(dm.rank(), 40);
        let lm = Lm::real_time(100_000, 40_000, 10_000, ANY, 0);
        assert_eq!(lm.rank(), 30);
    }

    #[test]
    fn deadline_defaults_to_period() {
        let dm = Dm::real_time(80_000, SAME, UNKNOWN, ANY, 0);
        assert_eq!(dm.rank(), 80);
        assert_eq!(dm.deadline(), 80);
    }

    #[test]
    fn edf_rank_tracks_releases() {
        let mut edf = Edf::real_time(100_000, SAME, 50_000, ANY, 0);
        assert_eq!(edf.rank(), 100);
        assert!(edf.periodic());

        edf.handle(Event::JOB_RELEASE, 300);
        assert_eq!(edf.rank(), 400);
        edf.handle(Event::JOB_RELEASE, 700);
        assert_eq!(edf.rank(), 800);
    }

    #[test]
    fn llf_rank_tracks_consumed_capacity() {
        let mut llf = Llf::real_time(100_000, SAME, 40_000, ANY, 0);
        llf.handle(Event::JOB_RELEASE, 0);
        // laxity = now + deadline - remaining capacity
        assert_eq!(llf.rank(), 60);

        // Run for 10 ticks: consumed capacity shrinks the remaining one.
        llf.handle(Event::ENTER, 0);
        llf.handle(Event::LEAVE, 10);
        llf.handle(Event::UPDATE, 10);
        assert_eq!(llf.rank(), 10 + 100 - 40 + 10);
    }

    #[test]
    fn llf_aperiodic_rank_is_stable() {
        let mut llf = Llf::from_rank(rank::APERIODIC, ANY, 0);
        llf.handle(Event::UPDATE, 500);
        assert_eq!(llf.rank(), rank::APERIODIC);
    }

    #[test]
    fn statistics_accumulate_execution() {
        let mut rr = Rr::new(rank::NORMAL);
        rr.handle(Event::CREATE, 0);
        rr.handle(Event::ENTER, 10);
        rr.handle(Event::LEAVE, 25);
        rr.handle(Event::ENTER, 40);
        rr.handle(Event::LEAVE, 45);
        assert_eq!(rr.statistics().thread_execution_time, 20);
        assert_eq!(rr.statistics().thread_last_preemption, 45);
    }

    #[test]
    fn job_accounting_per_release() {
        let mut edf = Edf::real_time(50_000, SAME, 20_000, ANY, 0);
        edf.handle(Event::JOB_RELEASE, 0);
        edf.handle(Event::ENTER, 1);
        edf.handle(Event::LEAVE, 6);
        assert_eq!(edf.statistics().job_utilization, 5);
        assert_eq!(edf.statistics().jobs_released, 1);

        edf.handle(Event::JOB_FINISH, 7);
        assert_eq!(edf.statistics().jobs_finished, 1);
        assert!(!edf.statistics().job_released);

        edf.handle(Event::JOB_RELEASE, 50);
        assert_eq!(edf.statistics().job_utilization, 0);
    }

    #[test]
    fn fcfs_orders_by_arrival() {
        let first = Fcfs::from_rank(rank::NORMAL, ANY, 10);
        let second = Fcfs::from_rank(rank::NORMAL, ANY, 20);
        assert!(first.rank() < second.rank());
        let idle = Fcfs::from_rank(rank::IDLE, ANY, 30);
        assert_eq!(idle.rank(), rank::IDLE);
    }

    #[test]
    fn pllf_pins_sentinels_to_their_cpu() {
        let idle = Pllf::from_rank(rank::IDLE, 2, 0);
        assert_eq!(idle.queue(), 2);
        let pinned = Pllf::real_time(100_000, SAME, UNKNOWN, 1, 0);
        assert_eq!(pinned.queue(), 1);
    }

    #[test]
    fn pllf_honors_the_requested_cpu_for_plain_threads() {
        let plain = Pllf::from_rank(rank::APERIODIC, 3, 0);
        assert_eq!(plain.queue(), 3);
    }
}
