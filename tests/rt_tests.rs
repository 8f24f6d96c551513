//! Alarm service, periodic threads and the real-time criteria.
//!
//! Time is driven by hand: each `tick` call is one timer interrupt on the
//! inert architecture, so periodicity, job releases and deadline ordering
//! can be checked tick by tick.

#![cfg(feature = "std")]

use preemptive_rt::arch::NoOpArch;
use preemptive_rt::rt::RtConf;
use preemptive_rt::sched::criterion::{rank, Dm, Edf, Gllf, Llf, Pllf, Rm, Rr};
use preemptive_rt::sched::Criterion;
use preemptive_rt::thread::{Configuration, State};
use preemptive_rt::time::AlarmHandler;
use preemptive_rt::Kernel;
use std::sync::atomic::{AtomicUsize, Ordering};

fn stub(_: usize) -> i32 {
    0
}

// One counter per test: the harness runs tests concurrently.
macro_rules! fire_counter {
    ($counter:ident, $bump:ident) => {
        static $counter: AtomicUsize = AtomicUsize::new(0);
        fn $bump() {
            $counter.fetch_add(1, Ordering::SeqCst);
        }
    };
}

fire_counter!(PERIODIC_FIRED, bump_periodic);
fire_counter!(ONESHOT_FIRED, bump_oneshot);
fire_counter!(RESET_FIRED, bump_reset);
fire_counter!(PAIR_FIRED, bump_pair);

#[test]
fn alarm_fires_periodically_until_exhausted() {
    let mut k: Kernel<NoOpArch, Rr> = Kernel::new(1);
    k.init().unwrap();

    // 3 ms period at the 1 kHz tick, three repetitions.
    let alarm = k.create_alarm(3_000, AlarmHandler::Function(bump_periodic), 3).unwrap();

    let mut fired_at = Vec::new();
    for _ in 0..20 {
        let before = PERIODIC_FIRED.load(Ordering::SeqCst);
        k.tick(0);
        if PERIODIC_FIRED.load(Ordering::SeqCst) > before {
            fired_at.push(k.elapsed());
        }
    }

    assert_eq!(PERIODIC_FIRED.load(Ordering::SeqCst), 3);
    assert_eq!(fired_at, [3, 6, 9]);
    assert_eq!(k.alarm_times(alarm), 0);
}

#[test]
fn zero_period_single_shot_fires_synchronously() {
    let mut k: Kernel<NoOpArch, Rr> = Kernel::new(1);
    k.init().unwrap();

    k.create_alarm(0, AlarmHandler::Function(bump_oneshot), 1).unwrap();
    assert_eq!(ONESHOT_FIRED.load(Ordering::SeqCst), 1);
}

#[test]
fn alarm_reset_rebases_from_now() {
    let mut k: Kernel<NoOpArch, Rr> = Kernel::new(1);
    k.init().unwrap();

    let alarm = k.create_alarm(5_000, AlarmHandler::Function(bump_reset), u32::MAX).unwrap();
    for _ in 0..3 {
        k.tick(0);
    }
    // Rearmed at tick 3: next activation at tick 8, not 5.
    k.alarm_reset(alarm);
    for _ in 0..4 {
        k.tick(0);
    }
    assert_eq!(RESET_FIRED.load(Ordering::SeqCst), 0);
    k.tick(0);
    assert_eq!(RESET_FIRED.load(Ordering::SeqCst), 1);
}

#[test]
fn two_alarms_interleave_by_deadline() {
    let mut k: Kernel<NoOpArch, Rr> = Kernel::new(1);
    k.init().unwrap();

    // Fast one at 2 ticks, slow one at 5; the amortized service may slip a
    // coalesced activation by a tick, so only the totals are asserted.
    k.create_alarm(2_000, AlarmHandler::Function(bump_pair), 3).unwrap();
    k.create_alarm(5_000, AlarmHandler::Function(bump_pair), 1).unwrap();
    for _ in 0..14 {
        k.tick(0);
    }
    assert_eq!(PAIR_FIRED.load(Ordering::SeqCst), 4);
}

#[test]
fn periodic_thread_releases_one_job_per_period() {
    let mut k: Kernel<NoOpArch, Edf> = Kernel::new(1);
    let main = k.init().unwrap();

    // 5 ms period, two jobs in total.
    let (t, sem, alarm) = k
        .spawn_periodic(RtConf::new(5_000).times(2), stub, 0)
        .unwrap();

    // Initial release: the first job is ready immediately, with the rank
    // at its absolute deadline.
    assert_eq!(k.state(t), State::Ready);
    assert_eq!(k.rank_of(t), 5);
    assert_eq!(k.statistics_of(t).jobs_released, 1);

    // Main steps aside; the job runs.
    k.suspend(0, main);
    assert_eq!(k.current(0), Some(t));

    // Job one finishes early and blocks for the next release.
    assert!(k.wait_next(0));
    assert_eq!(k.state(t), State::Waiting);
    assert_eq!(k.statistics_of(t).jobs_finished, 1);

    // The release at tick 5 wakes it with a new deadline.
    for _ in 0..5 {
        k.tick(0);
    }
    assert_eq!(k.state(t), State::Running);
    assert_eq!(k.current(0), Some(t));
    assert_eq!(k.rank_of(t), 10);
    assert_eq!(k.statistics_of(t).jobs_released, 2);

    // No repetitions left: the job loop ends.
    assert!(!k.wait_next(0));
    assert_eq!(k.statistics_of(t).jobs_finished, 2);
    k.exit(0, 0);
    assert_eq!(k.join_prepare(0, t), Some(0));

    let _ = (sem, alarm);
}

#[test]
fn edf_orders_ready_jobs_by_absolute_deadline() {
    let mut k: Kernel<NoOpArch, Edf> = Kernel::new(1);
    let main = k.init().unwrap();

    let (a, ..) = k.spawn_periodic(RtConf::new(100_000), stub, 0).unwrap();
    let (b, ..) = k.spawn_periodic(RtConf::new(80_000), stub, 0).unwrap();
    let (c, ..) = k.spawn_periodic(RtConf::new(60_000), stub, 0).unwrap();

    // All released at tick 0: deadlines 100, 80, 60.
    assert_eq!(k.rank_of(a), 100);
    assert_eq!(k.rank_of(b), 80);
    assert_eq!(k.rank_of(c), 60);

    let ready: Vec<_> = k.ready_ids(0).iter().copied().collect();
    assert_eq!(&ready[..3], &[c, b, a]);

    // Earliest deadline runs first.
    k.suspend(0, main);
    assert_eq!(k.current(0), Some(c));
}

#[test]
fn edf_deadlines_met_under_feasible_load() {
    // Utilization 50/100 + 20/80 + 10/60 is about 0.92: every job must be
    // released again before its next period, i.e. no release may find the
    // previous job still pending.
    let mut k: Kernel<NoOpArch, Edf> = Kernel::new(1);
    let main = k.init().unwrap();

    let (a, _, al_a) = k
        .spawn_periodic(RtConf::new(100_000).capacity(50_000).times(10), stub, 0)
        .unwrap();
    let (b, _, al_b) = k
        .spawn_periodic(RtConf::new(80_000).capacity(20_000).times(10), stub, 0)
        .unwrap();
    let (c, _, al_c) = k
        .spawn_periodic(RtConf::new(60_000).capacity(10_000).times(10), stub, 0)
        .unwrap();

    k.suspend(0, main);

    // Jobs are "instantaneous" here: each one finishes as soon as its
    // thread runs, so the schedule is feasible by construction and every
    // thread observes one release per period boundary.
    let mut guard = 0;
    let exhausted = |k: &Kernel<NoOpArch, Edf>| {
        [al_a, al_b, al_c].iter().all(|&al| k.alarm_times(al) == 0)
    };
    while !exhausted(&k) && guard < 2_000 {
        // Whoever is running completes its job and waits.
        let running = k.current(0).unwrap();
        if running != main && k.rank_of(running) != rank::IDLE {
            k.wait_next(0);
        }
        k.tick(0);
        guard += 1;
    }
    assert!(guard < 2_000, "periodic set never drained");

    // Ten jobs each were released; none was lost to overrun.
    assert!(k.statistics_of(a).jobs_released >= 10);
    assert!(k.statistics_of(b).jobs_released >= 10);
    assert!(k.statistics_of(c).jobs_released >= 10);
}

#[test]
fn quantum_expiry_rotates_timed_policies() {
    let mut k: Kernel<NoOpArch, Rr> = Kernel::new(1);
    let main = k.init().unwrap();

    let a = k
        .spawn(
            preemptive_rt::thread::Configuration::ready(Rr::new(rank::NORMAL)),
            stub,
            0,
        )
        .unwrap();
    let b = k
        .spawn(
            preemptive_rt::thread::Configuration::ready(Rr::new(rank::NORMAL)),
            stub,
            0,
        )
        .unwrap();
    k.suspend(0, main);
    assert_eq!(k.current(0), Some(a));

    // A full quantum of ticks passes: the peer takes over.
    for _ in 0..10 {
        k.tick(0);
    }
    assert_eq!(k.current(0), Some(b));
    for _ in 0..10 {
        k.tick(0);
    }
    assert_eq!(k.current(0), Some(a));
}

#[test]
fn pllf_partitions_threads_per_cpu() {
    let mut k: Kernel<NoOpArch, Pllf> = Kernel::new(2);
    k.init().unwrap();

    let (t0, ..) = k
        .spawn_periodic(RtConf::new(50_000).capacity(10_000).cpu(0), stub, 0)
        .unwrap();
    let (t1, ..) = k
        .spawn_periodic(RtConf::new(50_000).capacity(10_000).cpu(1), stub, 0)
        .unwrap();

    assert!(k.ready_ids(0).iter().any(|&t| t == t0));
    assert!(k.ready_ids(1).iter().any(|&t| t == t1));

    // CPU 1 reschedules and picks its own thread, never CPU 0's.
    k.reschedule(1);
    assert_eq!(k.current(1), Some(t1));
    assert_ne!(k.current(0), Some(t1));
}

#[test]
fn gllf_heads_never_hand_one_thread_to_two_cpus() {
    let mut k: Kernel<NoOpArch, Gllf> = Kernel::new(2);
    let main = k.init().unwrap();

    let (ta, ..) = k
        .spawn_periodic(RtConf::new(40_000).capacity(10_000), stub, 0)
        .unwrap();
    let (tb, ..) = k
        .spawn_periodic(RtConf::new(60_000).capacity(10_000), stub, 0)
        .unwrap();

    // Both CPUs pick from the shared queue; their choices are distinct.
    k.suspend(0, main);
    k.reschedule(1);
    let on0 = k.current(0).unwrap();
    let on1 = k.current(1).unwrap();
    assert_ne!(on0, on1);
    assert!([ta, tb].contains(&on0));
    assert!([ta, tb].contains(&on1));
    // The tighter laxity went first.
    assert_eq!(on0, ta);
}

#[test]
fn rm_ranks_shorter_periods_higher() {
    let mut k: Kernel<NoOpArch, Rm> = Kernel::new(1);
    let main = k.init().unwrap();

    let (slow, ..) = k.spawn_periodic(RtConf::new(100_000), stub, 0).unwrap();
    let (fast, ..) = k.spawn_periodic(RtConf::new(20_000), stub, 0).unwrap();

    assert_eq!(k.rank_of(slow), 100);
    assert_eq!(k.rank_of(fast), 20);

    k.suspend(0, main);
    assert_eq!(k.current(0), Some(fast));
}

#[test]
fn dm_ranks_by_relative_deadline_not_period() {
    let mut k: Kernel<NoOpArch, Dm> = Kernel::new(1);
    let main = k.init().unwrap();

    // Longer period but tighter deadline wins under DM.
    let (loose, ..) = k
        .spawn_periodic(RtConf::new(50_000).deadline(50_000), stub, 0)
        .unwrap();
    let (tight, ..) = k
        .spawn_periodic(RtConf::new(80_000).deadline(30_000), stub, 0)
        .unwrap();

    assert_eq!(k.rank_of(loose), 50);
    assert_eq!(k.rank_of(tight), 30);

    k.suspend(0, main);
    assert_eq!(k.current(0), Some(tight));
}

#[test]
fn llf_tracks_consumed_capacity_across_preemptions() {
    let mut k: Kernel<NoOpArch, Llf> = Kernel::new(1);
    let main = k.init().unwrap();

    // Identical parameters: laxity alone decides.
    let (a, ..) = k
        .spawn_periodic(RtConf::new(50_000).capacity(20_000), stub, 0)
        .unwrap();
    let (b, ..) = k
        .spawn_periodic(RtConf::new(50_000).capacity(20_000), stub, 0)
        .unwrap();
    assert_eq!(k.rank_of(a), 30);
    assert_eq!(k.rank_of(b), 30);

    // a (released first) runs and burns three ticks of its capacity.
    k.suspend(0, main);
    assert_eq!(k.current(0), Some(a));
    for _ in 0..3 {
        k.tick(0);
    }

    // On yield, b has the smaller laxity and takes over.
    k.yield_now(0);
    assert_eq!(k.current(0), Some(b));

    // The next scheduling event refreshes a's rank with the time it
    // consumed: laxity grew by the three executed ticks.
    k.reschedule(0);
    assert_eq!(k.current(0), Some(b));
    assert_eq!(k.rank_of(a), 3 + 50 - 20 + 3);
}

#[test]
fn deferred_activation_delays_the_first_job() {
    let mut k: Kernel<NoOpArch, Edf> = Kernel::new(1);
    let main = k.init().unwrap();

    // 10 ms period, first release only at 4 ms.
    let (t, ..) = k
        .spawn_periodic(RtConf::new(10_000).activation(4_000).times(3), stub, 0)
        .unwrap();

    // No initial release: the thread stays parked.
    assert_eq!(k.state(t), State::Suspended);
    assert_eq!(k.statistics_of(t).jobs_released, 0);

    k.suspend(0, main);
    for _ in 0..3 {
        k.tick(0);
    }
    assert_eq!(k.state(t), State::Suspended);

    // The activation alarm resumes it with its first job.
    k.tick(0);
    assert_eq!(k.state(t), State::Running);
    assert_eq!(k.current(0), Some(t));
    assert_eq!(k.statistics_of(t).jobs_released, 1);

    // Releases stay one full period apart from the activation point.
    assert!(k.wait_next(0));
    assert_eq!(k.state(t), State::Waiting);
    for _ in 0..10 {
        k.tick(0);
    }
    assert_eq!(k.state(t), State::Running);
    assert_eq!(k.statistics_of(t).jobs_released, 2);
}

#[test]
fn pllf_places_plain_threads_on_the_requested_cpu() {
    let mut k: Kernel<NoOpArch, Pllf> = Kernel::new(2);
    k.init().unwrap();

    // An ordinary (non-periodic) thread pinned to CPU 1 at creation.
    let pinned = k
        .spawn(Configuration::ready(Pllf::from_rank(rank::APERIODIC, 1, 0)), stub, 0)
        .unwrap();

    assert!(k.ready_ids(1).iter().any(|&t| t == pinned));
    assert!(k.ready_ids(0).iter().all(|&t| t != pinned));

    // Only CPU 1's scheduler ever serves it.
    k.reschedule(1);
    assert_eq!(k.current(1), Some(pinned));
    assert_ne!(k.current(0), Some(pinned));
}
