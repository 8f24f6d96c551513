//! Synchronizer and priority-inversion scenarios.
//!
//! The classic inversion, nested-mutex and transitive-boost cases from the
//! literature, driven through the inert architecture: the test plays each
//! thread at its suspension points and checks holders, waiters, ranks and
//! the restoration rules.

#![cfg(feature = "std")]

use preemptive_rt::arch::NoOpArch;
use preemptive_rt::sched::criterion::{rank, Priority};
use preemptive_rt::sync::{SyncConfig, SyncKind};
use preemptive_rt::thread::{Configuration, State};
use preemptive_rt::{Kernel, Protocol};

fn stub(_: usize) -> i32 {
    0
}

fn kernel() -> (Kernel<NoOpArch, Priority>, usize) {
    let mut k = Kernel::new(1);
    let main = k.init().expect("init");
    (k, main)
}

fn spawn(k: &mut Kernel<NoOpArch, Priority>, rank: i32) -> usize {
    k.spawn(Configuration::ready(Priority::new(rank)), stub, 0).unwrap()
}

#[test]
fn mutex_fast_path_and_holder_tracking() {
    let (mut k, main) = kernel();
    let l = spawn(&mut k, 30);
    k.suspend(0, main);
    assert_eq!(k.current(0), Some(l));

    let m = k.create_synchronizer(SyncKind::Mutex, 0, SyncConfig::default()).unwrap();
    assert!(k.mutex_lock(0, m));
    assert_eq!(k.holder_of(m), Some(l));
    assert_eq!(k.granted_of(m), &[l][..]);

    k.mutex_unlock(0, m);
    assert_eq!(k.holder_of(m), None);
    assert!(k.granted_of(m).is_empty());
}

#[test]
fn classic_inversion_inheritance() {
    let (mut k, main) = kernel();
    let m = k.create_synchronizer(SyncKind::Mutex, 0, SyncConfig::default()).unwrap();

    // L runs alone and takes the lock.
    let l = spawn(&mut k, 30);
    k.suspend(0, main);
    assert_eq!(k.current(0), Some(l));
    assert!(k.mutex_lock(0, m));

    // M and H arrive; H preempts L.
    let medium = spawn(&mut k, 20);
    let h = spawn(&mut k, 10);
    assert_eq!(k.current(0), Some(h));

    // H blocks on the mutex: L inherits H's priority and must outrank M,
    // so it gets the CPU back immediately.
    assert!(!k.mutex_lock(0, m));
    assert_eq!(k.state(h), State::Waiting);
    assert_eq!(k.waiters_of(m), 1);
    assert_eq!(k.rank_of(l), 10);
    assert_eq!(k.current(0), Some(l));
    assert_eq!(k.state(medium), State::Ready);

    // L releases: its priority reverts, ownership transfers to H, and H
    // runs its critical section before M gets a look-in.
    k.mutex_unlock(0, m);
    assert_eq!(k.rank_of(l), 30);
    assert_eq!(k.holder_of(m), Some(h));
    assert_eq!(k.current(0), Some(h));

    // H leaves the critical section; M finally runs, then L.
    k.mutex_unlock(0, m);
    k.exit(0, 0);
    assert_eq!(k.current(0), Some(medium));
}

#[test]
fn without_inversion_control_no_boost_happens() {
    let (mut k, main) = kernel();
    let m = k.create_synchronizer(SyncKind::Mutex, 0, SyncConfig::plain()).unwrap();

    let l = spawn(&mut k, 30);
    k.suspend(0, main);
    assert!(k.mutex_lock(0, m));

    let h = spawn(&mut k, 10);
    assert_eq!(k.current(0), Some(h));
    assert!(!k.mutex_lock(0, m));

    // No inheritance: L stays at its natural priority.
    assert_eq!(k.rank_of(l), 30);
    assert_eq!(k.holder_of(m), None);
}

#[test]
fn nested_mutexes_keep_boost_until_the_cause_is_released() {
    let (mut k, main) = kernel();
    let m1 = k.create_synchronizer(SyncKind::Mutex, 0, SyncConfig::default()).unwrap();
    let m2 = k.create_synchronizer(SyncKind::Mutex, 0, SyncConfig::default()).unwrap();

    let l = spawn(&mut k, 30);
    k.suspend(0, main);
    assert_eq!(k.current(0), Some(l));
    assert!(k.mutex_lock(0, m1));
    assert!(k.mutex_lock(0, m2));

    let h = spawn(&mut k, 10);
    assert_eq!(k.current(0), Some(h));
    assert!(!k.mutex_lock(0, m1));

    // Boosted through m1.
    assert_eq!(k.rank_of(l), 10);
    assert_eq!(k.current(0), Some(l));

    // Releasing m2 must NOT drop the boost: m1 caused it.
    k.mutex_unlock(0, m2);
    assert_eq!(k.rank_of(l), 10);

    // Releasing m1 restores the natural priority.
    k.mutex_unlock(0, m1);
    assert_eq!(k.rank_of(l), 30);
    assert_eq!(k.holder_of(m1), Some(h));
}

#[test]
fn transitive_boost_walks_the_blocking_chain() {
    let (mut k, main) = kernel();
    let ma = k.create_synchronizer(SyncKind::Mutex, 0, SyncConfig::default()).unwrap();
    let mb = k.create_synchronizer(SyncKind::Mutex, 0, SyncConfig::default()).unwrap();

    // t3 (lowest) holds ma.
    let t3 = spawn(&mut k, 30);
    k.suspend(0, main);
    assert_eq!(k.current(0), Some(t3));
    assert!(k.mutex_lock(0, ma));

    // t2 holds mb and blocks on ma: t3 inherits 20.
    let t2 = spawn(&mut k, 20);
    assert_eq!(k.current(0), Some(t2));
    assert!(k.mutex_lock(0, mb));
    assert!(!k.mutex_lock(0, ma));
    assert_eq!(k.rank_of(t3), 20);

    // t1 blocks on mb: the boost propagates through t2 to t3.
    let t1 = spawn(&mut k, 10);
    assert_eq!(k.current(0), Some(t1));
    assert!(!k.mutex_lock(0, mb));
    assert_eq!(k.rank_of(t2), 10);
    assert_eq!(k.rank_of(t3), 10);

    // Unwinding restores priorities step by step.
    assert_eq!(k.current(0), Some(t3));
    k.mutex_unlock(0, ma);
    assert_eq!(k.rank_of(t3), 30);
    assert_eq!(k.holder_of(ma), Some(t2));

    // t2 was woken owning ma; it runs at its boosted rank until mb goes.
    assert_eq!(k.current(0), Some(t2));
    k.mutex_unlock(0, ma);
    k.mutex_unlock(0, mb);
    assert_eq!(k.rank_of(t2), 20);
    assert_eq!(k.holder_of(mb), Some(t1));
}

#[test]
fn ceiling_boosts_on_acquisition() {
    let (mut k, main) = kernel();
    let m = k
        .create_synchronizer(SyncKind::Mutex, 0, SyncConfig::ceiling(5))
        .unwrap();

    let a = spawn(&mut k, 20);
    k.suspend(0, main);
    assert_eq!(k.current(0), Some(a));

    assert!(k.mutex_lock(0, m));
    // Raised to the resource ceiling immediately, no contention needed.
    assert_eq!(k.rank_of(a), 5);

    k.mutex_unlock(0, m);
    assert_eq!(k.rank_of(a), 20);
}

#[test]
fn ceiling_config_is_per_synchronizer() {
    let cfg = SyncConfig::ceiling(3);
    assert_eq!(cfg.protocol, Protocol::Ceiling);
    assert_eq!(cfg.ceiling, 3);
    assert_eq!(SyncConfig::default().ceiling, rank::CEILING);
}

#[test]
fn semaphore_counts_and_wakes_in_priority_order() {
    let (mut k, main) = kernel();
    let s = k.create_synchronizer(SyncKind::Semaphore, 2, SyncConfig::plain()).unwrap();

    // Main takes both tokens.
    assert!(k.sem_p(0, s));
    assert!(k.sem_p(0, s));
    assert_eq!(k.sem_value(s), 0);

    // Two waiters of different priority pile up. Main outranks both, so
    // the CPU falls back to it after each one blocks.
    let low = spawn(&mut k, 30);
    let high = spawn(&mut k, 10);
    k.pass(0, low);
    assert!(!k.sem_p(0, s));
    assert_eq!(k.current(0), Some(main));
    k.pass(0, high);
    assert!(!k.sem_p(0, s));
    assert_eq!(k.current(0), Some(main));
    assert_eq!(k.sem_value(s), -2);
    assert_eq!(k.waiters_of(s), 2);

    // v() hands the token to the highest-priority waiter first.
    k.sem_v(0, s);
    assert_eq!(k.state(high), State::Ready);
    assert_eq!(k.state(low), State::Waiting);
    k.sem_v(0, s);
    assert_eq!(k.state(low), State::Ready);
    assert_eq!(k.sem_value(s), 0);
    assert_eq!(k.waiters_of(s), 0);
}

#[test]
fn semaphore_conservation_invariant() {
    let (mut k, _main) = kernel();
    let initial = 2i64;
    let s = k
        .create_synchronizer(SyncKind::Semaphore, initial, SyncConfig::plain())
        .unwrap();

    let mut v_calls = 0i64;
    let mut completed_p = 0i64;

    for _ in 0..2 {
        assert!(k.sem_p(0, s));
        completed_p += 1;
    }
    for _ in 0..3 {
        k.sem_v(0, s);
        v_calls += 1;
    }
    assert!(k.sem_p(0, s));
    completed_p += 1;

    assert_eq!(initial + v_calls - completed_p, k.sem_value(s));
}

#[test]
fn condition_signal_wakes_one_broadcast_wakes_all() {
    let (mut k, main) = kernel();
    let c = k.create_synchronizer(SyncKind::Condition, 0, SyncConfig::plain()).unwrap();

    let a = spawn(&mut k, 10);
    let b = spawn(&mut k, 20);

    k.pass(0, a);
    k.cond_wait(0, c);
    assert_eq!(k.current(0), Some(main));
    k.pass(0, b);
    k.cond_wait(0, c);
    assert_eq!(k.current(0), Some(main));
    assert_eq!(k.waiters_of(c), 2);

    k.cond_signal(c);
    assert_eq!(k.waiters_of(c), 1);
    assert_eq!(k.state(a), State::Ready);
    assert_eq!(k.state(b), State::Waiting);

    k.cond_broadcast(c);
    assert_eq!(k.waiters_of(c), 0);
    assert_eq!(k.state(b), State::Ready);
}

#[test]
fn destroying_a_contended_synchronizer_wakes_waiters() {
    let (mut k, main) = kernel();
    let m = k.create_synchronizer(SyncKind::Mutex, 0, SyncConfig::default()).unwrap();

    assert!(k.mutex_lock(0, m));
    let w = spawn(&mut k, 10);
    k.pass(0, w);
    assert!(!k.mutex_lock(0, m));
    assert_eq!(k.current(0), Some(main));

    // Destruction wakes the blocked client; it observes a spurious wake.
    k.destroy_synchronizer(m);
    assert_eq!(k.state(w), State::Ready);
}

#[test]
fn philosophers_asymmetric_order_cannot_deadlock() {
    // Worst-case contention round of the dinner: every philosopher grabs
    // its first chopstick before anyone takes a second one. Philosophers
    // 0..3 take [i, i+1]; philosopher 4 takes [0, 4], so the wait-for
    // graph is a chain, never a cycle.
    let (mut k, main) = kernel();
    let mut chopstick = Vec::new();
    for _ in 0..5 {
        chopstick
            .push(k.create_synchronizer(SyncKind::Semaphore, 1, SyncConfig::plain()).unwrap());
    }
    // Distinct ranks make the interleaving deterministic.
    let phil: Vec<_> = (0..5).map(|i| spawn(&mut k, 10 + i)).collect();
    k.suspend(0, main);

    // Philosophers 0..3 each take their first stick, then "think"
    // (suspend), letting the next one run.
    for i in 0..4 {
        assert_eq!(k.current(0), Some(phil[i]));
        assert!(k.sem_p(0, chopstick[i]));
        k.suspend(0, phil[i]);
    }

    // Philosopher 4's first stick is number 0, already taken: it blocks
    // while holding nothing.
    assert_eq!(k.current(0), Some(phil[4]));
    assert!(!k.sem_p(0, chopstick[0]));
    assert_eq!(k.waiters_of(chopstick[0]), 1);

    // Everyone wakes up hungry and goes for the second stick.
    for i in 0..4 {
        k.resume(phil[i]).unwrap();
    }
    for i in 0..3 {
        assert_eq!(k.current(0), Some(phil[i]));
        assert!(!k.sem_p(0, chopstick[i + 1]));
    }

    // Philosopher 3's second stick (4) is free: somebody always eats.
    assert_eq!(k.current(0), Some(phil[3]));
    assert!(k.sem_p(0, chopstick[4]));

    // Eating done: releasing stick 3 hands it straight to philosopher 2,
    // which outranks 3 and preempts it. The meal cascades.
    k.sem_v(0, chopstick[4]);
    k.sem_v(0, chopstick[3]);
    assert_eq!(k.current(0), Some(phil[2]));

    k.sem_v(0, chopstick[3]);
    k.sem_v(0, chopstick[2]);
    assert_eq!(k.current(0), Some(phil[1]));

    k.sem_v(0, chopstick[2]);
    k.sem_v(0, chopstick[1]);
    assert_eq!(k.current(0), Some(phil[0]));

    k.sem_v(0, chopstick[1]);
    k.sem_v(0, chopstick[0]);
    // Philosopher 4 finally gets stick 0; it does not outrank 0, so it
    // only becomes ready.
    assert_eq!(k.state(phil[4]), State::Ready);
    assert_eq!(k.waiters_of(chopstick[0]), 0);
}
