//! Classic priority inversion.
//!
//! A low-priority thread takes a mutex and works for half a second; a
//! high-priority thread blocks on that mutex shortly after, and a medium
//! one computes with no synchronizer at all. With inheritance enabled the
//! low thread runs at the blocked thread's priority, releases, and the
//! high thread finishes ahead of the medium one. Build with the crate
//! default (`Inheritance`) and again with the `ceiling` feature to compare.
//!
//! Runs on a target whose timer drives `preemptive_rt::tick_interrupt`.

use preemptive_rt::config::DefaultCriterion;
use preemptive_rt::sched::criterion::rank;
use preemptive_rt::{init, kernel, Alarm, Chronometer, Criterion, Mutex, Thread, ThreadEntry};
use std::sync::OnceLock;

static CRITICAL: OnceLock<Mutex> = OnceLock::new();
static CLOCK: OnceLock<Chronometer> = OnceLock::new();

fn stamp(who: char, what: &str) {
    let elapsed = CLOCK.get().unwrap().read() / 1000;
    println!("[{:6} ms] {}: {}", elapsed, who, what);
}

fn busy_work_ms(ms: u64) {
    let end = kernel::elapsed() + ms;
    while kernel::elapsed() < end {
        core::hint::spin_loop();
    }
}

fn low(_: usize) -> i32 {
    let lock = CRITICAL.get().unwrap();
    stamp('L', "tries to take the lock");
    lock.lock();
    stamp('L', "got the lock, working");
    busy_work_ms(500);
    stamp('L', "releasing");
    lock.unlock();
    0
}

fn high(_: usize) -> i32 {
    // Let L take the lock first.
    Alarm::delay(100);
    let lock = CRITICAL.get().unwrap();
    stamp('H', "tries to take the lock");
    lock.lock();
    stamp('H', "got the lock");
    lock.unlock();
    stamp('H', "done");
    0
}

fn medium(_: usize) -> i32 {
    Alarm::delay(200);
    stamp('M', "starts computing");
    busy_work_ms(300);
    stamp('M', "done");
    0
}

fn main() {
    init().expect("kernel init");
    println!("priority inversion:");

    CRITICAL.set(Mutex::new().expect("mutex")).ok().expect("mutex");
    let mut clock = Chronometer::new();
    clock.start();
    CLOCK.set(clock).ok().expect("clock");

    let spawn = |entry: ThreadEntry, priority: i32| {
        let conf = preemptive_rt::Configuration::ready(DefaultCriterion::from_rank(
            priority,
            0,
            kernel::elapsed(),
        ));
        Thread::spawn_with(conf, entry, 0).expect("thread")
    };

    let l = spawn(low, rank::NORMAL + 2);
    let h = spawn(high, rank::HIGH);
    let m = spawn(medium, rank::NORMAL);

    l.join();
    h.join();
    m.join();

    println!("with inheritance, H finished its critical section before M.");
}
