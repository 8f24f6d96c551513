//! The philosophers' dinner.
//!
//! Five threads share five chopstick semaphores. Everyone takes the
//! lower-numbered chopstick first (the last philosopher reaches across the
//! table), so the wait-for graph can never close into a cycle.
//!
//! Runs on a target whose timer drives `preemptive_rt::tick_interrupt`;
//! without a running tick source the delays spin forever.

use preemptive_rt::{init, Alarm, Mutex, Semaphore, Thread};
use std::sync::OnceLock;

const ITERATIONS: i32 = 10;

static CHOPSTICK: OnceLock<[Semaphore; 5]> = OnceLock::new();
static TABLE: OnceLock<Mutex> = OnceLock::new();

fn philosopher(n: usize) -> i32 {
    let first = if n < 4 { n } else { 0 };
    let second = if n < 4 { n + 1 } else { 4 };
    let chopstick = CHOPSTICK.get().unwrap();
    let table = TABLE.get().unwrap();

    for _ in 0..ITERATIONS {
        // Thinking.
        Alarm::delay(10_000);

        chopstick[first].p();
        chopstick[second].p();

        table.lock();
        println!("philosopher {} is eating", n);
        table.unlock();

        // Eating.
        Alarm::delay(500_000);

        chopstick[first].v();
        chopstick[second].v();
    }

    ITERATIONS
}

fn main() {
    init().expect("kernel init");
    println!("The philosophers' dinner:");

    CHOPSTICK
        .set(std::array::from_fn(|_| Semaphore::new(1).expect("chopstick")))
        .ok()
        .expect("chopsticks");
    TABLE.set(Mutex::new().expect("table")).ok().expect("table");

    let philosophers: Vec<Thread> = (0..5)
        .map(|n| Thread::spawn(philosopher, n).expect("philosopher"))
        .collect();

    println!("philosophers are alive and hungry!");

    for (n, phil) in philosophers.iter().enumerate() {
        let ate = phil.join();
        println!("philosopher {} ate {} times", n, ate);
    }

    println!("the end!");
}
