//! Bounded queue throughput and latency benchmark.
//!
//! Usage:
//!     cargo run --release --bin queue_bench
//!
//! Environment variables:
//!     PRODUCER_CPU=0  Pin producer to CPU 0 (default: 0)
//!     CONSUMER_CPU=2  Pin consumer to CPU 2 (default: 2)

use std::env;
use std::sync::{Arc, Barrier};

use hopper::BoundedQueue;
use hopper::harness::{CONSUMER_CPU_ENV, PRODUCER_CPU_ENV};
use minstant::Instant;

const CAPACITIES: [usize; 3] = [1, 64, 4096];
const ITERATIONS: usize = 1 << 20;
const RTT_ITERATIONS: usize = 1 << 16;

type Payload = u64;

fn get_cpu_affinity() -> (Option<usize>, Option<usize>) {
    let cpu = |key: &str, default: usize| {
        env::var(key)
            .ok()
            .and_then(|s| s.parse().ok())
            .or(Some(default))
    };
    (cpu(PRODUCER_CPU_ENV, 0), cpu(CONSUMER_CPU_ENV, 2))
}

fn pin_to_cpu(cpu: Option<usize>) {
    if let Some(id) = cpu {
        core_affinity::set_for_current(core_affinity::CoreId { id });
    }
}

fn bench_throughput(capacity: usize, producer_cpu: Option<usize>, consumer_cpu: Option<usize>) {
    let Ok(queue) = BoundedQueue::<Payload>::with_capacity(capacity) else {
        return;
    };
    let ready = Arc::new(Barrier::new(2));

    let consumer = {
        let queue = queue.clone();
        let ready = Arc::clone(&ready);
        std::thread::spawn(move || {
            pin_to_cpu(consumer_cpu);
            ready.wait();
            for expected in 0..ITERATIONS as Payload {
                let value = queue.take();
                assert_eq!(value, expected, "data corruption");
            }
        })
    };

    pin_to_cpu(producer_cpu);
    ready.wait();

    let start = Instant::now();
    for i in 0..ITERATIONS as Payload {
        queue.put(i);
    }
    if consumer.join().is_err() {
        eprintln!("consumer thread panicked");
        return;
    }
    let elapsed = start.elapsed();

    let ops_per_ms = ITERATIONS as u128 * 1_000_000 / elapsed.as_nanos().max(1);
    println!("  capacity {capacity:>5}: {ops_per_ms} ops/ms");
}

fn bench_rtt(producer_cpu: Option<usize>, consumer_cpu: Option<usize>) {
    let (Ok(ping), Ok(pong)) = (
        BoundedQueue::<Payload>::with_capacity(1),
        BoundedQueue::<Payload>::with_capacity(1),
    ) else {
        return;
    };
    let ready = Arc::new(Barrier::new(2));

    let responder = {
        let (ping, pong) = (ping.clone(), pong.clone());
        let ready = Arc::clone(&ready);
        std::thread::spawn(move || {
            pin_to_cpu(consumer_cpu);
            ready.wait();
            for _ in 0..RTT_ITERATIONS {
                pong.put(ping.take());
            }
        })
    };

    pin_to_cpu(producer_cpu);
    ready.wait();

    let start = Instant::now();
    for i in 0..RTT_ITERATIONS as Payload {
        ping.put(i);
        let _ = pong.take();
    }
    let elapsed = start.elapsed();
    let _ = responder.join();

    let rtt_ns = elapsed.as_nanos() / RTT_ITERATIONS as u128;
    println!("  {rtt_ns} ns RTT");
}

fn main() {
    let (producer_cpu, consumer_cpu) = get_cpu_affinity();

    println!("hopper BoundedQueue (iters={ITERATIONS}):");
    for capacity in CAPACITIES {
        bench_throughput(capacity, producer_cpu, consumer_cpu);
    }
    println!("hopper ping-pong (capacity=1, iters={RTT_ITERATIONS}):");
    bench_rtt(producer_cpu, consumer_cpu);
}
