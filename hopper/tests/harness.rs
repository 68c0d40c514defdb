//! End-to-end tests for the producer/consumer harness.
//!
//! These tests verify that the queue contract holds while driven by real
//! role threads:
//! 1. Counted runs complete and every item is consumed exactly once
//! 2. Unbounded runs stop on cancellation, including roles blocked in the queue
//! 3. Roles pass through the blocked states when the queue is full or empty

use std::collections::HashSet;
use std::sync::Once;
use std::thread;
use std::time::{Duration, Instant};

use hopper::harness::{
    ConfigError, Harness, HarnessConfig, HarnessError, Item, RoleKind, RoleState, StopReason,
};

static INIT_TRACING: Once = Once::new();

/// Initialize tracing for tests (only once).
fn init_test_tracing() {
    INIT_TRACING.call_once(|| {
        hopper::init_tracing();
    });
}

fn unpaced(capacity: usize, producers: usize, consumers: usize, items: Option<u64>) -> HarnessConfig {
    HarnessConfig {
        capacity,
        producers,
        consumers,
        items_per_producer: items,
        produce_pause: Duration::ZERO,
        consume_pause: Duration::ZERO,
        ..HarnessConfig::default()
    }
}

fn wait_for_state(harness: &Harness, kind: RoleKind, wanted: RoleState) {
    let start = Instant::now();
    while !harness
        .states()
        .iter()
        .any(|&(_, k, state)| k == kind && state == wanted)
    {
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "no {kind:?} reached {wanted:?}: {:?}",
            harness.states()
        );
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn counted_run_delivers_every_item_once() {
    init_test_tracing();
    let report = Harness::spawn(unpaced(3, 3, 2, Some(300)))
        .unwrap()
        .join()
        .unwrap();

    assert_eq!(report.produced(), 900);
    assert_eq!(report.consumed(), 900);
    assert!(report.leftover.is_empty());
    assert!(report.roles.iter().all(|role| role.stop == StopReason::Completed));

    let mut seen = HashSet::new();
    for item in report.received() {
        assert!(seen.insert(*item), "duplicate {item}");
    }
    let expected: HashSet<Item> = (0..3)
        .flat_map(|producer| (0..300).map(move |seq| Item { producer, seq }))
        .collect();
    assert_eq!(seen, expected);
}

#[test]
fn single_pair_observes_production_order() {
    init_test_tracing();
    let report = Harness::spawn(unpaced(2, 1, 1, Some(50)))
        .unwrap()
        .join()
        .unwrap();

    let seqs: Vec<u64> = report.received().map(|item| item.seq).collect();
    assert_eq!(seqs, (0..50).collect::<Vec<_>>());
}

#[test]
fn slow_consumer_blocks_producer() {
    init_test_tracing();
    let config = HarnessConfig {
        consume_pause: Duration::from_millis(200),
        ..unpaced(2, 1, 1, None)
    };
    let harness = Harness::spawn(config).unwrap();

    wait_for_state(&harness, RoleKind::Producer, RoleState::BlockedOnPut);
    assert!(harness.queue().len() <= 2);

    let report = harness.shutdown().unwrap();
    assert!(report.roles.iter().all(|role| role.stop == StopReason::Cancelled));
    // Whatever was put but not taken is reported, not dropped.
    assert_eq!(
        report.produced(),
        report.consumed() + report.leftover.len() as u64
    );
}

#[test]
fn idle_consumers_block_and_cancel() {
    init_test_tracing();
    let config = HarnessConfig {
        produce_pause: Duration::from_secs(60),
        ..unpaced(4, 1, 2, None)
    };
    let harness = Harness::spawn(config).unwrap();

    wait_for_state(&harness, RoleKind::Consumer, RoleState::BlockedOnTake);

    let started = Instant::now();
    let report = harness.shutdown().unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    // The producer put at most its first item before pausing.
    assert!(report.produced() <= 1);
    assert_eq!(
        report.produced(),
        report.consumed() + report.leftover.len() as u64
    );
    assert!(report.roles.iter().all(|role| role.stop == StopReason::Cancelled));
}

#[test]
fn external_token_cancels_roles() {
    init_test_tracing();
    let harness = Harness::spawn(unpaced(1, 2, 1, None)).unwrap();
    let token = harness.cancel_token();

    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        token.cancel();
    });

    let report = harness.join().unwrap();
    canceller.join().unwrap();
    assert_eq!(report.roles.len(), 3);
    assert!(report.produced() > 0);
    assert_eq!(
        report.produced(),
        report.consumed() + report.leftover.len() as u64
    );
}

#[test]
fn bounded_waits_are_retried() {
    init_test_tracing();
    let config = HarnessConfig {
        wait_timeout: Some(Duration::from_millis(5)),
        produce_pause: Duration::from_millis(40),
        ..unpaced(1, 1, 1, Some(3))
    };
    let report = Harness::spawn(config).unwrap().join().unwrap();

    assert_eq!(report.consumed(), 3);
    let consumer = report
        .roles
        .iter()
        .find(|role| role.kind == RoleKind::Consumer)
        .unwrap();
    assert!(consumer.timeouts > 0);
}

#[test]
fn states_terminate_after_join() {
    init_test_tracing();
    let harness = Harness::spawn(unpaced(2, 1, 1, Some(5))).unwrap();
    let names: Vec<String> = harness
        .states()
        .iter()
        .map(|(name, _, _)| (*name).to_owned())
        .collect();
    assert_eq!(names, vec!["hopper-consumer-0", "hopper-producer-0"]);

    let start = Instant::now();
    while !harness.is_finished() {
        assert!(start.elapsed() < Duration::from_secs(5));
        thread::sleep(Duration::from_millis(1));
    }
    assert!(harness
        .states()
        .iter()
        .all(|&(_, _, state)| state == RoleState::Terminated));
    harness.join().unwrap();
}

#[test]
fn invalid_config_is_rejected() {
    let err = Harness::spawn(unpaced(0, 1, 1, Some(1))).err().unwrap();
    assert!(matches!(err, HarnessError::Config(ConfigError::ZeroCapacity)));

    let err = Harness::spawn(unpaced(1, 1, 0, Some(1))).err().unwrap();
    assert!(matches!(err, HarnessError::Config(ConfigError::NoConsumers)));
}

#[test]
fn unbounded_run_reports_counts_without_items() {
    init_test_tracing();
    let harness = Harness::spawn(unpaced(64, 1, 1, None)).unwrap();
    thread::sleep(Duration::from_millis(100));

    let report = harness.shutdown().unwrap();
    assert!(report.consumed() > 0);
    assert_eq!(report.received().count(), 0);
    assert_eq!(
        report.produced(),
        report.consumed() + report.leftover.len() as u64
    );
}
