//! Threaded scenario tests and property tests for the SPSC queue.
//!
//! These exercise the blocking slow paths: full-queue producer parking,
//! empty-queue consumer parking, wake hysteresis, and sustained wraparound.
//! The single-threaded fast-path tests live next to the implementation.

use super::*;

use std::sync::atomic::{AtomicBool, AtomicU64 as StdAtomicU64, Ordering as AtomicOrdering};
use std::thread;

#[test]
fn fifth_push_blocks_until_drain() {
    let (mut tx, mut rx) = channel::<u32>(4).unwrap();
    for v in 1..=4 {
        tx.push(v);
    }

    let fifth_done = Arc::new(AtomicBool::new(false));
    let producer = {
        let fifth_done = fifth_done.clone();
        thread::spawn(move || {
            tx.push(5);
            fifth_done.store(true, AtomicOrdering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(
        !fifth_done.load(AtomicOrdering::SeqCst),
        "push into a full queue must block"
    );

    let mut got = Vec::new();
    while got.len() < 5 {
        got.push(rx.pop());
    }
    producer.join().unwrap();
    assert!(fifth_done.load(AtomicOrdering::SeqCst));
    assert_eq!(got, vec![1, 2, 3, 4, 5]);
}

#[test]
fn logical_capacity_binds_below_ring_size() {
    // Capacity 5 rounds the ring to 8 slots but still admits only 5 items.
    let (mut tx, mut rx) = channel::<u32>(5).unwrap();
    for v in 0..5 {
        tx.push(v);
    }

    let sixth_done = Arc::new(AtomicBool::new(false));
    let producer = {
        let sixth_done = sixth_done.clone();
        thread::spawn(move || {
            tx.push(5);
            sixth_done.store(true, AtomicOrdering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(
        !sixth_done.load(AtomicOrdering::SeqCst),
        "occupancy must be bounded by the logical capacity, not the ring size"
    );

    let mut got = Vec::new();
    while got.len() < 6 {
        got.push(rx.pop());
    }
    producer.join().unwrap();
    assert_eq!(got, vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn lazy_burst_then_forced_tail_delivers_in_order() {
    const BURST: u32 = 1_000;
    let (mut tx, mut rx) = channel::<u32>(1024).unwrap();

    for v in 1..=BURST {
        tx.push_lazy(v);
    }
    assert_eq!(rx.available(), 0, "lazy pushes must stay unpublished");

    tx.push(BURST + 1);

    let mut out = Vec::new();
    while out.len() < (BURST + 1) as usize {
        rx.pop_batch(&mut out);
    }
    let expected: Vec<u32> = (1..=BURST + 1).collect();
    assert_eq!(out, expected);
}

#[test]
fn bursty_full_empty_oscillation() {
    const ITEMS: u64 = 20_000;
    const BURST: u64 = 16;
    let (mut tx, mut rx) = channel::<u64>(8).unwrap();

    let producer = thread::spawn(move || {
        let mut next = 0;
        while next < ITEMS {
            let burst_end = (next + BURST).min(ITEMS);
            while next < burst_end {
                tx.push(next);
                next += 1;
            }
            thread::yield_now();
        }
    });

    for expected in 0..ITEMS {
        assert_eq!(rx.pop(), expected);
        if expected % 128 == 0 {
            thread::yield_now();
        }
    }
    producer.join().unwrap();
    assert_eq!(rx.available(), 0);
}

#[test]
fn producer_wake_waits_for_quarter_drain() {
    const CAP: u64 = 64;
    let (mut tx, mut rx) = channel::<u64>(CAP as usize).unwrap();

    let pops = Arc::new(StdAtomicU64::new(0));
    let pops_at_unblock = Arc::new(StdAtomicU64::new(u64::MAX));

    let producer = {
        let pops = pops.clone();
        let pops_at_unblock = pops_at_unblock.clone();
        thread::spawn(move || {
            for v in 0..CAP {
                tx.push(v);
            }
            // Queue is now full; this push parks until the hysteresis
            // threshold (a quarter of the backlog) has drained.
            tx.push(CAP);
            pops_at_unblock.store(pops.load(AtomicOrdering::SeqCst), AtomicOrdering::SeqCst);
        })
    };

    // Give the producer time to fill the queue and park.
    thread::sleep(Duration::from_millis(100));

    for _ in 0..=CAP {
        let _ = rx.pop();
        pops.fetch_add(1, AtomicOrdering::SeqCst);
        thread::sleep(Duration::from_micros(200));
    }
    producer.join().unwrap();

    let observed = pops_at_unblock.load(AtomicOrdering::SeqCst);
    assert!(
        observed >= CAP / PROD_WAKE_DIVISOR,
        "producer woke after {} pops, expected at least {}",
        observed,
        CAP / PROD_WAKE_DIVISOR
    );

    let counters = rx.counters();
    assert!(counters.consumer_signals() >= 1, "a parked producer needs one wake");
    assert!(
        counters.consumer_signals() <= 8,
        "signals must be hysteresis-gated, got {}",
        counters.consumer_signals()
    );
}

#[test]
fn sustained_wraparound_preserves_order() {
    const ITEMS: u64 = 100_000;
    let (mut tx, mut rx) = channel::<u64>(4).unwrap();

    let producer = thread::spawn(move || {
        for v in 0..ITEMS {
            tx.push(v);
        }
    });

    for expected in 0..ITEMS {
        assert_eq!(rx.pop(), expected);
    }
    producer.join().unwrap();
}

#[test]
fn batched_consumer_preserves_order_across_threads() {
    const ITEMS: u64 = 50_000;
    let (mut tx, mut rx) = channel::<u64>(256).unwrap();

    let producer = thread::spawn(move || {
        for v in 0..ITEMS {
            tx.push(v);
        }
    });

    let mut out = Vec::new();
    let mut batches = 0u64;
    while (out.len() as u64) < ITEMS {
        let n = rx.pop_batch(&mut out);
        assert!(n >= 1);
        batches += 1;
    }
    producer.join().unwrap();

    for (i, &v) in out.iter().enumerate() {
        assert_eq!(v, i as u64, "FIFO violation at index {}", i);
    }
    assert!(batches <= ITEMS, "pop_batch must return at least one element per call");
}

#[test]
fn signals_stay_sublinear_under_steady_load() {
    const ITEMS: u64 = 50_000;
    let (mut tx, mut rx) = channel::<u64>(1024).unwrap();
    let counters = rx.counters();

    let producer = thread::spawn(move || {
        for v in 0..ITEMS {
            tx.push(v);
        }
    });

    for expected in 0..ITEMS {
        assert_eq!(rx.pop(), expected);
    }
    producer.join().unwrap();

    let prod = counters.producer_signals();
    let cons = counters.consumer_signals();
    assert!(
        prod + cons < ITEMS / 2,
        "near-empty fast path should keep signals sublinear: prod={} cons={}",
        prod,
        cons
    );

    // Counters are monotonically non-decreasing and settled after join.
    assert_eq!(counters.producer_signals(), prod);
    assert_eq!(counters.consumer_signals(), cons);
}

#[test]
fn remaining_and_lazy_items_drop_exactly_once() {
    struct DropTracker(Arc<StdAtomicU64>);
    impl Drop for DropTracker {
        fn drop(&mut self) {
            self.0.fetch_add(1, AtomicOrdering::Relaxed);
        }
    }

    let drops = Arc::new(StdAtomicU64::new(0));
    {
        let (mut tx, mut rx) = channel::<DropTracker>(8).unwrap();
        tx.push(DropTracker(drops.clone()));
        tx.push(DropTracker(drops.clone()));
        tx.push_lazy(DropTracker(drops.clone()));

        let popped = rx.pop();
        drop(popped);
        assert_eq!(drops.load(AtomicOrdering::Relaxed), 1);
        // One published and one unpublished item remain in the ring.
    }
    assert_eq!(drops.load(AtomicOrdering::Relaxed), 3);
}

#[test]
fn zero_sleep_config_still_delivers() {
    let config = SpscConfig {
        capacity: 8,
        cons_sleep_us: 0,
    };
    let (mut tx, mut rx) = channel_with::<u64>(config).unwrap();

    let producer = thread::spawn(move || {
        for v in 0..1_000u64 {
            tx.push(v);
        }
    });

    for expected in 0..1_000u64 {
        assert_eq!(rx.pop(), expected);
    }
    producer.join().unwrap();
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(feature = "spsc-proptest")]
mod property_tests {
    use crate::config::SpscConfig;
    use crate::spsc::channel_with;
    use crate::test_utils;

    use proptest::prelude::*;
    use std::collections::VecDeque;

    const PROPTEST_CASES: u32 = 32;
    const CAPACITY: usize = 8;

    /// Operations driven against the queue and a `VecDeque` model.
    ///
    /// The blocking API means the generator must stay occupancy-aware: a
    /// push is only issued with space available and a pop only with a
    /// published element available, tracked through `visible`/`pending`.
    #[derive(Debug, Clone, Copy)]
    enum Op {
        Push(u64),
        PushLazy(u64),
        Flush,
        Pop,
        PopBatch(usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            any::<u64>().prop_map(Op::Push),
            any::<u64>().prop_map(Op::PushLazy),
            Just(Op::Flush),
            Just(Op::Pop),
            (1..=2 * CAPACITY).prop_map(Op::PopBatch),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(
            test_utils::proptest_cases(PROPTEST_CASES)
        ))]

        /// Any occupancy-respecting op sequence matches the FIFO model,
        /// including lazy-publication visibility.
        #[test]
        fn model(ops in proptest::collection::vec(op_strategy(), 0..400)) {
            let (mut tx, mut rx) =
                channel_with::<u64>(SpscConfig::with_capacity(CAPACITY)).unwrap();
            let mut model: VecDeque<u64> = VecDeque::new();

            // Published element count and unpublished lazy tail length.
            let mut visible: usize = 0;
            let mut pending: usize = 0;

            for op in &ops {
                match *op {
                    Op::Push(v) => {
                        if visible + pending < CAPACITY {
                            tx.push(v);
                            model.push_back(v);
                            visible += pending + 1;
                            pending = 0;
                        }
                    }
                    Op::PushLazy(v) => {
                        if visible + pending < CAPACITY {
                            tx.push_lazy(v);
                            model.push_back(v);
                            pending += 1;
                        }
                    }
                    Op::Flush => {
                        tx.flush();
                        visible += pending;
                        pending = 0;
                    }
                    Op::Pop => {
                        if visible > 0 {
                            let got = rx.pop();
                            prop_assert_eq!(Some(got), model.pop_front());
                            visible -= 1;
                        }
                    }
                    Op::PopBatch(cap) => {
                        if visible > 0 {
                            let mut out = Vec::new();
                            let n = rx.pop_batch_capped(&mut out, cap);
                            prop_assert_eq!(n, visible.min(cap));
                            for got in out {
                                prop_assert_eq!(Some(got), model.pop_front());
                            }
                            visible -= n;
                        }
                    }
                }

                prop_assert_eq!(rx.available() as usize, visible);
                prop_assert!(visible + pending <= CAPACITY);
                prop_assert_eq!(model.len(), visible + pending);
            }

            // Drain everything, lazy tail included.
            tx.flush();
            visible += pending;
            while visible > 0 {
                let got = rx.pop();
                prop_assert_eq!(Some(got), model.pop_front());
                visible -= 1;
            }
            prop_assert!(model.is_empty());
        }
    }
}
