//! Property-based tests over randomized operation sequences, covering the
//! P1/P3/P6-style invariants from spec.md §8.

use mpmc64::{LqQueue, RqQueue};
use proptest::prelude::*;

// =============================================================================
// P6: Empty contract — dequeue on an empty queue returns None, and a
// dequeue immediately following never "skips" a value that was never
// enqueued.
// =============================================================================

proptest! {
    /// P6: a queue that only ever receives `enqueues` items and is then
    /// drained `enqueues + extra_dequeues` times returns exactly
    /// `enqueues` `Some`s followed by `extra_dequeues` `None`s, single
    /// threaded so order is trivially deterministic.
    #[test]
    fn prop_empty_contract_lq(enqueues in 0u64..200, extra_dequeues in 0usize..20) {
        let q = LqQueue::new().unwrap();
        for i in 0..enqueues {
            q.enqueue(i);
        }
        for i in 0..enqueues {
            prop_assert_eq!(q.dequeue(), Some(i));
        }
        for _ in 0..extra_dequeues {
            prop_assert_eq!(q.dequeue(), None);
        }
    }

    #[test]
    fn prop_empty_contract_rq(enqueues in 0u64..200, extra_dequeues in 0usize..20) {
        let q = RqQueue::new().unwrap();
        for i in 0..enqueues {
            q.enqueue(i);
        }
        for i in 0..enqueues {
            prop_assert_eq!(q.dequeue(), Some(i));
        }
        for _ in 0..extra_dequeues {
            prop_assert_eq!(q.dequeue(), None);
        }
    }
}

// =============================================================================
// P1: LQ linearizability — single producer, single consumer, arbitrary
// interleaving of enqueue/dequeue calls still yields items in strictly
// ascending enqueue order.
// =============================================================================

proptest! {
    /// P1 (single-producer form): whatever order enqueue/dequeue calls are
    /// interleaved in on one thread, dequeue never returns a value out of
    /// the order it was enqueued in, and never returns a value twice.
    #[test]
    fn prop_lq_single_producer_fifo(ops in prop::collection::vec(prop::bool::ANY, 1..300)) {
        let q = LqQueue::new().unwrap();
        let mut next_to_enqueue = 0u64;
        let mut next_expected = 0u64;

        for enqueue_op in ops {
            if enqueue_op {
                q.enqueue(next_to_enqueue);
                next_to_enqueue += 1;
            } else if let Some(d) = q.dequeue() {
                prop_assert_eq!(d, next_expected);
                next_expected += 1;
            }
        }
        while let Some(d) = q.dequeue() {
            prop_assert_eq!(d, next_expected);
            next_expected += 1;
        }
        prop_assert_eq!(next_expected, next_to_enqueue);
    }
}

// =============================================================================
// P3: No loss under contention — total successful dequeues equals total
// enqueues at quiescence (single-threaded form; concurrent form lives in
// tests/integration_tests.rs S3).
// =============================================================================

proptest! {
    #[test]
    fn prop_lq_no_loss_at_quiescence(n in 0u64..500) {
        let q = LqQueue::new().unwrap();
        for i in 0..n {
            q.enqueue(i);
        }
        let mut count = 0u64;
        while q.dequeue().is_some() {
            count += 1;
        }
        prop_assert_eq!(count, n);
    }

    #[test]
    fn prop_rq_no_loss_at_quiescence(n in 0u64..500) {
        let q = RqQueue::new().unwrap();
        for i in 0..n {
            q.enqueue(i);
        }
        let mut count = 0u64;
        while q.dequeue().is_some() {
            count += 1;
        }
        prop_assert_eq!(count, n);
    }
}

// =============================================================================
// P5: RQ per-producer FIFO — a single producer enqueuing 1..K, drained by
// the same thread interleaved with further enqueues, never observes the
// sub-queue's own values out of order.
// =============================================================================

proptest! {
    #[test]
    fn prop_rq_per_producer_fifo(ops in prop::collection::vec(prop::bool::ANY, 1..300)) {
        let q = RqQueue::new().unwrap();
        let mut next_to_enqueue = 0u64;
        let mut next_expected = 0u64;

        for enqueue_op in ops {
            if enqueue_op {
                q.enqueue(next_to_enqueue);
                next_to_enqueue += 1;
            } else if let Some(d) = q.dequeue() {
                prop_assert_eq!(d, next_expected);
                next_expected += 1;
            }
        }
        while let Some(d) = q.dequeue() {
            prop_assert_eq!(d, next_expected);
            next_expected += 1;
        }
        prop_assert_eq!(next_expected, next_to_enqueue);
    }
}
