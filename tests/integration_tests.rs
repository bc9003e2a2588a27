//! Black-box scenarios S1-S4 and S6 from spec.md §8, driving the public
//! `LqQueue`/`RqQueue` facades with real OS threads.

use mpmc64::{LqQueue, RqQueue, TEST_SMALL_POOL_CONFIG};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

// S1 — single-threaded, both engines: enqueue 10/20/30, three dequeues in
// order, fourth reports empty.

#[test]
fn s1_single_threaded_lq() {
    let q = LqQueue::new().unwrap();
    q.enqueue(10);
    q.enqueue(20);
    q.enqueue(30);
    assert_eq!(q.dequeue(), Some(10));
    assert_eq!(q.dequeue(), Some(20));
    assert_eq!(q.dequeue(), Some(30));
    assert_eq!(q.dequeue(), None);
}

#[test]
fn s1_single_threaded_rq() {
    let q = RqQueue::new().unwrap();
    q.enqueue(10);
    q.enqueue(20);
    q.enqueue(30);
    assert_eq!(q.dequeue(), Some(10));
    assert_eq!(q.dequeue(), Some(20));
    assert_eq!(q.dequeue(), Some(30));
    assert_eq!(q.dequeue(), None);
}

// S2 — drain-then-refill (LQ): enqueue 1..5, drain, enqueue 6..8, drain,
// empty.

#[test]
fn s2_drain_then_refill_lq() {
    let q = LqQueue::new().unwrap();
    for i in 1..=5u64 {
        q.enqueue(i);
    }
    for i in 1..=5u64 {
        assert_eq!(q.dequeue(), Some(i));
    }
    for i in 6..=8u64 {
        q.enqueue(i);
    }
    for i in 6..=8u64 {
        assert_eq!(q.dequeue(), Some(i));
    }
    assert_eq!(q.dequeue(), None);
}

// S3 — concurrent exactness: 4 producers x 20000, 4 consumers draining
// until producers are done and the queue is empty; every value must have
// been seen exactly 4 times.

fn concurrent_exactness<Q, F, G>(make: F, enqueue: fn(&Q, u64), dequeue: G)
where
    Q: Send + Sync + 'static,
    F: FnOnce() -> Q,
    G: Fn(&Q) -> Option<u64> + Send + Sync + 'static,
{
    const PRODUCERS: u64 = 4;
    const K: u64 = 20_000;
    const CONSUMERS: usize = 4;

    let q = Arc::new(make());
    let seen: Arc<Vec<AtomicU32>> = Arc::new((0..K).map(|_| AtomicU32::new(0)).collect());
    let producers_done = Arc::new(AtomicBool::new(false));
    let dequeue = Arc::new(dequeue);

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let q = Arc::clone(&q);
            let seen = Arc::clone(&seen);
            let producers_done = Arc::clone(&producers_done);
            let dequeue = Arc::clone(&dequeue);
            thread::spawn(move || {
                let mut drained = 0u64;
                loop {
                    match dequeue(&q) {
                        Some(d) => {
                            seen[d as usize].fetch_add(1, Ordering::SeqCst);
                            drained += 1;
                        }
                        None => {
                            if producers_done.load(Ordering::Acquire) {
                                break;
                            }
                            thread::yield_now();
                        }
                    }
                }
                drained
            })
        })
        .collect();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|_| {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                for i in 0..K {
                    enqueue(&q, i);
                }
            })
        })
        .collect();
    for p in producers {
        p.join().unwrap();
    }
    producers_done.store(true, Ordering::Release);

    let mut total: u64 = consumers.into_iter().map(|c| c.join().unwrap()).sum();
    while let Some(d) = dequeue(&q) {
        seen[d as usize].fetch_add(1, Ordering::SeqCst);
        total += 1;
    }

    assert_eq!(total, PRODUCERS * K, "total dequeue count must equal 80000");
    for (value, count) in seen.iter().enumerate() {
        assert_eq!(
            count.load(Ordering::SeqCst),
            PRODUCERS as u32,
            "value {value} seen {} times, expected {PRODUCERS}",
            count.load(Ordering::SeqCst)
        );
    }
}

#[test]
fn s3_concurrent_exactness_lq() {
    concurrent_exactness(
        || LqQueue::new().unwrap(),
        |q, d| q.enqueue(d),
        |q| q.dequeue(),
    );
}

#[test]
fn s3_concurrent_exactness_rq() {
    concurrent_exactness(
        || RqQueue::new().unwrap(),
        |q, d| q.enqueue(d),
        |q| q.dequeue(),
    );
}

// S4 — multi-queue isolation: two independent queues each get 1..1000 from
// their own producer; draining each must reproduce exactly its own range,
// with no cross-queue leakage.

#[test]
fn s4_multi_queue_isolation_lq() {
    const N: u64 = 1000;
    let q1 = Arc::new(LqQueue::new().unwrap());
    let q2 = Arc::new(LqQueue::new().unwrap());

    let h1 = {
        let q1 = Arc::clone(&q1);
        thread::spawn(move || {
            for i in 1..=N {
                q1.enqueue(i);
            }
        })
    };
    let h2 = {
        let q2 = Arc::clone(&q2);
        thread::spawn(move || {
            for i in 1001..=(1000 + N) {
                q2.enqueue(i);
            }
        })
    };
    h1.join().unwrap();
    h2.join().unwrap();

    let mut sum1 = 0u64;
    let mut count1 = 0u64;
    while let Some(d) = q1.dequeue() {
        assert!((1..=N).contains(&d), "q1 leaked a q2 value: {d}");
        sum1 += d;
        count1 += 1;
    }
    let mut sum2 = 0u64;
    let mut count2 = 0u64;
    while let Some(d) = q2.dequeue() {
        assert!((1001..=(1000 + N)).contains(&d), "q2 leaked a q1 value: {d}");
        sum2 += d;
        count2 += 1;
    }

    assert_eq!(count1, N);
    assert_eq!(count2, N);
    assert_eq!(sum1, (1..=N).sum::<u64>());
    assert_eq!(sum2, (1001..=(1000 + N)).sum::<u64>());
}

// S6 — pool fallback: with a saturated reservation (shrunk via PoolConfig),
// enqueues keep succeeding via the allocator fallback and all items still
// round-trip.

#[test]
fn s6_pool_fallback_round_trips() {
    let q = LqQueue::new().unwrap();
    // A tiny reservation that saturates almost immediately, forcing most
    // enqueues onto the general-allocator fallback path.
    q.create_tls_node_pool_with(TEST_SMALL_POOL_CONFIG);

    const N: u64 = 50;
    for i in 0..N {
        q.enqueue(i);
    }
    let mut drained = Vec::new();
    while let Some(d) = q.dequeue() {
        drained.push(d);
    }
    assert_eq!(drained, (0..N).collect::<Vec<_>>());

    q.destroy_tls_node_pool();
}

#[test]
fn empty_contract_leaves_no_side_effects() {
    let q = LqQueue::new().unwrap();
    assert_eq!(q.dequeue(), None);
    assert_eq!(q.dequeue(), None);
    q.enqueue(1);
    assert_eq!(q.dequeue(), Some(1));
    assert_eq!(q.dequeue(), None);
}
