//! mpmc64 - Lock-free MPMC queues for 64-bit opaque data.
//!
//! Two coexisting queue variants share the same external contract
//! (enqueue/dequeue a `u64` scalar or pointer-sized payload):
//!
//! - [`LqQueue`] — the Linearizable Queue: a strict global-FIFO, lock-free
//!   singly-linked list with an RCU-reclaimed head, for callers that need a
//!   total order across producers.
//! - [`RqQueue`] — the Relaxed Queue: per-producer sub-queues harvested in
//!   whole batches by consumers, trading global ordering for the removal of
//!   single-point tail contention.
//!
//! Both are in-process only: no bounded capacity, no backpressure, no
//! blocking wait, no priority, no persistence, no cross-process sharing.
//! `dequeue` never blocks — an empty queue is reported immediately.
//!
//! # Example
//!
//! ```
//! use mpmc64::LqQueue;
//!
//! let q = LqQueue::new().unwrap();
//! q.enqueue(10);
//! q.enqueue(20);
//! assert_eq!(q.dequeue(), Some(10));
//! assert_eq!(q.dequeue(), Some(20));
//! assert_eq!(q.dequeue(), None);
//! ```
//!
//! ```
//! use mpmc64::RqQueue;
//!
//! let q = RqQueue::new().unwrap();
//! q.enqueue(1);
//! q.enqueue(2);
//! q.enqueue(3);
//! let mut drained = vec![];
//! while let Some(d) = q.dequeue() {
//!     drained.push(d);
//! }
//! assert_eq!(drained, vec![1, 2, 3]); // single producer: per-producer FIFO
//! ```

mod backoff;
mod config;
mod error;
mod invariants;
mod lq;
mod node;
mod pool;
mod registry;
mod rq;
mod vsg;

pub use backoff::Backoff;
pub use config::{
    PoolConfig, HUGE_PAGE_COUNT, HUGE_PAGE_SIZE, MAX_SCQ_NUM, MAX_THREAD_NUM,
    TEST_SMALL_POOL_CONFIG,
};
pub use error::MpmcError;
pub use lq::LqQueue;
pub use node::Datum;
pub use rq::RqQueue;
