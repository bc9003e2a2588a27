//! The Relaxed Queue engine (spec.md §4.4): per-producer sub-queues
//! harvested in bulk by consumers via a round-robin steal. Not globally
//! linearizable, but removes the single shared tail as a point of
//! contention — each producer only ever contends with consumers stealing
//! its own sub-queue, never with other producers.

use crate::backoff::Backoff;
use crate::config::MAX_THREAD_NUM;
use crate::error::MpmcError;
use crate::node::{Datum, Node};
use crate::registry;
use std::collections::HashMap;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

/// One producer's private append-only list, plus the bookkeeping a
/// consumer needs to steal it (spec.md §3 "RQ Queue").
///
/// `drained_head`/`drained_tail`/`last_dequeued_thread_idx` model spec.md
/// §3's "drained_list (local head/tail pair for the current owner's
/// unpublished batch)" and "last_dequeued_thread_idx (round-robin
/// cursor)" — both are attributes of the registered per-thread entry
/// itself, not of separate thread-local state, precisely so `destroy`
/// can reach and free a consumer's still-unpopped batch centrally.
/// They are touched only by the one thread registered at this table
/// slot (never stolen or mutated cross-thread), so plain atomics with
/// no contention are enough; no `Mutex` is needed for them.
struct SubQueue {
    sentinel: Node,
    tail: AtomicPtr<Node>,
    drained_head: AtomicPtr<Node>,
    drained_tail: AtomicPtr<Node>,
    last_dequeued_thread_idx: AtomicUsize,
}

impl SubQueue {
    fn new() -> Box<Self> {
        let mut sq = Box::new(Self {
            sentinel: Node::new(0, crate::node::FREE, false),
            tail: AtomicPtr::new(ptr::null_mut()),
            drained_head: AtomicPtr::new(ptr::null_mut()),
            drained_tail: AtomicPtr::new(ptr::null_mut()),
            last_dequeued_thread_idx: AtomicUsize::new(0),
        });
        let sentinel_ptr: *mut Node = &mut sq.sentinel;
        sq.tail = AtomicPtr::new(sentinel_ptr);
        sq
    }

    fn sentinel_ptr(&self) -> *mut Node {
        &self.sentinel as *const Node as *mut Node
    }
}

thread_local! {
    /// Caches the calling thread's own `sub_queues` slot index per queue,
    /// keyed by `scq_id`, so repeated calls skip re-registration. All
    /// other per-thread state lives in the `SubQueue` at that index (see
    /// above), not here.
    static TLS: std::cell::RefCell<HashMap<usize, usize>> =
        std::cell::RefCell::new(HashMap::new());
}

/// A Relaxed Queue handle (spec.md §4.4): per-producer FIFO, no global
/// ordering guarantee across producers.
pub struct RqQueue {
    scq_id: usize,
    /// `tls_data_ptr_list` (spec.md §4.4): owning pointers to every
    /// registered sub-queue, indexed by thread slot.
    sub_queues: RwLock<Vec<Option<Box<SubQueue>>>>,
    /// Guards table insertion only (spec.md §3 "a spin lock guarding
    /// sub-queue registration"); reads of already-registered entries use
    /// the `RwLock` read side above instead of this lock.
    register_lock: Mutex<()>,
    thread_num: AtomicUsize,
}

impl RqQueue {
    /// Creates a new relaxed queue, claiming a global scq-id slot.
    ///
    /// # Errors
    /// Returns [`MpmcError::IdTableFull`] if `MAX_SCQ_NUM` queues are
    /// already live.
    pub fn new() -> Result<Self, MpmcError> {
        let scq_id = registry::acquire()?;
        Ok(Self {
            scq_id,
            sub_queues: RwLock::new(Vec::new()),
            register_lock: Mutex::new(()),
            thread_num: AtomicUsize::new(0),
        })
    }

    /// Ensures the calling thread has a registered sub-queue for this
    /// queue, allocating one on first use (spec.md §4.4
    /// "Per-producer registration").
    fn check_and_init_tls(&self) -> usize {
        TLS.with(|tls| {
            if let Some(&thread_idx) = tls.borrow().get(&self.scq_id) {
                return thread_idx;
            }

            let thread_idx = {
                let _guard = self.register_lock.lock().unwrap();
                let mut sub_queues = self.sub_queues.write().unwrap();
                assert!(
                    sub_queues.len() < MAX_THREAD_NUM,
                    "rq: MAX_THREAD_NUM sub-queues already registered"
                );
                sub_queues.push(Some(SubQueue::new()));
                self.thread_num.fetch_add(1, Ordering::AcqRel);
                sub_queues.len() - 1
            };

            tls.borrow_mut().insert(self.scq_id, thread_idx);
            thread_idx
        })
    }

    /// Appends `datum` to the calling thread's sub-queue (spec.md §4.4
    /// "Enqueue"). Exactly one atomic read-modify-write per call.
    pub fn enqueue(&self, datum: Datum) {
        let thread_idx = self.check_and_init_tls();
        let node = Node::alloc_general(datum, crate::node::FREE);

        let sub_queues = self.sub_queues.read().unwrap();
        let sub_queue = sub_queues[thread_idx].as_ref().unwrap();
        let prev_tail = sub_queue.tail.swap(node, Ordering::AcqRel);
        // The sentinel guarantees `prev_tail` is never null.
        unsafe { (*prev_tail).next.store(node, Ordering::Release) };
    }

    /// Attempts to dequeue one item (spec.md §4.4 "Dequeue"):
    /// non-blocking, first drains the calling thread's own already-stolen
    /// batch, then steals a whole sub-queue round-robin if that batch is
    /// empty.
    pub fn dequeue(&self) -> Option<Datum> {
        let thread_idx = self.check_and_init_tls();

        let sub_queues = self.sub_queues.read().unwrap();
        let own = sub_queues[thread_idx].as_ref().unwrap();

        if !own.drained_head.load(Ordering::Acquire).is_null() {
            return Some(self.pop_drained(own));
        }

        let thread_num = sub_queues.len();
        if thread_num == 0 {
            return None;
        }

        let start = own.last_dequeued_thread_idx.load(Ordering::Relaxed);
        for step in 0..thread_num {
            let idx = (start + step) % thread_num;
            let sub_queue = match sub_queues[idx].as_ref() {
                Some(sq) => sq,
                None => continue,
            };

            if sub_queue.sentinel.next.load(Ordering::Acquire).is_null() {
                continue;
            }

            let detached_head = sub_queue
                .sentinel
                .next
                .swap(ptr::null_mut(), Ordering::AcqRel);
            if detached_head.is_null() {
                continue;
            }

            let detached_tail = sub_queue
                .tail
                .swap(sub_queue.sentinel_ptr(), Ordering::AcqRel);

            own.drained_head.store(detached_head, Ordering::Release);
            own.drained_tail.store(detached_tail, Ordering::Release);
            own.last_dequeued_thread_idx.store(idx, Ordering::Relaxed);

            return Some(self.pop_drained(own));
        }

        None
    }

    /// Pops exactly one node off `sub_queue`'s drained batch (spec.md
    /// §4.4's inner "To pop" sub-protocol), freeing it and returning its
    /// datum.
    fn pop_drained(&self, sub_queue: &SubQueue) -> Datum {
        let node = sub_queue.drained_head.load(Ordering::Acquire);
        debug_assert!(!node.is_null());
        let datum = unsafe { (*node).datum };

        if node == sub_queue.drained_tail.load(Ordering::Acquire) {
            sub_queue.drained_head.store(ptr::null_mut(), Ordering::Release);
            sub_queue.drained_tail.store(ptr::null_mut(), Ordering::Release);
        } else {
            let mut next = unsafe { (*node).next.load(Ordering::Acquire) };
            if next.is_null() {
                // The producer's successor store raced us across the
                // detach point; busy-wait until it becomes visible
                // (spec.md §4.4 "Why two atomics per dequeue batch").
                let mut backoff = Backoff::new();
                loop {
                    next = unsafe { (*node).next.load(Ordering::Acquire) };
                    if !next.is_null() {
                        break;
                    }
                    backoff.snooze();
                }
            }
            sub_queue.drained_head.store(next, Ordering::Release);
        }

        unsafe { Node::free_general(node) };
        datum
    }

    /// Tears down the queue (spec.md §4.5 "Destroy"): releases the
    /// scq-id slot and frees every registered sub-queue's remaining
    /// nodes — both the shared list and any unpopped drained batch
    /// (spec.md §4.5 "free every registered sub-queue's remaining nodes
    /// (shared and drained lists) and the sub-queue itself"), matching
    /// spec.md §6 "Caller must ensure no in-flight ops".
    pub fn destroy(self) {
        // `Drop` does the work; this is the documented, explicit
        // consume-the-handle entry point matching spec.md §6's table.
    }
}

impl Drop for RqQueue {
    fn drop(&mut self) {
        registry::release(self.scq_id);
        let mut sub_queues = self.sub_queues.write().unwrap();
        for slot in sub_queues.iter_mut() {
            let Some(sub_queue) = slot.take() else {
                continue;
            };

            let mut node = sub_queue.sentinel.next.load(Ordering::Acquire);
            while !node.is_null() {
                let next = unsafe { (*node).next.load(Ordering::Acquire) };
                unsafe { Node::free_general(node) };
                node = next;
            }

            // The thread registered at this slot may have stolen a batch
            // into its own `drained_head`/`drained_tail` and not yet
            // popped all of it; that range is disjoint from the shared
            // list above (it was already detached from `sentinel.next`)
            // and must be freed here too, or it leaks.
            let mut node = sub_queue.drained_head.load(Ordering::Acquire);
            while !node.is_null() {
                let next = unsafe { (*node).next.load(Ordering::Acquire) };
                unsafe { Node::free_general(node) };
                node = next;
            }
            // `sub_queue` (and its sentinel) drops here.
        }
    }
}
