//! The Linearizable Queue engine (spec.md §4.3): a shared singly-linked
//! list with a single atomic tail for enqueue, and an RCU-style head
//! traversal for dequeue backed by the `Vsg` in `vsg.rs`.
//!
//! The head is not a plain pointer: it is a chain of `HeadVersion`s, each
//! describing an epoch of traversal. `adjust_head` installs a new version
//! covering the remaining list whenever a dequeuer claims a node with a
//! successor; the old version is retired into the chain and freed, node
//! range included, once every reader that pinned it has released (see
//! `reclaim` below).

use crate::config::PoolConfig;
use crate::error::MpmcError;
use crate::invariants::{
    debug_assert_claimed_once, debug_assert_tail_not_set, debug_assert_valid_range,
};
use crate::node::{Datum, Node, DEQUEUED, ENQUEUED};
use crate::pool;
use crate::registry;
use crate::vsg::{Reclaim, Vsg};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicPtr, AtomicUsize, Ordering};

/// Top bit of the (pointer-sized) `prev` slot: set once this version's
/// predecessor-release protocol has fired (spec.md §3 "release flag
/// embedded in the prev pointer").
const RELEASE_FLAG: usize = 1 << (usize::BITS - 1);
const PREV_MASK: usize = !RELEASE_FLAG;

/// An epoch of head traversal (spec.md §3 "Head Version").
struct HeadVersion {
    head_node: *mut Node,
    /// Null while this version is current; set once to the last node of
    /// the range it covers when it is superseded (`adjust_head`).
    tail_node: AtomicPtr<Node>,
    /// Low bits: previous version pointer. Top bit: release flag.
    prev: AtomicUsize,
    next: AtomicPtr<HeadVersion>,
    refs: AtomicI64,
}

impl HeadVersion {
    fn new(head_node: *mut Node, prev: *mut HeadVersion) -> Self {
        Self {
            head_node,
            tail_node: AtomicPtr::new(ptr::null_mut()),
            prev: AtomicUsize::new(prev as usize),
            next: AtomicPtr::new(ptr::null_mut()),
            refs: AtomicI64::new(0),
        }
    }
}

impl Reclaim for HeadVersion {
    fn refs(&self) -> &AtomicI64 {
        &self.refs
    }

    /// spec.md §4.3 "Reclamation (scq_head_version_free)": the one-time
    /// entry gate for `this`. Sets the release flag in `this`'s own
    /// `prev` field; if a predecessor pointer is still recorded there,
    /// the predecessor hasn't cleared it yet, so `this` is not at the
    /// chain tail and the predecessor will drain it transitively when it
    /// gets there. Otherwise `this` drains the chain starting at itself.
    fn finalize(this: Box<Self>) {
        let ptr = Box::into_raw(this);
        let version = unsafe { &*ptr };
        let prior = version.prev.fetch_or(RELEASE_FLAG, Ordering::AcqRel);
        if (prior & PREV_MASK) != 0 {
            return;
        }
        drain_chain(ptr);
    }
}

/// Frees versions (and their covered node ranges) starting at `current`,
/// walking forward through `next` pointers. Called either by a version's
/// own `finalize` once it has confirmed (via the entry gate above) that
/// its predecessor has already been cleared, or by a predecessor handing
/// off a successor it discovered was already self-retired and waiting —
/// in the latter case the successor's own gate has already run (and
/// returned early), so this function must not repeat it: it goes
/// straight to freeing.
fn drain_chain(mut current: *mut HeadVersion) {
    loop {
        let version = unsafe { &*current };
        let tail = version.tail_node.load(Ordering::Acquire);
        if !tail.is_null() {
            debug_assert_valid_range!(version.head_node, tail);
            unsafe { free_node_range(version.head_node, tail) };
        } else {
            // This was the current (never-superseded) version; only its
            // own head node belongs to it, and list nodes are never
            // freed out from under a live tail (spec.md §4.3 "Correctness
            // on empty transitions").
        }

        let next = version.next.load(Ordering::Acquire);
        unsafe { drop(Box::from_raw(current)) };

        if next.is_null() {
            return;
        }

        // Hand the drain forward: try to clear the successor's `prev`
        // pointer back to null. Success means the successor hasn't
        // self-retired yet (its own future `finalize` will see the
        // cleared pointer and drain itself from there); failure with the
        // release flag set means the successor already ran its own gate
        // and bailed out waiting on us, so we take over and continue
        // directly into it without repeating its gate check.
        let next_version = unsafe { &*next };
        let expected = current as usize;
        match next_version
            .prev
            .compare_exchange(expected, 0, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => return,
            Err(prior_next) => {
                if prior_next & RELEASE_FLAG != 0 {
                    current = next;
                } else {
                    return;
                }
            }
        }
    }
}

/// Frees every node from `head` through `tail` inclusive, walking `next`
/// in insertion order (spec.md §4.3 "The drain walks nodes in insertion
/// order and calls the node freer once per node").
///
/// # Safety
/// The range `[head, tail]` must be a valid, fully-linked chain that no
/// live version or in-flight traversal still covers.
unsafe fn free_node_range(head: *mut Node, tail: *mut Node) {
    let mut node = head;
    loop {
        let next = unsafe { (*node).next.load(Ordering::Acquire) };
        let done = node == tail;
        unsafe { pool::free_node(node) };
        if done {
            return;
        }
        debug_assert!(!next.is_null(), "lq: node range ended before reaching tail_node");
        node = next;
    }
}

/// A Linearizable Queue handle (spec.md §4.3): strict global FIFO.
pub struct LqQueue {
    scq_id: usize,
    tail: AtomicPtr<Node>,
    head: Vsg<HeadVersion>,
    head_init: AtomicBool,
}

impl LqQueue {
    /// Creates a new linearizable queue, claiming a global scq-id slot.
    ///
    /// # Errors
    /// Returns [`MpmcError::IdTableFull`] if `MAX_SCQ_NUM` queues are
    /// already live.
    pub fn new() -> Result<Self, MpmcError> {
        let scq_id = registry::acquire()?;
        Ok(Self {
            scq_id,
            tail: AtomicPtr::new(ptr::null_mut()),
            head: Vsg::new(),
            head_init: AtomicBool::new(false),
        })
    }

    /// Opts the calling thread into a huge-page node pool for this queue's
    /// enqueue fast path (spec.md §4.2, §6 `create_tls_node_pool`).
    pub fn create_tls_node_pool(&self) {
        pool::create(self.scq_id, PoolConfig::default());
    }

    /// Opts the calling thread into a node pool with a custom
    /// configuration (used by tests to exercise the allocator-fallback
    /// path, spec.md §8 Scenario S6).
    pub fn create_tls_node_pool_with(&self, config: PoolConfig) {
        pool::create(self.scq_id, config);
    }

    /// Releases the calling thread's node pool for this queue, if any.
    pub fn destroy_tls_node_pool(&self) {
        pool::destroy(self.scq_id);
    }

    /// Appends `datum` to the queue (spec.md §4.3 "Enqueue"). Exactly one
    /// atomic read-modify-write (the tail exchange) per call.
    pub fn enqueue(&self, datum: Datum) {
        let node = pool::allocate_or_fallback(self.scq_id, datum);
        let prev_tail = self.tail.swap(node, Ordering::AcqRel);

        if prev_tail.is_null() {
            // Queue was empty since init: this node becomes the first
            // head version's sole member.
            let version = Box::new(HeadVersion::new(node, ptr::null_mut()));
            self.head.publish(version);
            self.head_init.store(true, Ordering::Release);
        } else {
            // Release-store paired with the consumer's acquire-load of
            // `next` during traversal (spec.md §5 memory ordering
            // requirements; resolves §9 Open Question 1 in the stricter
            // direction).
            unsafe { (*prev_tail).next.store(node, Ordering::Release) };
        }
    }

    /// Attempts to dequeue the oldest unclaimed item (spec.md §4.3
    /// "Dequeue"). Non-blocking: returns `None` immediately if the queue
    /// has never been enqueued to, or every enqueued node has already
    /// been claimed.
    pub fn dequeue(&self) -> Option<Datum> {
        if !self.head_init.load(Ordering::Acquire) {
            return None;
        }

        'retry: loop {
            let guard = match self.head.acquire() {
                Some(g) => g,
                None => return None,
            };
            let version_ptr = guard.as_ptr() as *mut HeadVersion;

            let mut candidate = guard.head_node;
            let found = loop {
                if candidate.is_null() {
                    break None;
                }
                if !guard.tail_node.load(Ordering::Acquire).is_null() {
                    // Superseded mid-walk; restart against the new
                    // current version.
                    self.head.release(guard);
                    continue 'retry;
                }
                let state = unsafe { (*candidate).state.load(Ordering::Acquire) };
                if state == ENQUEUED {
                    let prev = unsafe {
                        (*candidate)
                            .state
                            .compare_exchange(ENQUEUED, DEQUEUED, Ordering::AcqRel, Ordering::Acquire)
                    };
                    if let Ok(prior) = prev {
                        debug_assert_claimed_once!(prior, ENQUEUED);
                        break Some(candidate);
                    }
                }
                candidate = unsafe { (*candidate).next.load(Ordering::Acquire) };
            };

            let Some(claimed) = found else {
                self.head.release(guard);
                return None;
            };

            let datum = unsafe { (*claimed).datum };
            let successor = unsafe { (*claimed).next.load(Ordering::Acquire) };
            if !successor.is_null() {
                self.adjust_head(version_ptr, successor, claimed);
            }
            self.head.release(guard);
            return Some(datum);
        }
    }

    /// spec.md §4.3 "adjust_head": attempts to advance the published head
    /// past the node range `[prev_head, last_of_prev_range]`. A losing
    /// `compare_publish` means a concurrent dequeuer already advanced the
    /// head past this point; the new version is simply dropped.
    fn adjust_head(&self, prev: *mut HeadVersion, new_head: *mut Node, last_of_prev_range: *mut Node) {
        let next_version = Box::new(HeadVersion::new(new_head, prev));
        match self.head.compare_publish(prev, next_version) {
            None => {
                // Lost the race; another thread already advanced the head.
            }
            Some(next_ptr) => {
                // Publish the chain linkage only after winning: `next`
                // first, then `tail_node` — only after both stores is
                // `prev` observable as retired-and-linked (spec.md §4.3).
                let prev_version = unsafe { &*prev };
                prev_version.next.store(next_ptr, Ordering::Release);
                debug_assert_tail_not_set!(prev_version.tail_node.load(Ordering::Relaxed));
                prev_version
                    .tail_node
                    .store(last_of_prev_range, Ordering::Release);
            }
        }
    }

    /// Tears down the queue (spec.md §4.5 "Destroy"): releases the scq-id
    /// slot. The caller must ensure no thread still holds an in-flight
    /// `dequeue` guard (spec.md §6 "Caller must ensure no in-flight ops";
    /// §9 Open Question 4) — dropping the queue does not itself drain
    /// the VSG's currently-published version, since that version's
    /// reader count may still be nonzero in a misused program. A
    /// correctly-quiesced caller sees the last `Drop` of the published
    /// version free every remaining node, including the still-open tail.
    pub fn destroy(self) {
        // `Drop` does the actual work; this is a documented, explicit
        // consume-the-handle entry point matching spec.md §6's table.
    }
}

impl Drop for LqQueue {
    fn drop(&mut self) {
        registry::release(self.scq_id);
        // The head Vsg's own Drop (implicit, field order) would need to
        // walk and finalize its currently-published version to avoid
        // leaking the rest of the list; Vsg does not implement Drop today
        // (spec.md's `destroy` contract presumes external quiescence, so
        // there is always at least one reachable version here). We run
        // one last synchronous finalize of whatever is still published so
        // a well-behaved caller (no outstanding dequeue guards) leaves no
        // node leaked.
        if let Some(guard) = self.head.acquire() {
            let ptr = guard.as_ptr() as *mut HeadVersion;
            self.head.release(guard);
            // Only safe because the caller promised no concurrent ops;
            // under that promise this is the sole remaining reference.
            let boxed = unsafe { Box::from_raw(ptr) };
            drain_to_tail(&boxed, self.tail.load(Ordering::Acquire));
            // `boxed` drops here, freeing the version struct itself; the
            // node range it covered was already freed by `drain_to_tail`.
        }
    }
}

/// Frees the still-open tail range of the final, never-superseded
/// version at `destroy` time: from `version.head_node` through whatever
/// the queue's `tail` pointer currently names (its own `tail_node` is
/// nil because it was never superseded).
fn drain_to_tail(version: &HeadVersion, tail: *mut Node) {
    if version.head_node.is_null() {
        return;
    }
    if tail.is_null() {
        return;
    }
    unsafe { free_node_range(version.head_node, tail) };
}
