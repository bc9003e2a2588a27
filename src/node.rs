use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU8, Ordering};

/// A 64-bit opaque payload: a scalar or a pointer cast to `u64` (spec.md §1).
pub type Datum = u64;

/// Node has not yet been enqueued, or has been reclaimed and is sitting in a
/// pool waiting to be recycled.
pub const FREE: u8 = 0;
/// Node is linked into a queue and visible to consumers.
pub const ENQUEUED: u8 = 1;
/// Node has been claimed by exactly one consumer and is awaiting reclamation.
pub const DEQUEUED: u8 = 2;

/// A singly-linked list cell shared by both engines.
///
/// `state` is meaningful for LQ only (RQ nodes are freed directly on pop, see
/// spec.md §3); RQ still stores it so a pool-backed cell can be recycled
/// uniformly by `pool::NodePool`.
#[repr(C)]
pub struct Node {
    pub(crate) next: AtomicPtr<Node>,
    pub(crate) datum: Datum,
    pub(crate) state: AtomicU8,
    /// Whether this cell came from a `NodePool` (vs. the general allocator).
    /// Only meaningful to the owning thread's pool on free; never touched
    /// concurrently by another thread.
    pub(crate) pooled: bool,
}

impl Node {
    pub(crate) fn new(datum: Datum, state: u8, pooled: bool) -> Self {
        Self {
            next: AtomicPtr::new(ptr::null_mut()),
            datum,
            state: AtomicU8::new(state),
            pooled,
        }
    }

    /// Allocates a node on the general allocator.
    pub(crate) fn alloc_general(datum: Datum, state: u8) -> *mut Node {
        Box::into_raw(Box::new(Node::new(datum, state, false)))
    }

    /// Frees a node previously allocated via `alloc_general` or recycled by a
    /// pool that chose to hand it back to the allocator.
    ///
    /// # Safety
    /// `ptr` must be a live, uniquely-owned node pointer not reachable from
    /// any other thread.
    pub(crate) unsafe fn free_general(ptr: *mut Node) {
        drop(Box::from_raw(ptr));
    }
}
