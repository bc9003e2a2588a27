//! Thread-local, per-queue huge-page node pool (spec.md §4.2).
//!
//! Opt-in only: a thread calls `create_tls_node_pool` on an `LqQueue` before
//! its first enqueue to bypass the general allocator on the hot path. The
//! pool reserves a virtually contiguous region up front and commits huge
//! pages lazily as they're needed, splitting each into fixed-size node
//! cells that are bump-allocated and recycled in place.

use crate::config::PoolConfig;
use crate::invariants::debug_assert_cell_free;
use crate::node::{Datum, Node, ENQUEUED, FREE};
use std::cell::RefCell;
use std::collections::HashMap;
use std::mem;
use std::sync::atomic::Ordering;

#[cfg(unix)]
use std::ptr;

/// A per-thread slab over a reserved, lazily-committed huge-page region.
pub(crate) struct NodePool {
    config: PoolConfig,
    region: Region,
    node_size: usize,
    node_count_per_huge_page: usize,
    /// Number of huge pages actually committed so far (`phys_huge_page_count`).
    phys_huge_page_count: usize,
    current_huge_page_idx: usize,
    current_node_idx: usize,
}

impl NodePool {
    pub(crate) fn new(config: PoolConfig) -> Self {
        let node_size = mem::size_of::<Node>();
        let node_count_per_huge_page = (config.huge_page_size / node_size).max(1);
        let region = Region::reserve(config.huge_page_size * config.huge_page_count);
        Self {
            config,
            region,
            node_size,
            node_count_per_huge_page,
            phys_huge_page_count: 0,
            current_huge_page_idx: 0,
            current_node_idx: 0,
        }
    }

    fn cell_ptr(&self, page: usize, idx: usize) -> *mut Node {
        let offset = page * self.config.huge_page_size + idx * self.node_size;
        debug_assert!(offset + self.node_size <= self.region.len);
        unsafe { self.region.base.add(offset).cast::<Node>() }
    }

    /// Hands out the next cell for `datum`, or `None` if the reservation is
    /// exhausted (caller should fall back to the general allocator).
    pub(crate) fn allocate(&mut self, datum: Datum) -> Option<*mut Node> {
        // Fast path: space remains on the current page.
        if self.current_node_idx < self.node_count_per_huge_page {
            let cell = self.cell_ptr(self.current_huge_page_idx, self.current_node_idx);
            self.current_node_idx += 1;
            return Some(self.init_cell(cell, datum));
        }

        // Slow path: scan committed pages for one whose last cell has cycled
        // back to FREE (empirical signal the whole page has been recycled).
        for page in 0..self.phys_huge_page_count {
            let last = self.cell_ptr(page, self.node_count_per_huge_page - 1);
            let state = unsafe { (*last).state.load(Ordering::Acquire) };
            if state == FREE {
                debug_assert_cell_free!(state, FREE);
                self.current_huge_page_idx = page;
                let cell = self.cell_ptr(page, 0);
                self.current_node_idx = 1;
                return Some(self.init_cell(cell, datum));
            }
        }

        // Commit the next uncommitted page, if the reservation allows it.
        if self.phys_huge_page_count < self.config.huge_page_count {
            let page = self.phys_huge_page_count;
            self.phys_huge_page_count += 1;
            self.current_huge_page_idx = page;
            let cell = self.cell_ptr(page, 0);
            self.current_node_idx = 1;
            return Some(self.init_cell(cell, datum));
        }

        // Reservation exhausted; caller falls back to the general allocator
        // (spec.md §8 Scenario S6).
        None
    }

    fn init_cell(&self, cell: *mut Node, datum: Datum) -> *mut Node {
        unsafe {
            cell.write(Node::new(datum, ENQUEUED, true));
        }
        cell
    }
}

/// Frees a node, routing pool-owned cells back to their pool (by flipping
/// `state` to FREE) and non-pool cells to the general allocator.
///
/// # Safety
/// `ptr` must be uniquely owned and not reachable from any other thread.
pub(crate) unsafe fn free_node(ptr: *mut Node) {
    let node = unsafe { &*ptr };
    if node.pooled {
        node.state.store(FREE, Ordering::Release);
    } else {
        unsafe { Node::free_general(ptr) };
    }
}

thread_local! {
    static POOLS: RefCell<HashMap<usize, NodePool>> = RefCell::new(HashMap::new());
}

/// Opts the calling thread into a node pool for queue `scq_id`.
pub(crate) fn create(scq_id: usize, config: PoolConfig) {
    POOLS.with(|pools| {
        pools.borrow_mut().entry(scq_id).or_insert_with(|| NodePool::new(config));
    });
}

/// Releases the calling thread's pool for queue `scq_id`, if any.
pub(crate) fn destroy(scq_id: usize) {
    POOLS.with(|pools| {
        pools.borrow_mut().remove(&scq_id);
    });
}

/// Allocates from the calling thread's pool for `scq_id` if one is opted in
/// and has room; otherwise falls back to the general allocator.
pub(crate) fn allocate_or_fallback(scq_id: usize, datum: Datum) -> *mut Node {
    let pooled = POOLS.with(|pools| {
        pools
            .borrow_mut()
            .get_mut(&scq_id)
            .and_then(|pool| pool.allocate(datum))
    });
    pooled.unwrap_or_else(|| Node::alloc_general(datum, ENQUEUED))
}

/// A lazily-committed virtual memory reservation.
///
/// On Unix this is an anonymous `mmap` reservation hinted for transparent
/// huge pages; physical commit happens on first touch via normal demand
/// paging, so no explicit "commit" syscall is issued per page. On other
/// platforms it falls back to a heap allocation (the pool is purely an
/// optimization; correctness never depends on the backing being mmap'd).
struct Region {
    base: *mut u8,
    len: usize,
    #[cfg(not(unix))]
    _storage: Box<[u8]>,
}

impl Region {
    #[cfg(unix)]
    fn reserve(len: usize) -> Self {
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
                -1,
                0,
            )
        };
        assert_ne!(base, libc::MAP_FAILED, "mmap reservation for node pool failed");
        #[cfg(target_os = "linux")]
        unsafe {
            libc::madvise(base, len, libc::MADV_HUGEPAGE);
        }
        Self {
            base: base.cast::<u8>(),
            len,
        }
    }

    #[cfg(not(unix))]
    fn reserve(len: usize) -> Self {
        let mut storage = vec![0u8; len].into_boxed_slice();
        let base = storage.as_mut_ptr();
        Self {
            base,
            len,
            _storage: storage,
        }
    }
}

#[cfg(unix)]
impl Drop for Region {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base.cast(), self.len);
        }
    }
}
