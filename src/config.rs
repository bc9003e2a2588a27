/// Maximum number of queues (LQ or RQ) that may be live at once.
///
/// Indexes the global ID registry (spec.md §3 "Global ID registry").
pub const MAX_SCQ_NUM: usize = 1024;

/// Maximum number of distinct producer threads an RQ sub-queue table can hold.
pub const MAX_THREAD_NUM: usize = 1024;

/// Default huge-page size backing the optional node pool (spec.md §4.2).
pub const HUGE_PAGE_SIZE: usize = 2 * 1024 * 1024;

/// Default number of huge pages reserved by the optional node pool.
pub const HUGE_PAGE_COUNT: usize = 512;

/// Tunable knobs for the thread-local node pool.
///
/// Split out from the compile-time constants above so tests can shrink the
/// reservation and exercise the allocator-fallback path (spec.md §8
/// Scenario S6) without touching process-wide defaults.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Size in bytes of each huge page in the reservation.
    pub huge_page_size: usize,
    /// Number of huge pages reserved (lazily committed).
    pub huge_page_count: usize,
}

impl PoolConfig {
    /// Creates a custom pool configuration.
    ///
    /// # Panics
    ///
    /// Panics if `huge_page_size` is zero, or `huge_page_count` is zero.
    pub const fn new(huge_page_size: usize, huge_page_count: usize) -> Self {
        assert!(huge_page_size > 0, "huge_page_size must be nonzero");
        assert!(huge_page_count > 0, "huge_page_count must be nonzero");
        Self {
            huge_page_size,
            huge_page_count,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            huge_page_size: HUGE_PAGE_SIZE,
            huge_page_count: HUGE_PAGE_COUNT,
        }
    }
}

/// Shrunk pool config used by tests to force the allocator-fallback path
/// (spec.md §8 Scenario S6): two pages just large enough for a couple of
/// node cells each, saturating almost immediately instead of allocating a
/// full reservation.
pub const TEST_SMALL_POOL_CONFIG: PoolConfig = PoolConfig::new(64, 2);
