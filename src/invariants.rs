//! Debug assertion macros for the invariants documented in `spec.md`.
//!
//! These macros are only active in debug builds (`#[cfg(debug_assertions)]`),
//! so there is zero overhead in release builds. Used by `vsg`, `lq`, and `rq`.

// =============================================================================
// INV-NODE-01: Exactly-once state transition
// =============================================================================

/// Assert that a node's state transition was the expected one.
///
/// **Invariant**: once a node transitions ENQUEUED -> DEQUEUED via a
/// successful atomic exchange, exactly one consumer observed `datum`.
///
/// Used in: `lq::dequeue` after a winning `compare_exchange` on `state`.
macro_rules! debug_assert_claimed_once {
    ($prev:expr, $expected:expr) => {
        debug_assert_eq!(
            $prev, $expected,
            "INV-NODE-01 violated: node claimed from unexpected state {}",
            $prev
        )
    };
}

// =============================================================================
// INV-VSG-01: Single current version
// =============================================================================

/// Assert that at most one version is current at a time.
///
/// **Invariant**: the gate's published pointer never duplicates a version as
/// "current" while a second compare_publish also believes it is current.
///
/// Used in: `vsg::Vsg::compare_publish` after a winning CAS.
macro_rules! debug_assert_single_current {
    ($ptr:expr) => {
        debug_assert!(!$ptr.is_null(), "INV-VSG-01 violated: published a null version")
    };
}

// =============================================================================
// INV-LQ-01: tail_node set exactly once
// =============================================================================

/// Assert that a retired version's `tail_node` has not already been set.
///
/// **Invariant**: `tail_node` of a retired version is set exactly once and
/// before the release flag is observable (spec.md §4.3 "Invariants to
/// honour").
///
/// Used in: `lq::adjust_head` immediately before storing `tail_node`.
macro_rules! debug_assert_tail_not_set {
    ($tail_node:expr) => {
        debug_assert!(
            $tail_node.is_null(),
            "INV-LQ-01 violated: tail_node set more than once"
        )
    };
}

// =============================================================================
// INV-LQ-02: reclamation frees each node once
// =============================================================================

/// Assert that a node range handed to the reclaimer is well-formed
/// (head reachable from itself through `next` to tail, in a bounded walk
/// that the caller has already performed). This macro only checks the
/// trivial non-null precondition; the walk itself is the reclaimer's job.
///
/// Used in: `lq::free_node_range` entry.
macro_rules! debug_assert_valid_range {
    ($head:expr, $tail:expr) => {
        debug_assert!(
            !$head.is_null() && !$tail.is_null(),
            "INV-LQ-02 violated: reclaiming a null node range"
        )
    };
}

// =============================================================================
// INV-POOL-01: pool cells only recycled from FREE state
// =============================================================================

/// Assert that a cell being bump-allocated or recycled was actually FREE.
///
/// Used in: `pool::NodePool::allocate`.
macro_rules! debug_assert_cell_free {
    ($state:expr, $free:expr) => {
        debug_assert_eq!(
            $state, $free,
            "INV-POOL-01 violated: recycling a non-FREE pool cell (state {})",
            $state
        )
    };
}

pub(crate) use debug_assert_cell_free;
pub(crate) use debug_assert_claimed_once;
pub(crate) use debug_assert_single_current;
pub(crate) use debug_assert_tail_not_set;
pub(crate) use debug_assert_valid_range;
