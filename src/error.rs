use thiserror::Error;

/// Error taxonomy for `mpmc64` (spec.md §7).
///
/// Empty-queue is *not* an error — `dequeue` reports it as `None`. Programming
/// errors (double-destroy, use-after-destroy) are made unrepresentable by the
/// API (`destroy` consumes the handle) rather than surfaced here. Allocator
/// failure (spec.md §7 OOM) has no variant here: Rust's global allocator
/// aborts the process on allocation failure before any `Result` could be
/// constructed, so this crate takes spec.md §7's "may abort" option rather
/// than fabricate an error path nothing can ever return (see SPEC_FULL.md
/// §B.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MpmcError {
    /// The global scq-id registry has no free slots (`MAX_SCQ_NUM` queues
    /// are already live).
    #[error("queue id table is full (max: {max})")]
    IdTableFull {
        /// The configured maximum number of concurrently live queues.
        max: usize,
    },
}
