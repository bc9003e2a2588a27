//! Global scq-id registry (spec.md §5): every live `LqQueue`/`RqQueue`
//! claims one slot out of `MAX_SCQ_NUM`, used as the key into per-thread
//! node-pool and sub-queue tables. `init` claims a slot; `destroy` frees it.

use crate::config::MAX_SCQ_NUM;
use crate::error::MpmcError;
use std::sync::atomic::{AtomicBool, Ordering};

/// `true` once a slot is claimed, `false` once it's freed. Plain atomics over
/// a fixed-size table, no locking: claiming is a single successful
/// compare_exchange, nothing to coordinate beyond that.
static SLOTS: [AtomicBool; MAX_SCQ_NUM] = {
    const FALSE: AtomicBool = AtomicBool::new(false);
    [FALSE; MAX_SCQ_NUM]
};

/// Claims the first free slot and returns its index, or
/// `MpmcError::IdTableFull` if every slot is in use.
pub(crate) fn acquire() -> Result<usize, MpmcError> {
    for (id, slot) in SLOTS.iter().enumerate() {
        if slot
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            return Ok(id);
        }
    }
    Err(MpmcError::IdTableFull { max: MAX_SCQ_NUM })
}

/// Frees a slot previously returned by `acquire`.
///
/// # Panics
/// Panics (debug builds only) if `id` was not currently held; callers only
/// ever pass back an id they hold exclusively via their queue handle.
pub(crate) fn release(id: usize) {
    let was_held = SLOTS[id].swap(false, Ordering::AcqRel);
    debug_assert!(was_held, "registry: releasing scq id {id} that was not held");
}
