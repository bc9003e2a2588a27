//! The Versioned-Snapshot Gate (spec.md §4.1): a grace-period reclamation
//! primitive. It publishes a single *current* version and lets any number of
//! readers pin it; a retired version's finalizer runs exactly once, after
//! every reader that acquired it has released.
//!
//! # Design
//!
//! Per spec.md §9, the gate combines a pointer and a reader count into a
//! single machine word so that acquiring and publishing can race without
//! tearing. While a version is *current*, its pin count lives in the gate's
//! own packed word (`packed: AtomicU64`); `acquire`/`release` CAS that word
//! directly, so a retiring `compare_publish`/`publish` can never lose or
//! double-count a straggling acquirer — any acquire racing the retirement
//! either wins its CAS before the retirement's CAS (and its pin is captured
//! in the word the retiring thread reads) or loses (and retries against the
//! *new* current version, never touching the old one).
//!
//! The moment a version is retired, whatever count had accumulated in the
//! packed word is "folded" into the version's own `refs` counter (a plain
//! `AtomicI64` living on the version itself) — from then on, `release` calls
//! for guards acquired before retirement decrement `refs` directly instead of
//! the gate's word. The finalizer runs the instant `refs` reaches zero.
//!
//! This crate packs a 43-bit pointer and a 21-bit count into one `u64`
//! (`PTR_BITS`/`COUNT_BITS` below), comfortably over the "at least 2^20
//! concurrent acquires" requirement in spec.md §4.1, relying on heap
//! allocations staying under the 2^43 (8 TiB) address ceiling that holds on
//! every platform this crate targets.

use crate::invariants::debug_assert_single_current;
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

const COUNT_BITS: u32 = 21;
const PTR_BITS: u32 = 64 - COUNT_BITS;
const PTR_MASK: u64 = (1u64 << PTR_BITS) - 1;
const MAX_COUNT: u64 = (1u64 << COUNT_BITS) - 1;

#[inline]
fn pack(ptr: *mut (), count: u64) -> u64 {
    let addr = ptr as u64;
    debug_assert_eq!(addr & !PTR_MASK, 0, "vsg: pointer exceeds the {PTR_BITS}-bit packing range");
    debug_assert!(count <= MAX_COUNT, "vsg: reader count overflowed the packed word");
    (count << PTR_BITS) | (addr & PTR_MASK)
}

#[inline]
fn unpack_ptr<V>(word: u64) -> *mut V {
    (word & PTR_MASK) as *mut V
}

#[inline]
fn unpack_count(word: u64) -> u64 {
    word >> PTR_BITS
}

/// A version object managed by a `Vsg`. Implementors hold their own reader
/// refcount and retired flag (folded in by the gate at retirement) and know
/// how to free themselves once that count reaches zero.
pub(crate) trait Reclaim: Sized {
    /// Reader pins folded in at retirement; decremented by `release` for
    /// guards acquired before the version was retired.
    fn refs(&self) -> &AtomicI64;
    /// Called exactly once, when `refs` reaches zero after retirement, to
    /// finalize (and typically free) the version.
    fn finalize(this: Box<Self>);
}

/// A pin on a version, obtained from `Vsg::acquire`. The version is safe to
/// dereference for as long as the guard is held; pass it to `Vsg::release`
/// when done.
pub(crate) struct Guard<V> {
    ptr: *const V,
}

impl<V> Deref for Guard<V> {
    type Target = V;
    fn deref(&self) -> &V {
        // Safety: the gate guarantees the version outlives any guard that
        // points at it (see module docs).
        unsafe { &*self.ptr }
    }
}

impl<V> Guard<V> {
    /// The pinned version's address, e.g. to pass as `expected` to
    /// `Vsg::compare_publish`.
    pub(crate) fn as_ptr(&self) -> *const V {
        self.ptr
    }
}

/// The gate itself: publishes a single current version of `V`.
pub(crate) struct Vsg<V> {
    packed: AtomicU64,
    _marker: PhantomData<V>,
}

impl<V: Reclaim> Vsg<V> {
    /// Creates a gate with no published version yet (`acquire` returns
    /// `None` until the first `publish`).
    pub(crate) const fn new() -> Self {
        Self {
            packed: AtomicU64::new(0),
            _marker: PhantomData,
        }
    }

    /// Pins and returns the current version, or `None` if nothing has been
    /// published yet.
    pub(crate) fn acquire(&self) -> Option<Guard<V>> {
        loop {
            let word = self.packed.load(Ordering::Acquire);
            let ptr: *mut V = unpack_ptr(word);
            if ptr.is_null() {
                return None;
            }
            let count = unpack_count(word);
            let new_word = pack(ptr.cast(), count + 1);
            if self
                .packed
                .compare_exchange_weak(word, new_word, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(Guard { ptr });
            }
        }
    }

    /// Drops a pin obtained from `acquire`.
    pub(crate) fn release(&self, guard: Guard<V>) {
        let ptr = guard.ptr as *mut V;
        std::mem::forget(guard);
        loop {
            let word = self.packed.load(Ordering::Acquire);
            let cur: *mut V = unpack_ptr(word);
            if cur == ptr {
                let count = unpack_count(word);
                debug_assert!(count > 0, "vsg: releasing a pin the gate never granted");
                let new_word = pack(ptr.cast(), count - 1);
                if self
                    .packed
                    .compare_exchange_weak(word, new_word, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    return;
                }
                // Lost the race (another acquire/release, or a concurrent
                // retirement); reload and retry.
            } else {
                // Retired out from under us: our pin was folded into the
                // version's own refcount at retirement time. Decrement that
                // instead.
                let version = unsafe { &*ptr };
                let prev = version.refs().fetch_sub(1, Ordering::AcqRel);
                if prev == 1 {
                    finalize(ptr);
                }
                return;
            }
        }
    }

    /// Unconditionally publishes `new`, retiring whatever was current.
    pub(crate) fn publish(&self, new: Box<V>) {
        let new_ptr = Box::into_raw(new);
        let word = self.packed.swap(pack(new_ptr.cast(), 0), Ordering::AcqRel);
        self.retire(unpack_ptr(word), unpack_count(word));
    }

    /// Publishes `new` only if the current version is exactly `expected`.
    /// On success returns the now-published raw pointer (the version is
    /// owned by the gate from here on, but remains valid for the caller to
    /// read through until it retires and the last reader releases it — see
    /// module docs). On failure `new` is dropped and `None` is returned.
    pub(crate) fn compare_publish(&self, expected: *const V, new: Box<V>) -> Option<*mut V> {
        let new_ptr = Box::into_raw(new);
        loop {
            let word = self.packed.load(Ordering::Acquire);
            let cur: *mut V = unpack_ptr(word);
            if cur as *const V != expected {
                drop(unsafe { Box::from_raw(new_ptr) });
                return None;
            }
            let count = unpack_count(word);
            let new_word = pack(new_ptr.cast(), 0);
            if self
                .packed
                .compare_exchange_weak(word, new_word, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                debug_assert_single_current!(new_ptr);
                self.retire(cur, count);
                return Some(new_ptr);
            }
        }
    }

    fn retire(&self, old_ptr: *mut V, folded_count: u64) {
        if old_ptr.is_null() {
            return;
        }
        let old = unsafe { &*old_ptr };
        let new_val = old.refs().fetch_add(folded_count as i64, Ordering::AcqRel) + folded_count as i64;
        if new_val == 0 {
            finalize(old_ptr);
        }
    }
}

fn finalize<V: Reclaim>(ptr: *mut V) {
    let boxed = unsafe { Box::from_raw(ptr) };
    V::finalize(boxed);
}
