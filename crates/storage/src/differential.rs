//! Differential state `D` — the hot, mutable delta of writes since the
//! last checkpoint.
//!
//! Backed by a [`crossbeam_skiplist::SkipMap`] keyed by [`OrderedKey`] so
//! point lookups, inserts and ordered range scans are all O(log n)
//! without a global lock. Each slot holds at most two versions
//! (`current`, `previous`), swapped in as an atomic pair via
//! [`arc_swap::ArcSwap`] so readers never observe a half-written slot.

use crossbeam_skiplist::SkipMap;
use std::sync::Arc;
use vstore_core::{Key, KeyComparator, OrderedKey, VersionEntry};

/// The two-version slot stored per key in the differential map
/// (invariant D1: `current.vsn > previous.vsn` when both are present).
#[derive(Clone)]
pub struct Slot {
    pub current: VersionEntry,
    pub previous: Option<VersionEntry>,
}

/// The differential container. Memory-only (invariant D2): no entry
/// stored here ever carries a `disk` pointer at insert time, though a
/// promoted-then-recalled entry could technically carry one after
/// flowing back from consolidated -- the write path in this crate never
/// produces that, so the invariant holds for anything `Differential`
/// itself creates.
pub struct Differential {
    map: SkipMap<OrderedKey, arc_swap::ArcSwap<Slot>>,
    comparator: Arc<dyn KeyComparator>,
}

/// Outcome of a differential write: whatever just fell out of the slot's
/// two-version window entirely (reachable from neither `current` nor
/// `previous` of the new slot), handed back to the caller so it can
/// decide whether to stash it in the snapshot container before it is
/// lost.
pub struct DisplacedVersion {
    pub entry: VersionEntry,
}

impl Differential {
    pub fn new(comparator: Arc<dyn KeyComparator>) -> Self {
        Differential { map: SkipMap::new(), comparator }
    }

    fn ordered(&self, key: &Key) -> OrderedKey {
        OrderedKey::new(key.clone(), self.comparator.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Point lookup: returns the slot for `key`, if present.
    pub fn get(&self, key: &Key) -> Option<Slot> {
        self.map.get(&self.ordered(key)).map(|e| e.value().load().as_ref().clone())
    }

    /// Applies a new version for `key`, implementing the write rules below:
    ///
    /// - absent from `D` (and from consolidated, or a tombstone there):
    ///   new slot `(new, None)`.
    /// - present in `D` with `(cur, prev)` and a reader still needs
    ///   `cur` (`reader_needs_current` is true): new slot
    ///   `(new, Some(cur))` -- `prev` falls out of the window.
    /// - present in `D` but no reader needs `cur`: new slot
    ///   `(new, prev)` -- `cur` falls out of the window.
    ///
    /// Either way at most one version falls out of the two-slot window
    /// per write; it is returned so the caller can decide whether it
    /// still needs to land in the snapshot container.
    pub fn put(
        &self,
        key: &Key,
        new_entry: VersionEntry,
        reader_needs_current: impl FnOnce(vstore_core::Vsn) -> bool,
    ) -> Option<DisplacedVersion> {
        let ordered = self.ordered(key);
        match self.map.get(&ordered) {
            None => {
                self.map.insert(ordered, arc_swap::ArcSwap::from_pointee(Slot {
                    current: new_entry,
                    previous: None,
                }));
                None
            }
            Some(existing) => {
                let old_slot = existing.value().load_full();
                let needs_cur = reader_needs_current(old_slot.current.vsn);
                let (new_previous, fell_out) = if needs_cur {
                    (Some(old_slot.current.clone()), old_slot.previous.clone())
                } else {
                    (old_slot.previous.clone(), Some(old_slot.current.clone()))
                };
                existing.value().store(Arc::new(Slot { current: new_entry, previous: new_previous }));
                fell_out.map(|entry| DisplacedVersion { entry })
            }
        }
    }

    /// Removes a key's slot entirely -- used only by undo, which may
    /// need to roll a key back to "never written this checkpoint cycle".
    pub fn remove(&self, key: &Key) -> Option<Slot> {
        self.map.remove(&self.ordered(key)).map(|e| e.value().load().as_ref().clone())
    }

    /// Replaces a key's slot wholesale -- used by undo to restore a
    /// prior version directly rather than going through the displacement
    /// bookkeeping in `put`.
    pub fn replace(&self, key: &Key, slot: Slot) {
        let ordered = self.ordered(key);
        match self.map.get(&ordered) {
            Some(existing) => existing.value().store(Arc::new(slot)),
            None => {
                self.map.insert(ordered, arc_swap::ArcSwap::from_pointee(slot));
            }
        }
    }

    /// Atomically swaps in a fresh, empty differential, returning the
    /// old one as the frozen input to Phase W of the checkpoint pipeline
    ///. Because `Differential` itself has no
    /// interior "whole container" cell -- callers hold an `Arc<RwLock<..>>`
    /// wrapping the top-level differential in the engine facade -- this
    /// method just produces a new, empty instance for the caller to swap
    /// in under that lock.
    pub fn fresh_like(&self) -> Differential {
        Differential::new(self.comparator.clone())
    }

    /// Ordered iteration over `(key, slot)` pairs, used by checkpoint
    /// Phase W's merge walk and by the enumerator.
    pub fn iter(&self) -> impl Iterator<Item = (Key, Slot)> + '_ {
        self.map.iter().map(|e| (e.key().key.clone(), e.value().load().as_ref().clone()))
    }

    /// Range iteration bounded by optional lo/hi keys (inclusive lo,
    /// exclusive hi), used by `CreateEnumerator`.
    pub fn range(&self, lo: Option<&Key>, hi: Option<&Key>) -> Vec<(Key, Slot)> {
        self.map
            .iter()
            .filter(|e| {
                let k = e.key().key.as_slice();
                let above_lo = lo.map_or(true, |l| self.comparator.compare(k, l.as_slice()) != std::cmp::Ordering::Less);
                let below_hi = hi.map_or(true, |h| self.comparator.compare(k, h.as_slice()) == std::cmp::Ordering::Less);
                above_lo && below_hi
            })
            .map(|e| (e.key().key.clone(), e.value().load().as_ref().clone()))
            .collect()
    }
}
