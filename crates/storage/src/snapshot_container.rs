//! Snapshot container `S` — per-VSN holding area for version entries
//! displaced from `D` or `C` while an in-flight reader still needs them
//!.
//!
//! Buckets own their entries outright (no pointer back into `D`/`C`):
//! `VersionEntry` is cheap to clone
//! (an `Arc<[u8]>` value plus an `Arc<EntryFlags>`), so a bucket entry is
//! a full owned copy, never a borrow.
//!
//! Protected by a short [`parking_lot::Mutex`] for bucket insert/delete;
//! a lookup clones the `Arc` for a bucket's inner map out from under the
//! lock and then searches it lock-free: lookups never block on the
//! bucket-table mutex once they have their snapshot of it.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use vstore_core::{Key, Vsn};
use vstore_core::VersionEntry;

type Bucket = Arc<FxHashMap<Key, VersionEntry>>;

/// The snapshot container. Keyed by VSN so that when the last reader
/// past a given visibility VSN completes, the whole bucket for that VSN
/// is dropped in one step.
#[derive(Default)]
pub struct SnapshotContainer {
    buckets: Mutex<BTreeMap<Vsn, Bucket>>,
}

impl SnapshotContainer {
    pub fn new() -> Self {
        SnapshotContainer { buckets: Mutex::new(BTreeMap::new()) }
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.lock().is_empty()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Stashes `entry` under `vsn`'s bucket, creating the bucket if
    /// necessary (only called when some open reader holds
    /// visibility `>= vsn` and the entry is about to be displaced).
    pub fn stash(&self, vsn: Vsn, key: Key, entry: VersionEntry) {
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(vsn).or_insert_with(|| Arc::new(FxHashMap::default()));
        let mut map = (**bucket).clone();
        map.insert(key, entry);
        *bucket = Arc::new(map);
    }

    /// Looks up `key` in the smallest bucket whose VSN is `>= vis(t)` and
    /// which actually contains the key -- buckets are keyed by the displaced entry's
    /// own VSN, so the bucket a reader at `vsn` can see is the closest
    /// one at or below its own visibility; anything stashed above `vsn`
    /// was displaced by a write the reader must not observe).
    pub fn lookup(&self, key: &Key, vsn: Vsn) -> Option<VersionEntry> {
        let snapshot: Vec<(Vsn, Bucket)> = {
            let buckets = self.buckets.lock();
            buckets.range(..=vsn).rev().map(|(v, b)| (*v, b.clone())).collect()
        };
        for (_, bucket) in snapshot {
            if let Some(entry) = bucket.get(key) {
                return Some(entry.clone());
            }
        }
        None
    }

    /// All keys visible in buckets with VSN `<= vsn`, largest-bucket-wins
    /// per key (used by the enumerator's merge walk). Returned
    /// unsorted; the enumerator sorts alongside D/C output.
    pub fn visible_entries(&self, vsn: Vsn) -> Vec<(Key, VersionEntry)> {
        let snapshot: Vec<(Vsn, Bucket)> = {
            let buckets = self.buckets.lock();
            buckets.range(..=vsn).map(|(v, b)| (*v, b.clone())).collect()
        };
        let mut seen: FxHashMap<Key, VersionEntry> = FxHashMap::default();
        // Iterate smallest VSN first so the largest (closest to `vsn`)
        // bucket wins on overwrite for a given key.
        for (_, bucket) in snapshot {
            for (k, e) in bucket.iter() {
                seen.insert(k.clone(), e.clone());
            }
        }
        seen.into_iter().collect()
    }

    /// Deletes the bucket for `vsn` wholesale once the last reader with
    /// visibility `>= vsn` has completed.
    pub fn evict_bucket(&self, vsn: Vsn) {
        self.buckets.lock().remove(&vsn);
    }

    /// Evicts every bucket `v` for which no open reader can possibly
    /// hold `visibility >= v` anymore: that is, every bucket whose key
    /// exceeds `max_open_vis`. Called whenever the set of
    /// open readers shrinks; pass `None` when there are no open readers
    /// left at all, which evicts every bucket.
    pub fn evict_above(&self, max_open_vis: Option<Vsn>) {
        let mut buckets = self.buckets.lock();
        let to_drop: Vec<Vsn> = match max_open_vis {
            Some(max_vis) => buckets.range((std::ops::Bound::Excluded(max_vis), std::ops::Bound::Unbounded))
                .map(|(v, _)| *v)
                .collect(),
            None => buckets.keys().copied().collect(),
        };
        for v in to_drop {
            buckets.remove(&v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vstore_core::Kind;

    fn entry(vsn: u64) -> VersionEntry {
        VersionEntry::new_resident(Kind::Inserted, Vsn::new(vsn), Some("v".into()))
    }

    #[test]
    fn stash_and_lookup() {
        let s = SnapshotContainer::new();
        let k = Key::from_bytes(b"k".to_vec());
        s.stash(Vsn::new(5), k.clone(), entry(5));
        assert!(s.lookup(&k, Vsn::new(5)).is_some());
        assert!(s.lookup(&k, Vsn::new(6)).is_some(), "a reader at a higher vsn still sees an older bucket");
        assert!(s.lookup(&k, Vsn::new(4)).is_none(), "a reader below the bucket's vsn must not see it");
    }

    #[test]
    fn evict_bucket_removes_entries() {
        let s = SnapshotContainer::new();
        let k = Key::from_bytes(b"k".to_vec());
        s.stash(Vsn::new(5), k.clone(), entry(5));
        s.evict_bucket(Vsn::new(5));
        assert!(s.is_empty());
        assert!(s.lookup(&k, Vsn::new(5)).is_none());
    }

    #[test]
    fn evict_above_reclaims_buckets_past_max_open_reader() {
        let s = SnapshotContainer::new();
        s.stash(Vsn::new(1), Key::from_bytes(b"a".to_vec()), entry(1));
        s.stash(Vsn::new(10), Key::from_bytes(b"b".to_vec()), entry(10));
        s.evict_above(Some(Vsn::new(5)));
        assert_eq!(s.bucket_count(), 1);
        s.evict_above(None);
        assert_eq!(s.bucket_count(), 0);
    }
}
