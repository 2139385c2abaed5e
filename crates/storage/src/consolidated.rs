//! Consolidated state `C` — the immutable, sorted snapshot of everything
//! persisted at the last checkpoint.
//!
//! A two-level partitioned sorted array: a top-level `Vec` of partition
//! boundaries plus per-partition sorted `(Key, VersionEntry)` arrays.
//! Binary search at both levels gives O(log n) lookup with good cache
//! behavior, and partitions untouched by a checkpoint round are shared
//! (`Arc`-cloned, not copied) between the old and new generation.

use std::cmp::Ordering;
use std::sync::Arc;
use vstore_core::{Key, KeyComparator, VersionEntry};

/// Target entry count per partition before the builder starts a new one.
pub const PARTITION_TARGET_LEN: usize = 1024;

/// A contiguous, key-sorted run of entries. Immutable once built
/// (invariant C2: entries are replaced, never edited).
pub struct Partition {
    pub entries: Vec<(Key, VersionEntry)>,
}

impl Partition {
    fn min_key(&self) -> Option<&Key> {
        self.entries.first().map(|(k, _)| k)
    }

    fn lookup(&self, key: &[u8], cmp: &dyn KeyComparator) -> Option<&VersionEntry> {
        self.entries
            .binary_search_by(|(k, _)| cmp.compare(k.as_slice(), key))
            .ok()
            .map(|idx| &self.entries[idx].1)
    }
}

/// The consolidated container: immutable, shared-by-reference, swapped
/// wholesale at checkpoint Complete.
#[derive(Clone)]
pub struct Consolidated {
    partitions: Vec<Arc<Partition>>,
    comparator: Arc<dyn KeyComparator>,
}

impl Consolidated {
    pub fn empty(comparator: Arc<dyn KeyComparator>) -> Self {
        Consolidated { partitions: Vec::new(), comparator }
    }

    pub fn len(&self) -> usize {
        self.partitions.iter().map(|p| p.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Binary search over partition boundaries, then within the
    /// selected partition.
    pub fn get(&self, key: &Key) -> Option<VersionEntry> {
        let idx = self.partition_index(key.as_slice())?;
        self.partitions[idx].lookup(key.as_slice(), self.comparator.as_ref()).cloned()
    }

    fn partition_index(&self, key: &[u8]) -> Option<usize> {
        if self.partitions.is_empty() {
            return None;
        }
        // Find the last partition whose min_key <= key.
        let mut lo = 0usize;
        let mut hi = self.partitions.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            let min_key = self.partitions[mid].min_key()?;
            match self.comparator.compare(min_key.as_slice(), key) {
                Ordering::Less | Ordering::Equal => lo = mid + 1,
                Ordering::Greater => hi = mid,
            }
        }
        if lo == 0 {
            None
        } else {
            Some(lo - 1)
        }
    }

    /// Ordered iteration over all `(key, entry)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = &(Key, VersionEntry)> + '_ {
        self.partitions.iter().flat_map(|p| p.entries.iter())
    }

    /// Range iteration bounded by optional lo/hi keys (inclusive lo,
    /// exclusive hi).
    pub fn range(&self, lo: Option<&Key>, hi: Option<&Key>) -> Vec<(Key, VersionEntry)> {
        self.iter()
            .filter(|(k, _)| {
                let above_lo = lo.map_or(true, |l| {
                    self.comparator.compare(k.as_slice(), l.as_slice()) != Ordering::Less
                });
                let below_hi = hi.map_or(true, |h| {
                    self.comparator.compare(k.as_slice(), h.as_slice()) == Ordering::Less
                });
                above_lo && below_hi
            })
            .cloned()
            .collect()
    }

    /// Replaces the entry for `key`, used by the in-place path the
    /// sweep engine takes to release a value: because sweep must not
    /// block readers, it builds a whole new `Consolidated` out of the
    /// old one's partitions, re-using every partition unchanged except
    /// the ones containing a swept key (copy-on-write at partition
    /// granularity, not whole-container granularity, to keep a sweep
    /// pass cheap on a large store).
    pub fn with_updated_partitions(&self, updates: Vec<(usize, Arc<Partition>)>) -> Consolidated {
        let mut partitions = self.partitions.clone();
        for (idx, replacement) in updates {
            partitions[idx] = replacement;
        }
        Consolidated { partitions, comparator: self.comparator.clone() }
    }

    pub fn partition_iter(&self) -> impl Iterator<Item = (usize, &Arc<Partition>)> {
        self.partitions.iter().enumerate()
    }

    /// Installs a value a reader just loaded from disk back onto the
    /// entry it was loaded from, but only if that entry is still the
    /// exact one the reader saw (`original`'s flags `Arc` still matches
    /// what's live) and nobody else has installed a value onto it in the
    /// meantime -- the race resolution spec.md §9 calls for: "before
    /// installing it back as the entry's value, re-check that the entry
    /// pointer is still the same one loaded from; otherwise discard the
    /// load." Returns `None` (a safe no-op) if the check fails.
    pub fn try_install_value(
        &self,
        key: &Key,
        original: &VersionEntry,
        loaded: VersionEntry,
    ) -> Option<Consolidated> {
        let idx = self.partition_index(key.as_slice())?;
        let partition = &self.partitions[idx];
        let pos = partition
            .entries
            .binary_search_by(|(k, _)| self.comparator.compare(k.as_slice(), key.as_slice()))
            .ok()?;
        let current_entry = &partition.entries[pos].1;
        if !current_entry.same_identity(original) || current_entry.has_resident_value() {
            return None;
        }
        let mut entries = partition.entries.clone();
        entries[pos].1 = loaded;
        let mut partitions = self.partitions.clone();
        partitions[idx] = Arc::new(Partition { entries });
        Some(Consolidated { partitions, comparator: self.comparator.clone() })
    }

    pub fn comparator(&self) -> &Arc<dyn KeyComparator> {
        &self.comparator
    }
}

/// Builds a new [`Consolidated`] generation from a fully-merged, already
/// key-sorted stream of `(Key, VersionEntry)` pairs (the output of
/// the checkpoint pipeline's merge walk).
pub struct ConsolidatedBuilder {
    comparator: Arc<dyn KeyComparator>,
    partitions: Vec<Arc<Partition>>,
    current: Vec<(Key, VersionEntry)>,
}

impl ConsolidatedBuilder {
    pub fn new(comparator: Arc<dyn KeyComparator>) -> Self {
        ConsolidatedBuilder { comparator, partitions: Vec::new(), current: Vec::new() }
    }

    pub fn push(&mut self, key: Key, entry: VersionEntry) {
        self.current.push((key, entry));
        if self.current.len() >= PARTITION_TARGET_LEN {
            self.flush_partition();
        }
    }

    fn flush_partition(&mut self) {
        if !self.current.is_empty() {
            let entries = std::mem::take(&mut self.current);
            self.partitions.push(Arc::new(Partition { entries }));
        }
    }

    pub fn build(mut self) -> Consolidated {
        self.flush_partition();
        Consolidated { partitions: self.partitions, comparator: self.comparator }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vstore_core::{Kind, LexicographicComparator, Vsn};

    fn comparator() -> Arc<dyn KeyComparator> {
        Arc::new(LexicographicComparator)
    }

    fn entry(vsn: u64) -> VersionEntry {
        VersionEntry::new_disk_only(
            Kind::Inserted,
            Vsn::new(vsn),
            vstore_core::DiskPointer { file_id: 1, offset: 0, length: 10 },
        )
    }

    #[test]
    fn lookup_across_partitions() {
        let mut b = ConsolidatedBuilder::new(comparator());
        for i in 0..(PARTITION_TARGET_LEN * 3) {
            let key = Key::from_bytes(format!("k{:06}", i).into_bytes());
            b.push(key, entry(i as u64));
        }
        let c = b.build();
        assert!(c.partitions.len() >= 3);
        let mid = Key::from_bytes(format!("k{:06}", PARTITION_TARGET_LEN + 5).into_bytes());
        let got = c.get(&mid).unwrap();
        assert_eq!(got.vsn, Vsn::new((PARTITION_TARGET_LEN + 5) as u64));
        let missing = Key::from_bytes(b"zzz-not-present".to_vec());
        assert!(c.get(&missing).is_none());
    }

    #[test]
    fn range_query_is_ordered_and_bounded() {
        let mut b = ConsolidatedBuilder::new(comparator());
        for i in 0..50 {
            let key = Key::from_bytes(format!("k{:03}", i).into_bytes());
            b.push(key, entry(i as u64));
        }
        let c = b.build();
        let lo = Key::from_bytes(b"k010".to_vec());
        let hi = Key::from_bytes(b"k020".to_vec());
        let got = c.range(Some(&lo), Some(&hi));
        assert_eq!(got.len(), 10);
        assert_eq!(got.first().unwrap().0.as_slice(), b"k010");
        assert_eq!(got.last().unwrap().0.as_slice(), b"k019");
    }
}
