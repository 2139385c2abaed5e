//! Store-open recovery: loads the metadata table and every checkpoint
//! file it references, rebuilding a fresh `Consolidated` generation
//! entirely from disk.
//!
//! Recovered entries start non-resident (`VersionEntry::new_disk_only`);
//! the first read or sweep pass after open loads values back on demand
//! through the [`crate::file_pool::FilePool`].

use crate::file_pool::FilePool;
use std::path::Path;
use std::sync::Arc;
use vstore_core::error::Result;
use vstore_core::{Key, KeyComparator, KeySerializer, MetadataTable, ValueSerializer, Vsn};
use vstore_durability::format::CheckpointFile;
use vstore_durability::MetadataStore;
use vstore_storage::{Consolidated, ConsolidatedBuilder};

pub struct RecoveredState {
    pub metadata: MetadataTable,
    pub consolidated: Consolidated,
    pub live_key_count: i64,
}

/// Loads `dir`'s metadata table and every checkpoint file it references,
/// registering each with `pool` and rebuilding `C` in sorted order.
pub fn recover(
    dir: &Path,
    comparator: Arc<dyn KeyComparator>,
    pool: &FilePool,
    key_ser: Arc<dyn KeySerializer>,
    value_ser: Arc<dyn ValueSerializer>,
) -> Result<RecoveredState> {
    let metadata = MetadataStore::new(dir).load()?;

    let mut records: Vec<(Key, vstore_core::VersionEntry)> = Vec::new();
    for descriptor in &metadata.files {
        let bytes = std::fs::read(dir.join(&descriptor.relative_path))?;
        let file = CheckpointFile::parse(bytes, key_ser.clone(), value_ser.clone())?;
        for decoded in file.iter_records()? {
            let entry =
                vstore_core::VersionEntry::new_disk_only(decoded.kind, Vsn::new(decoded.vsn), decoded.pointer);
            records.push((decoded.key, entry));
        }
        pool.register(descriptor.file_id, file);
    }

    // Each live key belongs to exactly one file under this pipeline's
    // invariant (a checkpoint round always rewrites every key it
    // touches into the new file), but sort defensively by comparator
    // rather than assume file order, and keep the newest vsn on a tie.
    // Sort by key ascending, then vsn descending, so `dedup_by` (which
    // keeps the first of each run) retains the newest version per key.
    records.sort_by(|(ka, ea), (kb, eb)| {
        comparator.compare(ka.as_slice(), kb.as_slice()).then(eb.vsn.cmp(&ea.vsn))
    });
    records.dedup_by(|(ka, _), (kb, _)| comparator.compare(ka.as_slice(), kb.as_slice()) == std::cmp::Ordering::Equal);

    let mut builder = ConsolidatedBuilder::new(comparator);
    let mut live_key_count = 0i64;
    for (key, entry) in records {
        if !entry.is_tombstone() {
            live_key_count += 1;
        }
        builder.push(key, entry);
    }

    Ok(RecoveredState { metadata, consolidated: builder.build(), live_key_count })
}
