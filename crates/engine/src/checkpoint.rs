//! Checkpoint pipeline: Prepare / Perform / Complete.
//!
//! - **Prepare** freezes the live differential behind a short write lock
//!   and swaps in a fresh, empty one; writers immediately resume into
//!   the new differential while Perform runs concurrently.
//! - **Perform** merge-walks the frozen differential against the
//!   published consolidated container, writes every touched key to a
//!   new checkpoint file, and builds the next consolidated generation.
//!   Keys untouched since the last checkpoint keep their existing
//!   `Consolidated` entry unchanged (no rewrite).
//! - **Complete** atomically publishes the new `(consolidated, metadata)`
//!   pair and deletes any checkpoint file the new metadata no longer
//!   references.
//!
//! A version displaced from `C` during the merge (because a newer
//! differential write superseded it) is stashed into the snapshot
//! container under its own VSN if some open reader still needs it,
//! exactly like a displacement inside `Differential::put` -- the same
//! same "claimed or dropped" rule governs both paths.

use crate::file_pool::FilePool;
use crate::merge_policy::MergePolicy;
use crate::state::{EngineState, Published};
use std::cmp::Ordering;
use std::fs::File;
use std::sync::Arc;
use vstore_core::error::{Error, Result};
use vstore_core::{CancellationToken, FileDescriptor, Key, KeySerializer, MetadataTable, ValueSerializer, Vsn};
use vstore_durability::format::{CheckpointFile, CheckpointFileWriter, RecordRef};
use vstore_durability::MetadataStore;
use vstore_storage::{Consolidated, ConsolidatedBuilder};

pub struct CheckpointCoordinator {
    state: Arc<EngineState>,
    checkpoint_dir: std::path::PathBuf,
    block_size_bytes: usize,
    merge_policy: MergePolicy,
    pool: Arc<FilePool>,
    key_ser: Arc<dyn KeySerializer>,
    value_ser: Arc<dyn ValueSerializer>,
}

impl CheckpointCoordinator {
    pub fn new(
        state: Arc<EngineState>,
        checkpoint_dir: std::path::PathBuf,
        block_size_bytes: usize,
        merge_policy: MergePolicy,
        pool: Arc<FilePool>,
        key_ser: Arc<dyn KeySerializer>,
        value_ser: Arc<dyn ValueSerializer>,
    ) -> Self {
        CheckpointCoordinator { state, checkpoint_dir, block_size_bytes, merge_policy, pool, key_ser, value_ser }
    }

    /// Runs one full Prepare/Perform/Complete cycle. `checkpoint_lsn` is
    /// the VSN the caller has committed to as this round's watermark
    ///.
    pub async fn run(&self, checkpoint_lsn: Vsn) -> Result<()> {
        self.run_cancellable(checkpoint_lsn, &CancellationToken::new()).await
    }

    /// As [`Self::run`], but checked cooperatively against `token`
    /// between blocks of Phase W: a cancelled
    /// checkpoint deletes `F_new` and leaves `C`/`M` untouched, same as
    /// any other Phase W failure.
    #[tracing::instrument(skip(self, token))]
    pub async fn run_cancellable(&self, checkpoint_lsn: Vsn, token: &CancellationToken) -> Result<()> {
        let frozen = self.state.freeze_differential();
        let outcome = self.perform(&frozen, checkpoint_lsn, token).await;
        match outcome {
            Ok(prepared) => self.complete(prepared),
            Err(e) => {
                // Leave the published generation untouched; the frozen
                // differential stays around so reads still see it, and a
                // later checkpoint attempt retries from the same input.
                tracing::warn!(error = %e, "checkpoint perform failed, published state unchanged");
                Err(e)
            }
        }
    }

    async fn perform(
        &self,
        frozen: &vstore_storage::Differential,
        checkpoint_lsn: Vsn,
        token: &CancellationToken,
    ) -> Result<PreparedCheckpoint> {
        let published = self.state.published();
        let comparator = self.state.comparator.clone();

        let file_id = self.state.allocate_file_id();
        let relative_path = format!("{file_id:010}.chk");
        std::fs::create_dir_all(&self.checkpoint_dir)?;
        let file = File::create(self.checkpoint_dir.join(&relative_path))?;
        let mut writer = CheckpointFileWriter::new(
            file,
            file_id,
            self.block_size_bytes,
            self.key_ser.clone(),
            self.value_ser.clone(),
        )?;
        let mut builder = ConsolidatedBuilder::new(comparator.clone());
        let mut live_count = 0u64;
        let mut total_count = 0u64;

        let mut d_iter = frozen.iter().peekable();
        let mut c_iter = published.consolidated.iter().peekable();

        loop {
            if let Err(e) = token.checked() {
                let _ = std::fs::remove_file(self.checkpoint_dir.join(&relative_path));
                return Err(e);
            }
            match (d_iter.peek(), c_iter.peek()) {
                (None, None) => break,
                (Some(_), None) => {
                    let (key, slot) = d_iter.next().unwrap();
                    let (l, t) = Self::emit(&mut writer, &mut builder, &key, &slot.current)?;
                    live_count += l;
                    total_count += t;
                }
                (None, Some(_)) => {
                    let (key, entry) = c_iter.next().unwrap();
                    if !entry.is_tombstone() {
                        live_count += 1;
                    }
                    total_count += 1;
                    builder.push(key.clone(), entry.clone());
                }
                (Some((dk, _)), Some((ck, _))) => match comparator.compare(dk.as_slice(), ck.as_slice()) {
                    Ordering::Less => {
                        let (key, slot) = d_iter.next().unwrap();
                        let (l, t) = Self::emit(&mut writer, &mut builder, &key, &slot.current)?;
                        live_count += l;
                        total_count += t;
                    }
                    Ordering::Greater => {
                        let (key, entry) = c_iter.next().unwrap();
                        if !entry.is_tombstone() {
                            live_count += 1;
                        }
                        total_count += 1;
                        builder.push(key.clone(), entry.clone());
                    }
                    Ordering::Equal => {
                        let (key, slot) = d_iter.next().unwrap();
                        let (_, c_entry) = c_iter.next().unwrap();
                        let (l, t) = Self::emit(&mut writer, &mut builder, &key, &slot.current)?;
                        live_count += l;
                        total_count += t;
                        if self.state.readers.any_open_at_or_above(c_entry.vsn) {
                            self.state.snapshots.stash(c_entry.vsn, key, c_entry.clone());
                        }
                    }
                },
            }
        }

        let out = writer.finish()?;
        out.sync_all()?;
        let size_bytes = std::fs::metadata(self.checkpoint_dir.join(&relative_path))?.len();
        self.pool.ensure_loaded(file_id, &relative_path)?;

        let new_file = FileDescriptor { file_id, relative_path, live_count, total_count, size_bytes };
        let mut new_consolidated = builder.build();
        let mut files: Vec<FileDescriptor> = published
            .metadata
            .files
            .iter()
            .filter(|f| f.file_id != file_id)
            .cloned()
            .collect();
        files.push(new_file);

        let mut merged_away: Vec<u64> = Vec::new();
        if self.merge_policy.should_merge(&files) && files.len() > 1 {
            let (rewritten, descriptor, dropped_ids) = self.merge_rewrite(&new_consolidated, &files)?;
            new_consolidated = rewritten;
            files = vec![descriptor];
            merged_away = dropped_ids;
        }

        let new_metadata = MetadataTable { checkpoint_lsn: Some(checkpoint_lsn), files };
        Ok(PreparedCheckpoint { new_consolidated, new_metadata, merged_away })
    }

    fn emit(
        writer: &mut CheckpointFileWriter<File>,
        builder: &mut ConsolidatedBuilder,
        key: &Key,
        entry: &vstore_core::VersionEntry,
    ) -> Result<(u64, u64)> {
        let value = entry.resident_value().cloned();
        let pointer = writer.write_record(RecordRef {
            key,
            vsn: entry.vsn.get(),
            kind: entry.kind,
            value: value.as_ref(),
        })?;
        let flushed = vstore_core::VersionEntry::new_flushed(entry.kind, entry.vsn, value, pointer);
        let live = if flushed.is_tombstone() { 0 } else { 1 };
        builder.push(key.clone(), flushed);
        Ok((live, 1))
    }

    /// Rewrites every live entry of `consolidated` into a single fresh
    /// file, folding away the files in `files`.
    /// Tombstones are dropped from the rewrite unless some open reader
    /// still needs them.
    fn merge_rewrite(
        &self,
        consolidated: &Consolidated,
        files: &[FileDescriptor],
    ) -> Result<(Consolidated, FileDescriptor, Vec<u64>)> {
        let file_id = self.state.allocate_file_id();
        let relative_path = format!("{file_id:010}.chk");
        let out = File::create(self.checkpoint_dir.join(&relative_path))?;
        let mut writer = CheckpointFileWriter::new(
            out,
            file_id,
            self.block_size_bytes,
            self.key_ser.clone(),
            self.value_ser.clone(),
        )?;
        let mut builder = ConsolidatedBuilder::new(self.state.comparator.clone());
        let mut live_count = 0u64;
        let mut total_count = 0u64;

        for (key, entry) in consolidated.iter() {
            if entry.is_tombstone() && !self.state.readers.any_open_at_or_above(entry.vsn) {
                continue;
            }
            let (l, t) = Self::emit(&mut writer, &mut builder, key, entry)?;
            live_count += l;
            total_count += t;
        }

        let out = writer.finish()?;
        out.sync_all()?;
        let size_bytes = std::fs::metadata(self.checkpoint_dir.join(&relative_path))?.len();
        self.pool.ensure_loaded(file_id, &relative_path)?;

        let descriptor = FileDescriptor { file_id, relative_path, live_count, total_count, size_bytes };
        let dropped: Vec<u64> = files.iter().map(|f| f.file_id).collect();
        Ok((builder.build(), descriptor, dropped))
    }

    fn complete(&self, prepared: PreparedCheckpoint) -> Result<()> {
        let meta_store = MetadataStore::new(&self.checkpoint_dir);
        meta_store.publish(&prepared.new_metadata)?;
        self.state.published.store(Arc::new(Published {
            consolidated: prepared.new_consolidated,
            metadata: prepared.new_metadata.clone(),
        }));
        self.state.clear_frozen();

        for file_id in &prepared.merged_away {
            self.pool.forget(*file_id);
        }
        self.cleanup_orphans(&prepared.new_metadata)?;
        Ok(())
    }

    /// Deletes checkpoint files on disk that the newly-published
    /// metadata table no longer references.
    fn cleanup_orphans(&self, metadata: &MetadataTable) -> Result<()> {
        let referenced: std::collections::HashSet<&str> =
            metadata.files.iter().map(|f| f.relative_path.as_str()).collect();
        let dir = std::fs::read_dir(&self.checkpoint_dir)?;
        for entry in dir {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(".chk") && !referenced.contains(name.as_ref()) {
                let _ = std::fs::remove_file(entry.path());
            }
        }
        Ok(())
    }
}

struct PreparedCheckpoint {
    new_consolidated: Consolidated,
    new_metadata: MetadataTable,
    merged_away: Vec<u64>,
}
