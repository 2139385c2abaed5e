//! `VersionedStore` — the public façade.
//!
//! Ties every other module in this crate (and in `vstore-storage`,
//! `vstore-durability`, `vstore-concurrency`) into the single surface an
//! embedding replicator and its callers actually use: transactional
//! Add/Update/Remove/Get/Enumerate, checkpoint/backup/restore/copy
//! hooks, and the isolation-aware read path.
//!
//! The façade is the only place in the workspace that calls the lock
//! manager.

use crate::apply::ApplyEngine;
use crate::checkpoint::CheckpointCoordinator;
use crate::config::StoreConfig;
use crate::enumerator::{self, Enumerator};
use crate::file_pool::FilePool;
use crate::reader_registry::ReaderGuard;
use crate::recovery;
use crate::state::{EngineState, MemoryStats};
use crate::sweep::SweepEngine;
use dashmap::DashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vstore_concurrency::{IsolationLevel, Transaction};
use vstore_core::error::{Error, Result};
use vstore_core::{
    CancellationToken, ChangeHandler, FileDescriptor, Key, KeyComparator, KeySerializer, LockManager,
    LockMode, MetadataTable, OperationKind, ReadStatus, RedoRecord, Replicator, Role, UndoRecord, Value,
    ValueSerializer, Vsn, WriteStatus,
};
use vstore_durability::MetadataStore;

/// `Count()`/`MemoryUsage()` plus whatever else a caller wants to know
/// about the store's shape without doing a full scan.
pub struct StoreStats {
    pub live_keys: usize,
    pub memory: MemoryStats,
}

/// The transactional, durable, in-memory-first sorted key-value store
/// façade.
pub struct VersionedStore {
    state: Arc<EngineState>,
    config: StoreConfig,
    pool: Arc<FilePool>,
    lock_manager: Arc<dyn LockManager>,
    replicator: Arc<dyn Replicator>,
    change_handler: Option<Arc<dyn ChangeHandler>>,
    checkpoint: CheckpointCoordinator,
    sweep: Arc<SweepEngine>,
    sweep_shutdown: tokio::sync::watch::Sender<bool>,
    reader_guards: DashMap<u64, ReaderGuard>,
    closed: AtomicBool,
    inflight: Arc<AtomicU64>,
    key_ser: Arc<dyn KeySerializer>,
    value_ser: Arc<dyn ValueSerializer>,
}

impl VersionedStore {
    /// Opens (or creates) a store at `config.checkpoint_dir`, running
    /// recovery against whatever checkpoint files and metadata table
    /// are already there. `key_serializer`/`value_serializer` are the
    /// codecs used to encode/decode every record in the checkpoint file
    /// format; a caller with no domain-specific codec can pass
    /// `RawKeySerializer`/`RawValueSerializer`.
    pub fn open(
        config: StoreConfig,
        comparator: Arc<dyn KeyComparator>,
        lock_manager: Arc<dyn LockManager>,
        replicator: Arc<dyn Replicator>,
        change_handler: Option<Arc<dyn ChangeHandler>>,
        key_serializer: Arc<dyn KeySerializer>,
        value_serializer: Arc<dyn ValueSerializer>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&config.checkpoint_dir)?;
        let pool = Arc::new(FilePool::new(&config.checkpoint_dir, key_serializer.clone(), value_serializer.clone()));
        let recovered = recovery::recover(
            &config.checkpoint_dir,
            comparator.clone(),
            &pool,
            key_serializer.clone(),
            value_serializer.clone(),
        )?;

        let state = Arc::new(EngineState::new(comparator, recovered.metadata.clone()));
        state.published.store(Arc::new(crate::state::Published {
            consolidated: recovered.consolidated,
            metadata: recovered.metadata,
        }));
        state.set_live_key_count(recovered.live_key_count);

        if let Some(handler) = &change_handler {
            let entries = enumerator::range(&state, None, None, None);
            let mut rebuilt = entries
                .into_iter()
                .map(|(key, entry)| {
                    let value = Self::resolve_value(&pool, &entry)?;
                    Ok((key, value, entry.vsn))
                })
                .collect::<Result<Vec<_>>>()?
                .into_iter();
            handler.on_rebuild(&mut rebuilt);
        }

        let checkpoint = CheckpointCoordinator::new(
            state.clone(),
            config.checkpoint_dir.clone(),
            config.block_size_bytes,
            config.merge_policy,
            pool.clone(),
            key_serializer.clone(),
            value_serializer.clone(),
        );
        let sweep = Arc::new(SweepEngine::new(state.clone()));
        let (sweep_shutdown, _) = tokio::sync::watch::channel(false);

        tracing::info!(dir = %config.checkpoint_dir.display(), live_keys = state.live_key_count(), "store opened");

        Ok(VersionedStore {
            state,
            config,
            pool,
            lock_manager,
            replicator,
            change_handler,
            checkpoint,
            sweep,
            sweep_shutdown,
            reader_guards: DashMap::new(),
            closed: AtomicBool::new(false),
            inflight: Arc::new(AtomicU64::new(0)),
            key_ser: key_serializer,
            value_ser: value_serializer,
        })
    }

    /// Spawns the background sweep loop on the current tokio runtime, if
    /// `config.sweep_interval` is set. Call once per open store.
    pub fn spawn_sweep(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        let interval = self.config.sweep_interval?;
        let sweep = self.sweep.clone();
        let shutdown = self.sweep_shutdown.subscribe();
        Some(tokio::spawn(sweep.run_loop(shutdown, interval)))
    }

    /// Runs one sweep pass synchronously (tests, or a host driving sweep
    /// on its own schedule instead of [`Self::spawn_sweep`]).
    pub fn run_sweep_pass(&self) {
        self.sweep.run_pass();
    }

    fn resolve_value(pool: &FilePool, entry: &vstore_core::VersionEntry) -> Result<Value> {
        if entry.is_tombstone() {
            return Ok(Value::from_bytes(Vec::new()));
        }
        match entry.resident_value() {
            Some(v) => Ok(v.clone()),
            None => {
                let pointer = entry
                    .disk
                    .ok_or_else(|| Error::Corruption("entry has neither value nor disk pointer".into()))?;
                pool.load(pointer)
            }
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.replicator.role() != Role::Primary || self.replicator.write_status() != WriteStatus::Writable {
            return Err(Error::NotPrimary);
        }
        Ok(())
    }

    /// Readable iff role is Primary (always), or an Active/Idle
    /// Secondary with `read_status = readable` *and* the caller is using
    /// snapshot isolation; non-snapshot reads on a non-primary fail
    ///.
    fn ensure_readable(&self, isolation: IsolationLevel) -> Result<()> {
        match self.replicator.role() {
            Role::Primary => Ok(()),
            Role::ActiveSecondary | Role::IdleSecondary => {
                if isolation.uses_snapshot() && self.replicator.read_status() == ReadStatus::Readable {
                    Ok(())
                } else {
                    Err(Error::NotReadable)
                }
            }
            Role::None => Err(Error::NotReadable),
        }
    }

    pub fn begin_transaction(&self, isolation: IsolationLevel) -> Transaction {
        Transaction::new(isolation, self.config.default_lock_deadline)
    }

    /// Releases every lock this transaction holds and drops its reader
    /// guard (if any), allowing the snapshot container to reclaim
    /// buckets this transaction was the last interested reader of
    /// once the last interested reader drops it. Call once per
    /// transaction at commit/abort.
    pub fn end_transaction(&self, t: &Transaction) {
        for handle in t.release_all_locks() {
            self.lock_manager.release(handle);
        }
        self.reader_guards.remove(&t.txn_id);
    }

    fn deadline(&self, t: &Transaction, deadline: Option<Duration>) -> Duration {
        deadline.unwrap_or(t.default_deadline)
    }

    /// Establishes (idempotently) this transaction's fixed snapshot VSN
    /// and, the first time, registers a reader guard so the snapshot
    /// container keeps any bucket this transaction might still need
    /// alive.
    fn establish_snapshot(&self, t: &Transaction) -> Option<Vsn> {
        let replicator = self.replicator.clone();
        let vis = t.visibility_vsn(|| replicator.get_visibility_vsn());
        if let Some(v) = vis {
            self.reader_guards
                .entry(t.txn_id)
                .or_insert_with(|| self.state.readers.register(v, self.state.snapshots.clone()));
        }
        vis
    }

    async fn acquire(&self, t: &Transaction, key: &Key, mode: LockMode, deadline: Duration) -> Result<()> {
        let handle = self.lock_manager.acquire(key, mode, deadline).await?;
        if t.isolation == IsolationLevel::RepeatableRead || mode == LockMode::Exclusive {
            t.track_lock(handle);
        } else {
            self.lock_manager.release(handle);
        }
        Ok(())
    }

    /// `Add(t, k, v)`: fails with `AlreadyExists` if any
    /// currently-visible (read-committed) version of `k` is a
    /// non-tombstone.
    pub async fn add(&self, t: &Transaction, key: Key, value: Value, deadline: Option<Duration>) -> Result<Vsn> {
        self.ensure_open()?;
        self.ensure_writable()?;
        self.config.limits.validate_key_length(&key)?;
        self.config.limits.validate_value(&value)?;
        let _inflight = self.track_inflight();
        let deadline = self.deadline(t, deadline);
        self.acquire(t, &key, LockMode::Exclusive, deadline).await?;

        if let Some(existing) = enumerator::lookup_entry(&self.state, &key, None) {
            if !existing.is_tombstone() {
                return Err(Error::AlreadyExists);
            }
        }

        let vsn = self.replicator.append_redo(OperationKind::Add, key.clone(), Some(value.clone())).await?;
        let record = RedoRecord { op: OperationKind::Add, key, value: Some(value), vsn };
        ApplyEngine::new(&self.state, self.change_handler.as_deref())
            .apply(&record, vstore_core::ApplyContext::PrimaryRedo)?;
        Ok(vsn)
    }

    /// `ConditionalUpdate(t, k, v, expected_vsn?)`.
    pub async fn conditional_update(
        &self,
        t: &Transaction,
        key: Key,
        value: Value,
        expected_vsn: Option<Vsn>,
        deadline: Option<Duration>,
    ) -> Result<Vsn> {
        self.ensure_open()?;
        self.ensure_writable()?;
        self.config.limits.validate_key_length(&key)?;
        self.config.limits.validate_value(&value)?;
        let _inflight = self.track_inflight();
        let deadline = self.deadline(t, deadline);
        self.acquire(t, &key, LockMode::Exclusive, deadline).await?;

        let current = enumerator::lookup_entry(&self.state, &key, None).filter(|e| !e.is_tombstone());
        let current = current.ok_or(Error::NotFound)?;
        if let Some(expected) = expected_vsn {
            if expected != current.vsn {
                return Err(Error::ConditionalCheckFailed {
                    expected: Some(expected.get()),
                    found: Some(current.vsn.get()),
                });
            }
        }

        let vsn = self.replicator.append_redo(OperationKind::Update, key.clone(), Some(value.clone())).await?;
        let record = RedoRecord { op: OperationKind::Update, key, value: Some(value), vsn };
        ApplyEngine::new(&self.state, self.change_handler.as_deref())
            .apply(&record, vstore_core::ApplyContext::PrimaryRedo)?;
        Ok(vsn)
    }

    /// `ConditionalRemove(t, k, expected_vsn?)`.
    pub async fn conditional_remove(
        &self,
        t: &Transaction,
        key: Key,
        expected_vsn: Option<Vsn>,
        deadline: Option<Duration>,
    ) -> Result<Vsn> {
        self.ensure_open()?;
        self.ensure_writable()?;
        self.config.limits.validate_key_length(&key)?;
        let _inflight = self.track_inflight();
        let deadline = self.deadline(t, deadline);
        self.acquire(t, &key, LockMode::Exclusive, deadline).await?;

        let current = enumerator::lookup_entry(&self.state, &key, None).filter(|e| !e.is_tombstone());
        let current = current.ok_or(Error::NotFound)?;
        if let Some(expected) = expected_vsn {
            if expected != current.vsn {
                return Err(Error::ConditionalCheckFailed {
                    expected: Some(expected.get()),
                    found: Some(current.vsn.get()),
                });
            }
        }

        let vsn = self.replicator.append_redo(OperationKind::Remove, key.clone(), None).await?;
        let record = RedoRecord { op: OperationKind::Remove, key, value: None, vsn };
        ApplyEngine::new(&self.state, self.change_handler.as_deref())
            .apply(&record, vstore_core::ApplyContext::PrimaryRedo)?;
        Ok(vsn)
    }

    /// `ConditionalGet(t, k) -> (vsn, v)?`:
    /// isolation-level-aware lookup. `RepeatableRead` additionally takes
    /// and holds a shared lock on `k` for the rest of the transaction.
    pub async fn conditional_get(
        &self,
        t: &Transaction,
        key: &Key,
        deadline: Option<Duration>,
    ) -> Result<Option<(Vsn, Value)>> {
        self.ensure_open()?;
        self.ensure_readable(t.isolation)?;
        let _inflight = self.track_inflight();

        if t.isolation.takes_read_locks() {
            let deadline = self.deadline(t, deadline);
            self.acquire(t, key, LockMode::Shared, deadline).await?;
        }

        let vis_vsn = self.establish_snapshot(t);
        let entry = match enumerator::lookup_entry(&self.state, key, vis_vsn) {
            Some(e) if !e.is_tombstone() => e,
            _ => return Ok(None),
        };
        let had_resident = entry.has_resident_value();
        entry.mark_in_use();
        let value = Self::resolve_value(&self.pool, &entry)?;
        if !had_resident {
            self.state.try_cache_value(key, &entry, &value);
        }
        Ok(Some((entry.vsn, value)))
    }

    /// `ContainsKey(t, k) -> bool`: equivalent to
    /// `ConditionalGet` but never materializes the value.
    pub async fn contains_key(&self, t: &Transaction, key: &Key, deadline: Option<Duration>) -> Result<bool> {
        self.ensure_open()?;
        self.ensure_readable(t.isolation)?;
        let _inflight = self.track_inflight();
        if t.isolation.takes_read_locks() {
            let deadline = self.deadline(t, deadline);
            self.acquire(t, key, LockMode::Shared, deadline).await?;
        }
        let vis_vsn = self.establish_snapshot(t);
        Ok(enumerator::lookup_entry(&self.state, key, vis_vsn).map_or(false, |e| !e.is_tombstone()))
    }

    /// `CreateEnumerator(t, lo?, hi?) -> Enumerator`:
    /// an ordered range scan with the transaction's visibility.
    pub fn create_enumerator(&self, t: &Transaction, lo: Option<&Key>, hi: Option<&Key>) -> Result<Enumerator> {
        self.ensure_open()?;
        self.ensure_readable(t.isolation)?;
        let vis_vsn = self.establish_snapshot(t);
        let entries = enumerator::range(&self.state, lo, hi, vis_vsn);
        Ok(Enumerator::new(entries, self.pool.clone(), self.state.clone(), self.track_inflight()))
    }

    /// `Count()`: the number of keys whose
    /// latest visible (read-committed) version is not a tombstone.
    pub fn count(&self) -> usize {
        self.state.live_key_count()
    }

    /// `MemoryUsage()`.
    pub fn memory_usage(&self) -> StoreStats {
        StoreStats { live_keys: self.count(), memory: self.state.memory_stats() }
    }

    /// Runs one Prepare/Perform/Complete checkpoint cycle against
    /// `checkpoint_lsn`. The replicator supplies the LSN;
    /// this call does the rest.
    pub async fn checkpoint(&self, checkpoint_lsn: Vsn) -> Result<()> {
        self.checkpoint.run(checkpoint_lsn).await
    }

    /// As [`Self::checkpoint`], cooperatively cancellable.
    pub async fn checkpoint_cancellable(&self, checkpoint_lsn: Vsn, token: &CancellationToken) -> Result<()> {
        self.checkpoint.run_cancellable(checkpoint_lsn, token).await
    }

    /// Applies one redo record delivered by the replicator. `context` determines whether the checkpoint-LSN
    /// idempotency short-circuit applies.
    pub fn apply_redo(&self, record: &RedoRecord, context: vstore_core::ApplyContext) -> Result<()> {
        self.ensure_open()?;
        ApplyEngine::new(&self.state, self.change_handler.as_deref())
            .apply(record, context)
    }

    /// Rolls a key back on a replicator-reported false progress. Missing keys (an earlier undo in the same batch already
    /// removed them) are treated as no-ops, not errors.
    pub fn apply_undo(&self, record: &UndoRecord) -> Result<()> {
        self.ensure_open()?;
        ApplyEngine::new(&self.state, self.change_handler.as_deref())
            .undo(record)
    }

    /// Copy bootstrap: installs a checkpoint file set
    /// and metadata table streamed directly from a leader, bypassing log
    /// replay entirely. The first `apply_redo` afterwards recovers
    /// `M.checkpoint_lsn` and ignores anything at or below it.
    pub fn install_copy(&self, metadata: MetadataTable, files: Vec<(FileDescriptor, Vec<u8>)>) -> Result<()> {
        self.ensure_open()?;
        std::fs::create_dir_all(&self.config.checkpoint_dir)?;
        for (descriptor, bytes) in &files {
            std::fs::write(self.config.checkpoint_dir.join(&descriptor.relative_path), bytes)?;
        }
        MetadataStore::new(&self.config.checkpoint_dir).publish(&metadata)?;

        let recovered = recovery::recover(
            &self.config.checkpoint_dir,
            self.state.comparator.clone(),
            &self.pool,
            self.key_ser.clone(),
            self.value_ser.clone(),
        )?;
        self.state.published.store(Arc::new(crate::state::Published {
            consolidated: recovered.consolidated,
            metadata: recovered.metadata,
        }));
        self.state.set_live_key_count(recovered.live_key_count);

        if let Some(handler) = &self.change_handler {
            let entries = enumerator::range(&self.state, None, None, None);
            let mut rebuilt = entries
                .into_iter()
                .map(|(key, entry)| {
                    let value = Self::resolve_value(&self.pool, &entry)?;
                    Ok((key, value, entry.vsn))
                })
                .collect::<Result<Vec<_>>>()?
                .into_iter();
            handler.on_rebuild(&mut rebuilt);
        }
        Ok(())
    }

    /// Writes a `.tar.zst` backup bundle of this store's current
    /// metadata table and referenced checkpoint files to `dest`.
    pub fn backup_to(&self, dest: &Path) -> Result<()> {
        vstore_durability::backup_to(&self.config.checkpoint_dir, dest)
    }

    /// Restores a backup bundle into `dir`. Does not recover; callers
    /// should [`Self::open`] at `dir` afterwards.
    pub fn restore_into(bundle: &Path, dir: &Path) -> Result<()> {
        vstore_durability::restore_from(bundle, dir)
    }

    /// Begins an orderly shutdown: refuses new operations, waits for
    /// operations already in flight to finish, stops the background
    /// sweep loop, then returns.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let _ = self.sweep_shutdown.send(true);
        while self.inflight.load(Ordering::Acquire) > 0 {
            tokio::task::yield_now().await;
        }
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.config.checkpoint_dir
    }
}

/// RAII guard tracking one in-flight façade operation, so [`VersionedStore::close`]
/// can drain outstanding work before releasing container memory. Every
/// public read/write operation (`add`, `conditional_update`,
/// `conditional_remove`, `conditional_get`, `contains_key`) holds one for
/// its duration; `create_enumerator` hands its guard to the returned
/// [`Enumerator`] so a long-lived scan keeps `close()` waiting until the
/// caller drops or exhausts it.
pub struct InflightGuard(Arc<AtomicU64>);

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl VersionedStore {
    pub fn track_inflight(&self) -> InflightGuard {
        self.inflight.fetch_add(1, Ordering::AcqRel);
        InflightGuard(self.inflight.clone())
    }
}
