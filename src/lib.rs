//! vstore — a transactional, durable, in-memory-first sorted key-value
//! store engine.
//!
//! vstore is the embeddable core of a replicated state machine's
//! key-value layer: an ordered map kept hot in memory (the
//! *differential*), periodically folded into an immutable on-disk
//! snapshot (the *consolidated* state) by a checkpoint pipeline, with
//! multi-version concurrency control giving readers snapshot,
//! repeatable-read, or read-committed isolation against ongoing writes.
//! It does not implement replication, transaction logging, or
//! consensus — those are supplied by a host that drives this crate
//! through the [`vstore_core::Replicator`] and [`vstore_core::LockManager`]
//! traits.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use vstore::{LexicographicComparator, RawKeySerializer, RawValueSerializer, VersionedStore, StoreConfig};
//! use vstore_concurrency::{InProcessLockManager, IsolationLevel};
//!
//! # async fn example(replicator: Arc<dyn vstore_core::Replicator>) -> vstore::Result<()> {
//! let config = StoreConfig::builder("/var/lib/myapp/kv").build();
//! let store = Arc::new(VersionedStore::open(
//!     config,
//!     Arc::new(LexicographicComparator),
//!     Arc::new(InProcessLockManager::new()),
//!     replicator,
//!     None,
//!     Arc::new(RawKeySerializer),
//!     Arc::new(RawValueSerializer),
//! )?);
//! store.spawn_sweep();
//!
//! let txn = store.begin_transaction(IsolationLevel::Snapshot);
//! store.add(&txn, "key-17".into(), "value".into(), None).await?;
//! let got = store.conditional_get(&txn, &"key-17".into(), None).await?;
//! store.end_transaction(&txn);
//! assert!(got.is_some());
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! | Crate | Responsibility |
//! |---|---|
//! | `vstore-core` | Vocabulary (`Key`, `Value`, `Vsn`, `VersionEntry`) and collaborator traits (`Replicator`, `LockManager`, `ChangeHandler`) |
//! | `vstore-storage` | The differential skip map, the partitioned consolidated array, and the per-VSN snapshot container |
//! | `vstore-concurrency` | Isolation levels, the transaction handle, and the default in-process lock manager |
//! | `vstore-durability` | The checkpoint file format, metadata table persistence, and backup/restore |
//! | `vstore-engine` | The checkpoint/consolidation/merge pipeline, the apply/undo engine, the sweep engine, and the `VersionedStore` façade |

pub use vstore_concurrency::{IsolationLevel, InProcessLockManager, KeyLockHandle, Transaction};
pub use vstore_core::error::{Error, Result};
pub use vstore_core::{
    CancellationToken, ChangeHandler, DiskPointer, EntryFlags, FileDescriptor, Key, KeyComparator,
    KeySerializer, Kind, LexicographicComparator, LockHandle, LockManager, LockMode,
    MetadataTable, OperationKind, OrderedKey, RawKeySerializer, RawValueSerializer, ReadStatus,
    RedoRecord, Replicator, Role, UndoRecord, Value, ValueSerializer, VersionEntry, Vsn,
    WriteStatus,
};
pub use vstore_durability::{
    backup_to, restore_from, CheckpointFile, CheckpointFileWriter, DecodedRecord, MetadataStore,
    RecordRef, FILE_MAGIC, FORMAT_VERSION,
};
pub use vstore_engine::{
    ApplyEngine, CheckpointCoordinator, Enumerator, EngineState, FilePool, InflightGuard,
    MemoryStats, MergePolicy, Published, ReaderGuard, ReaderRegistry, RecoveredState, StoreConfig,
    StoreConfigBuilder, StoreStats, SweepEngine, VersionedStore,
};
pub use vstore_storage::{
    Consolidated, ConsolidatedBuilder, Differential, DisplacedVersion, Partition,
    SnapshotContainer, Slot, PARTITION_TARGET_LEN,
};
