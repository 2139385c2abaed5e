//! Shared test fixtures: a minimal in-process replicator standing in
//! for the real replicated state machine, and a store-opening helper.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use vstore_concurrency::InProcessLockManager;
use vstore_core::error::Result;
use vstore_core::{
    Key, LexicographicComparator, OperationKind, RawKeySerializer, RawValueSerializer, ReadStatus,
    Replicator, Role, Value, Vsn, WriteStatus,
};
use vstore_engine::{StoreConfig, VersionedStore};

/// Always-primary, always-readable/writable replicator that hands out
/// strictly increasing VSNs. `commit_lsn_now`/`get_visibility_vsn` both
/// report the last VSN handed out, which is enough to exercise snapshot
/// isolation without a real log.
pub struct FakeReplicator {
    lsn: AtomicU64,
    role: std::sync::Mutex<Role>,
}

impl FakeReplicator {
    pub fn new() -> Self {
        FakeReplicator { lsn: AtomicU64::new(0), role: std::sync::Mutex::new(Role::Primary) }
    }

    pub fn at_lsn(start: u64) -> Self {
        FakeReplicator { lsn: AtomicU64::new(start), role: std::sync::Mutex::new(Role::Primary) }
    }

    pub fn set_role(&self, role: Role) {
        *self.role.lock().unwrap() = role;
    }
}

impl Default for FakeReplicator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Replicator for FakeReplicator {
    fn commit_lsn_now(&self) -> Vsn {
        Vsn::new(self.lsn.load(Ordering::SeqCst))
    }

    fn get_visibility_vsn(&self) -> Vsn {
        Vsn::new(self.lsn.load(Ordering::SeqCst))
    }

    fn role(&self) -> Role {
        *self.role.lock().unwrap()
    }

    fn read_status(&self) -> ReadStatus {
        ReadStatus::Readable
    }

    fn write_status(&self) -> WriteStatus {
        WriteStatus::Writable
    }

    async fn append_redo(&self, _op: OperationKind, _key: Key, _value: Option<Value>) -> Result<Vsn> {
        Ok(Vsn::new(self.lsn.fetch_add(1, Ordering::SeqCst) + 1))
    }
}

/// Opens a fresh store at `dir` with the fake replicator and an
/// in-process lock manager, disabling the background sweep loop so
/// tests control timing explicitly.
pub fn open_store(dir: &Path, replicator: Arc<FakeReplicator>) -> VersionedStore {
    let config = StoreConfig::builder(dir).sweep_interval(None).build();
    VersionedStore::open(
        config,
        Arc::new(LexicographicComparator),
        Arc::new(InProcessLockManager::new()),
        replicator,
        None,
        Arc::new(RawKeySerializer),
        Arc::new(RawValueSerializer),
    )
    .unwrap()
}
