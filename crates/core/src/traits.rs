//! Collaborator contracts: the interfaces the core engine consumes but
//! does not implement. The replicator, lock manager and
//! change-notification sink are all modeled here as traits; concrete
//! implementations live in `vstore-concurrency` (lock manager) or are
//! supplied by an embedding host (replicator, change handler).

use crate::error::Result;
use crate::key::Key;
use crate::value::Value;
use crate::vsn::Vsn;
use std::time::Duration;

/// The role the replicator currently assigns this store instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Primary,
    IdleSecondary,
    ActiveSecondary,
    None,
}

/// Whether reads are currently permitted, reported by the replicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    Readable,
    NotReadable,
}

/// Whether writes are currently permitted, reported by the replicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    Writable,
    NotWritable,
}

/// The operation a redo/undo record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Add,
    Update,
    Remove,
}

/// The context in which apply is invoked -- determines whether
/// idempotency applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyContext {
    PrimaryRedo,
    SecondaryRedo,
    RecoveryRedo,
    FalseProgressUndo,
}

impl ApplyContext {
    /// Idempotency rule: apply is a no-op iff `op.vsn <= checkpoint_lsn`
    /// and the context is one of these two.
    pub fn is_idempotency_checked(self) -> bool {
        matches!(self, ApplyContext::SecondaryRedo | ApplyContext::RecoveryRedo)
    }
}

/// A single redo record delivered by the replicator.
#[derive(Debug, Clone)]
pub struct RedoRecord {
    pub op: OperationKind,
    pub key: Key,
    pub value: Option<Value>,
    pub vsn: Vsn,
}

/// A single undo record delivered by the replicator on false progress.
/// Carries the prior state for the key so apply's undo path can restore
/// it without having to reconstruct it.
#[derive(Debug, Clone)]
pub struct UndoRecord {
    pub op: OperationKind,
    pub key: Key,
    pub vsn: Vsn,
    /// The version entry that existed immediately before the undone
    /// operation, if any -- `None` means the key did not exist.
    pub prior: Option<(Vsn, crate::entry::Kind, Option<Value>)>,
}

/// Lock acquisition mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Opaque handle returned by a successful lock acquisition; passed back
/// to `release`.
pub trait LockHandle: Send + Sync + std::fmt::Debug {}

/// Key-granularity read/write lock manager. The façade is
/// the only caller; version entries themselves stay lock-free for
/// readers.
#[async_trait::async_trait]
pub trait LockManager: Send + Sync {
    async fn acquire(
        &self,
        key: &Key,
        mode: LockMode,
        deadline: Duration,
    ) -> Result<Box<dyn LockHandle>>;

    fn release(&self, handle: Box<dyn LockHandle>);
}

/// Everything the core engine needs from the replicator.
#[async_trait::async_trait]
pub trait Replicator: Send + Sync {
    fn commit_lsn_now(&self) -> Vsn;
    fn get_visibility_vsn(&self) -> Vsn;
    fn role(&self) -> Role;
    fn read_status(&self) -> ReadStatus;
    fn write_status(&self) -> WriteStatus;

    /// Enqueues a redo for the given write and returns the commit VSN
    /// once ordered by the replicator. Writes never suspend on disk I/O
    /// themselves; this call may still suspend while
    /// waiting for LSN assignment.
    async fn append_redo(&self, op: OperationKind, key: Key, value: Option<Value>) -> Result<Vsn>;
}

/// Optional change-notification sink. Invoked by apply for
/// live traffic, and by recovery/copy with `on_rebuild` for bulk loads.
pub trait ChangeHandler: Send + Sync {
    fn on_add(&self, key: &Key, value: &Value, vsn: Vsn) {
        let _ = (key, value, vsn);
    }
    fn on_update(&self, key: &Key, value: &Value, vsn: Vsn) {
        let _ = (key, value, vsn);
    }
    fn on_remove(&self, key: &Key, vsn: Vsn) {
        let _ = (key, vsn);
    }
    fn on_rebuild(&self, _entries: &mut dyn Iterator<Item = (Key, Value, Vsn)>) {}
}
