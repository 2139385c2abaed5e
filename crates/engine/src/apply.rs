//! Apply/undo/idempotency engine: turns a redo record
//! into a differential write, and an undo record into a rollback of
//! one, with the checkpoint-LSN idempotency short-circuit for the
//! contexts that need it.

use crate::reader_registry::ReaderRegistry;
use crate::state::EngineState;
use std::sync::Arc;
use vstore_core::error::Result;
use vstore_core::{ApplyContext, ChangeHandler, Kind, OperationKind, RedoRecord, UndoRecord, VersionEntry};
use vstore_storage::Slot;

pub struct ApplyEngine<'a> {
    state: &'a EngineState,
    change_handler: Option<&'a dyn ChangeHandler>,
}

impl<'a> ApplyEngine<'a> {
    pub fn new(state: &'a EngineState, change_handler: Option<&'a dyn ChangeHandler>) -> Self {
        ApplyEngine { state, change_handler }
    }

    /// Applies one redo record under `context`, respecting the
    /// idempotency rule: a `SecondaryRedo`/`RecoveryRedo` whose VSN is
    /// already covered by the published checkpoint is a no-op.
    #[tracing::instrument(skip(self, record), fields(vsn = record.vsn.get()))]
    pub fn apply(&self, record: &RedoRecord, context: ApplyContext) -> Result<()> {
        if context.is_idempotency_checked() {
            let published = self.state.published();
            if published.metadata.already_checkpointed(record.vsn) {
                tracing::debug!("apply skipped: vsn already checkpointed");
                return Ok(());
            }
        }

        let kind = match record.op {
            OperationKind::Add => Kind::Inserted,
            OperationKind::Update => Kind::Updated,
            OperationKind::Remove => Kind::Deleted,
        };
        let new_entry = VersionEntry::new_resident(kind, record.vsn, record.value.clone());

        let differential = self.state.differential();
        let readers: Arc<ReaderRegistry> = self.state.readers.clone();
        let displaced = differential.put(&record.key, new_entry, |vsn| readers.any_open_at_or_above(vsn));
        if let Some(d) = displaced {
            if self.state.readers.any_open_at_or_above(d.entry.vsn) {
                self.state.snapshots.stash(d.entry.vsn, record.key.clone(), d.entry);
            }
        }

        match record.op {
            OperationKind::Add => self.state.incr_live_keys(1),
            OperationKind::Remove => self.state.incr_live_keys(-1),
            OperationKind::Update => {}
        }

        if let Some(handler) = self.change_handler {
            match record.op {
                OperationKind::Add => handler.on_add(
                    &record.key,
                    record.value.as_ref().expect("Add redo record always carries a value"),
                    record.vsn,
                ),
                OperationKind::Update => handler.on_update(
                    &record.key,
                    record.value.as_ref().expect("Update redo record always carries a value"),
                    record.vsn,
                ),
                OperationKind::Remove => handler.on_remove(&record.key, record.vsn),
            }
        }

        Ok(())
    }

    /// Rolls a key back to its prior version on false progress. A record naming a key already missing from the
    /// differential (because an earlier undo in the same batch already
    /// handled it) is a no-op, not an error.
    #[tracing::instrument(skip(self, record), fields(vsn = record.vsn.get()))]
    pub fn undo(&self, record: &UndoRecord) -> Result<()> {
        let differential = self.state.differential();
        let existing = differential.get(&record.key);
        let existing_live = existing.as_ref().map_or(false, |s| !s.current.is_tombstone());

        match &record.prior {
            None => {
                differential.remove(&record.key);
                if existing_live {
                    self.state.incr_live_keys(-1);
                }
            }
            Some((prior_vsn, prior_kind, prior_value)) => {
                let restored_live = !prior_kind.is_tombstone();
                let restored = VersionEntry::new_resident(*prior_kind, *prior_vsn, prior_value.clone());
                differential.replace(&record.key, Slot { current: restored, previous: None });
                match (existing_live, restored_live) {
                    (true, false) => self.state.incr_live_keys(-1),
                    (false, true) => self.state.incr_live_keys(1),
                    _ => {}
                }
            }
        }
        Ok(())
    }
}
