//! Checkpoint file reader pool: keeps each checkpoint
//! file referenced by the metadata table parsed and resident so a value
//! load is a slice copy rather than a fresh file open/parse every time.

use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use vstore_core::error::{Error, Result};
use vstore_core::{DiskPointer, KeySerializer, Value, ValueSerializer};
use vstore_durability::format::CheckpointFile;

pub struct FilePool {
    dir: PathBuf,
    files: DashMap<u64, Arc<CheckpointFile>>,
    key_ser: Arc<dyn KeySerializer>,
    value_ser: Arc<dyn ValueSerializer>,
}

impl FilePool {
    pub fn new(
        dir: impl Into<PathBuf>,
        key_ser: Arc<dyn KeySerializer>,
        value_ser: Arc<dyn ValueSerializer>,
    ) -> Self {
        FilePool { dir: dir.into(), files: DashMap::new(), key_ser, value_ser }
    }

    /// Registers an already-parsed file, replacing whatever was resident
    /// under this `file_id` (used right after writing a new checkpoint
    /// file, and by recovery).
    pub fn register(&self, file_id: u64, file: CheckpointFile) {
        self.files.insert(file_id, Arc::new(file));
    }

    /// Drops a file from the pool -- called once it is no longer
    /// referenced by the published metadata table.
    pub fn forget(&self, file_id: u64) {
        self.files.remove(&file_id);
    }

    /// Parses `relative_path` from disk and registers it under
    /// `file_id` if it is not already resident.
    pub fn ensure_loaded(&self, file_id: u64, relative_path: &str) -> Result<()> {
        if self.files.contains_key(&file_id) {
            return Ok(());
        }
        let bytes = std::fs::read(self.dir.join(relative_path))?;
        let file = CheckpointFile::parse(bytes, self.key_ser.clone(), self.value_ser.clone())?;
        self.files.insert(file_id, Arc::new(file));
        Ok(())
    }

    /// Resolves a pointer to the value it addresses.
    pub fn load(&self, pointer: DiskPointer) -> Result<Value> {
        let file = self.files.get(&pointer.file_id).ok_or_else(|| {
            Error::InvalidState(format!("checkpoint file {} not loaded", pointer.file_id))
        })?;
        let record = file.read_at(pointer)?;
        record
            .value
            .ok_or_else(|| Error::Corruption("disk pointer resolved to a tombstone record".into()))
    }
}
