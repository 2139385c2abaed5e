//! On-disk persistence of the metadata table `M`.
//!
//! Uses a `current`/`next` two-file atomic-swap scheme rather than a
//! single mutable file: Phase C's publish writes the new table to
//! `next`, `fsync`s it, then renames it over `current` -- a rename is
//! atomic on the filesystems this store targets, so a reader opening the
//! directory mid-publish always sees either the whole old file or the
//! whole new one, never a partial write.

use crc32fast::Hasher;
use std::io::Write;
use std::path::{Path, PathBuf};
use vstore_core::error::{Error, Result};
use vstore_core::MetadataTable;

const CURRENT_FILE: &str = "checkpoint.meta";
const NEXT_FILE: &str = "checkpoint.meta.next";
const HEADER_MAGIC: u32 = 0x5653_4D54; // "VSMT"
const HEADER_VERSION: u16 = 1;

pub struct MetadataStore {
    dir: PathBuf,
}

impl MetadataStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        MetadataStore { dir: dir.into() }
    }

    fn current_path(&self) -> PathBuf {
        self.dir.join(CURRENT_FILE)
    }

    fn next_path(&self) -> PathBuf {
        self.dir.join(NEXT_FILE)
    }

    /// Loads the current metadata table, or an empty one if this is a
    /// fresh store directory. A missing `checkpoint_lsn` field in an
    /// on-disk legacy table is preserved as `None` (idempotency
    /// disabled).
    pub fn load(&self) -> Result<MetadataTable> {
        let path = self.current_path();
        if !path.exists() {
            return Ok(MetadataTable::empty());
        }
        let bytes = std::fs::read(&path)?;
        Self::decode(&bytes)
    }

    fn decode(bytes: &[u8]) -> Result<MetadataTable> {
        if bytes.len() < 4 + 2 + 4 {
            return Err(Error::Corruption("metadata file too small".into()));
        }
        let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        if magic != HEADER_MAGIC {
            return Err(Error::Corruption("metadata file bad magic".into()));
        }
        let version = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
        if version > HEADER_VERSION {
            return Err(Error::Corruption(format!(
                "metadata format version {version} newer than supported {HEADER_VERSION}"
            )));
        }
        let body = &bytes[6..bytes.len() - 4];
        let stored_crc = u32::from_le_bytes(bytes[bytes.len() - 4..].try_into().unwrap());
        let mut hasher = Hasher::new();
        hasher.update(&bytes[..6]);
        hasher.update(body);
        if hasher.finalize() != stored_crc {
            return Err(Error::Corruption("metadata CRC mismatch".into()));
        }
        rmp_serde::from_slice(body).map_err(|e| Error::Serialization(e.to_string()))
    }

    fn encode(table: &MetadataTable) -> Result<Vec<u8>> {
        let body = rmp_serde::to_vec(table)?;
        let mut out = Vec::with_capacity(6 + body.len() + 4);
        out.extend_from_slice(&HEADER_MAGIC.to_le_bytes());
        out.extend_from_slice(&HEADER_VERSION.to_le_bytes());
        out.extend_from_slice(&body);
        let mut hasher = Hasher::new();
        hasher.update(&out);
        out.extend_from_slice(&hasher.finalize().to_le_bytes());
        Ok(out)
    }

    /// Publishes a new metadata table: write `next`, fsync, rename over
    /// `current`. This is the single atomic step of checkpoint Phase C.
    pub fn publish(&self, table: &MetadataTable) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let bytes = Self::encode(table)?;
        let next = self.next_path();
        {
            let mut f = std::fs::File::create(&next)?;
            f.write_all(&bytes)?;
            f.sync_all()?;
        }
        std::fs::rename(&next, self.current_path())?;
        if let Ok(dir_handle) = std::fs::File::open(&self.dir) {
            let _ = dir_handle.sync_all();
        }
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vstore_core::{FileDescriptor, Vsn};

    #[test]
    fn publish_then_load_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(tmp.path());
        assert_eq!(store.load().unwrap().files.len(), 0);

        let table = MetadataTable {
            checkpoint_lsn: Some(Vsn::new(42)),
            files: vec![FileDescriptor {
                file_id: 1,
                relative_path: "0001.chk".into(),
                live_count: 10,
                total_count: 12,
                size_bytes: 4096,
            }],
        };
        store.publish(&table).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.checkpoint_lsn, Some(Vsn::new(42)));
        assert_eq!(loaded.files.len(), 1);
        assert_eq!(loaded.files[0].file_id, 1);
    }

    #[test]
    fn corrupted_metadata_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(tmp.path());
        store.publish(&MetadataTable::empty()).unwrap();
        let path = store.current_path();
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();
        assert!(store.load().is_err());
    }
}
