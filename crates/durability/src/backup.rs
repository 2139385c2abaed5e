//! Backup and restore: a backup is the metadata file plus
//! the referenced checkpoint files copied to a target directory, bundled
//! as a zstd-compressed tar archive; restore reverses this.

use crate::metadata_store::MetadataStore;
use std::io::Read;
use std::path::Path;
use vstore_core::error::Result;

const META_ENTRY_NAME: &str = "checkpoint.meta";

/// Writes a backup bundle of `store_dir`'s current metadata table and
/// every file it references to `dest` (a single `.tar.zst` file).
pub fn backup_to(store_dir: &Path, dest: &Path) -> Result<()> {
    let meta_store = MetadataStore::new(store_dir);
    let table = meta_store.load()?;

    let file = std::fs::File::create(dest)?;
    let encoder = zstd::Encoder::new(file, 0)?;
    let mut builder = tar::Builder::new(encoder);

    let meta_path = store_dir.join(META_ENTRY_NAME);
    builder.append_path_with_name(&meta_path, META_ENTRY_NAME)?;

    for descriptor in &table.files {
        let path = store_dir.join(&descriptor.relative_path);
        builder.append_path_with_name(&path, &descriptor.relative_path)?;
    }

    let encoder = builder.into_inner()?;
    encoder.finish()?;
    Ok(())
}

/// Restores a backup bundle created by [`backup_to`] into `store_dir`,
/// which must be empty or non-existent. Does not itself invoke recovery;
/// callers should open the store at `store_dir` afterwards, which runs
/// recovery, exercising the same copy-bootstrap path as a streamed copy.
pub fn restore_from(bundle: &Path, store_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(store_dir)?;
    let file = std::fs::File::open(bundle)?;
    let decoder = zstd::Decoder::new(file)?;
    let mut archive = tar::Archive::new(decoder);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        let dest_path = store_dir.join(&path);
        if let Some(parent) = dest_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf)?;
        std::fs::write(&dest_path, &buf)?;
    }
    Ok(())
}
