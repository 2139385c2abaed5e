//! On-disk checkpoint file layout.
//!
//! Each checkpoint file is an append-only sequence of sorted
//! `(key, vsn, kind, value)` records grouped into blocks, followed by a
//! sparse index `[(key, block_offset)]` and a footer carrying the index
//! location and a CRC-32 over the whole file body. Files are
//! self-describing: a reader only needs the file's own bytes to parse it,
//! no external schema.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};
use std::sync::Arc;
use vstore_core::error::{Error, Result};
use vstore_core::{DiskPointer, Key, KeySerializer, Kind, Value, ValueSerializer};

pub const FILE_MAGIC: u32 = 0x5653_4346; // "VSCF"
pub const FORMAT_VERSION: u16 = 1;

fn kind_tag(kind: Kind) -> u8 {
    match kind {
        Kind::Inserted => 0,
        Kind::Updated => 1,
        Kind::Deleted => 2,
    }
}

fn tag_kind(tag: u8) -> Result<Kind> {
    match tag {
        0 => Ok(Kind::Inserted),
        1 => Ok(Kind::Updated),
        2 => Ok(Kind::Deleted),
        other => Err(Error::Corruption(format!("unknown entry kind tag {other}"))),
    }
}

/// One record as written to a checkpoint file: `(key, vsn, kind, value)`.
/// `value` is `None` for tombstones (invariant I2).
pub struct RecordRef<'a> {
    pub key: &'a Key,
    pub vsn: u64,
    pub kind: Kind,
    pub value: Option<&'a Value>,
}

/// A decoded record plus the byte offset/length it occupied, so the
/// caller can build a `DiskPointer` for it.
#[derive(Debug, Clone)]
pub struct DecodedRecord {
    pub key: Key,
    pub vsn: u64,
    pub kind: Kind,
    pub value: Option<Value>,
    pub pointer: DiskPointer,
}

/// Streaming writer for a single checkpoint file. Call [`write_record`]
/// for each sorted input record, then [`finish`] to emit the sparse
/// index and footer.
///
/// Each record's key and value bytes are produced by the caller-supplied
/// [`KeySerializer`]/[`ValueSerializer`] (spec.md's pluggable codec
/// contract); everything else in the file -- the header, the sparse
/// index, vsn/kind tags and the footer -- is this format's own fixed
/// layout.
pub struct CheckpointFileWriter<W: Write> {
    out: W,
    file_id: u64,
    block_size_target: usize,
    offset: u64,
    current_block_start: u64,
    index: Vec<(Key, u64)>,
    crc: crc32fast::Hasher,
    key_ser: Arc<dyn KeySerializer>,
    value_ser: Arc<dyn ValueSerializer>,
}

impl<W: Write> CheckpointFileWriter<W> {
    pub fn new(
        mut out: W,
        file_id: u64,
        block_size_target: usize,
        key_ser: Arc<dyn KeySerializer>,
        value_ser: Arc<dyn ValueSerializer>,
    ) -> Result<Self> {
        let mut header = Vec::new();
        header.write_u32::<LittleEndian>(FILE_MAGIC)?;
        header.write_u16::<LittleEndian>(FORMAT_VERSION)?;
        header.write_u64::<LittleEndian>(file_id)?;
        header.write_u32::<LittleEndian>(block_size_target as u32)?;
        out.write_all(&header)?;
        let mut crc = crc32fast::Hasher::new();
        crc.update(&header);
        Ok(CheckpointFileWriter {
            out,
            file_id,
            block_size_target,
            offset: header.len() as u64,
            current_block_start: header.len() as u64,
            index: Vec::new(),
            crc,
            key_ser,
            value_ser,
        })
    }

    /// Writes one record, returning the `DiskPointer` it now occupies.
    /// Records must be supplied in ascending key order.
    pub fn write_record(&mut self, record: RecordRef<'_>) -> Result<DiskPointer> {
        let start = self.offset;
        let mut buf = Vec::new();
        self.key_ser.write(&mut buf, record.key);
        buf.write_u64::<LittleEndian>(record.vsn)?;
        buf.write_u8(kind_tag(record.kind))?;
        match record.value {
            Some(v) => {
                buf.write_u8(1)?;
                self.value_ser.write(&mut buf, v);
            }
            None => {
                buf.write_u8(0)?;
            }
        }

        if self.offset - self.current_block_start >= self.block_size_target as u64
            || self.index.is_empty()
        {
            self.index.push((record.key.clone(), start));
            self.current_block_start = start;
        }

        self.out.write_all(&buf)?;
        self.crc.update(&buf);
        self.offset += buf.len() as u64;

        Ok(DiskPointer { file_id: self.file_id, offset: start, length: buf.len() as u32 })
    }

    /// Flushes the sparse index and footer, consuming the writer.
    /// Returns the underlying writer (so callers can `sync_all` a file).
    pub fn finish(mut self) -> Result<W> {
        let index_offset = self.offset;
        let mut index_buf = Vec::new();
        index_buf.write_u32::<LittleEndian>(self.index.len() as u32)?;
        for (key, block_offset) in &self.index {
            index_buf.write_u32::<LittleEndian>(key.as_slice().len() as u32)?;
            index_buf.extend_from_slice(key.as_slice());
            index_buf.write_u64::<LittleEndian>(*block_offset)?;
        }
        self.out.write_all(&index_buf)?;
        self.crc.update(&index_buf);
        let index_size = index_buf.len() as u64;

        let mut footer = Vec::new();
        footer.write_u64::<LittleEndian>(index_offset)?;
        footer.write_u64::<LittleEndian>(index_size)?;
        footer.write_u32::<LittleEndian>(self.crc.clone().finalize())?;
        self.out.write_all(&footer)?;
        self.out.flush()?;
        Ok(self.out)
    }
}

/// A fully-parsed checkpoint file: header info, the sparse index, and
/// the raw bytes (kept resident so record reads are just a slice copy;
/// callers that want to avoid holding the whole file in memory should
/// use [`read_record_at`] against a file handle instead).
pub struct CheckpointFile {
    pub file_id: u64,
    pub index: Vec<(Key, u64)>,
    index_offset: usize,
    bytes: Vec<u8>,
    key_ser: Arc<dyn KeySerializer>,
    value_ser: Arc<dyn ValueSerializer>,
}

impl CheckpointFile {
    /// Parses and CRC-validates a whole checkpoint file from `bytes`,
    /// decoding records with the supplied key/value codecs.
    pub fn parse(
        bytes: Vec<u8>,
        key_ser: Arc<dyn KeySerializer>,
        value_ser: Arc<dyn ValueSerializer>,
    ) -> Result<Self> {
        if bytes.len() < 4 + 2 + 8 + 4 + 8 + 8 + 4 {
            return Err(Error::Corruption("checkpoint file too small".into()));
        }
        let footer_len = 8 + 8 + 4;
        let footer_start = bytes.len() - footer_len;
        let mut footer = Cursor::new(&bytes[footer_start..]);
        let index_offset = footer.read_u64::<LittleEndian>()?;
        let index_size = footer.read_u64::<LittleEndian>()?;
        let stored_crc = footer.read_u32::<LittleEndian>()?;

        let body_end = index_offset as usize + index_size as usize;
        if body_end != footer_start {
            return Err(Error::Corruption("checkpoint footer offsets inconsistent".into()));
        }
        let mut crc = crc32fast::Hasher::new();
        crc.update(&bytes[..footer_start]);
        if crc.finalize() != stored_crc {
            return Err(Error::Corruption("checkpoint file CRC mismatch".into()));
        }

        let mut header = Cursor::new(&bytes[..]);
        let magic = header.read_u32::<LittleEndian>()?;
        if magic != FILE_MAGIC {
            return Err(Error::Corruption("checkpoint file bad magic".into()));
        }
        let version = header.read_u16::<LittleEndian>()?;
        if version > FORMAT_VERSION {
            return Err(Error::Corruption(format!(
                "checkpoint file format version {version} newer than supported {FORMAT_VERSION}"
            )));
        }
        let file_id = header.read_u64::<LittleEndian>()?;
        let _block_size = header.read_u32::<LittleEndian>()?;

        let mut index_cursor = Cursor::new(&bytes[index_offset as usize..footer_start]);
        let count = index_cursor.read_u32::<LittleEndian>()?;
        let mut index = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let klen = index_cursor.read_u32::<LittleEndian>()? as usize;
            let mut kbuf = vec![0u8; klen];
            index_cursor.read_exact(&mut kbuf)?;
            let block_offset = index_cursor.read_u64::<LittleEndian>()?;
            index.push((Key::from_bytes(kbuf), block_offset));
        }

        Ok(CheckpointFile {
            file_id,
            index,
            index_offset: index_offset as usize,
            bytes,
            key_ser,
            value_ser,
        })
    }

    /// Reads every record in the file, in ascending key order, with
    /// the `DiskPointer` each one occupies.
    pub fn iter_records(&self) -> Result<Vec<DecodedRecord>> {
        let mut out = Vec::new();
        let mut pos = header_len();
        while pos < self.index_offset {
            let (record, consumed) = self.decode_record_at(pos)?;
            pos += consumed;
            out.push(record);
        }
        Ok(out)
    }

    fn decode_record_at(&self, offset: usize) -> Result<(DecodedRecord, usize)> {
        let body = &self.bytes[offset..];
        let (key, key_bytes) = self.key_ser.read(body)?;
        let mut cursor = Cursor::new(&body[key_bytes..]);
        let vsn = cursor.read_u64::<LittleEndian>()?;
        let kind = tag_kind(cursor.read_u8()?)?;
        let present = cursor.read_u8()?;
        let after_tag = key_bytes + 8 + 1 + 1;
        let (value, value_bytes) = if present == 0 {
            (None, 0usize)
        } else {
            let (value, consumed) = self.value_ser.read(&self.bytes[offset + after_tag..])?;
            (Some(value), consumed)
        };
        let consumed = after_tag + value_bytes;
        let pointer = DiskPointer { file_id: self.file_id, offset: offset as u64, length: consumed as u32 };
        Ok((DecodedRecord { key, vsn, kind, value, pointer }, consumed))
    }

    /// Reads a single record given its `DiskPointer` -- the hot path
    /// used by the checkpoint file reader pool to satisfy
    /// a value-load request without decoding the whole file.
    pub fn read_at(&self, pointer: DiskPointer) -> Result<DecodedRecord> {
        if pointer.file_id != self.file_id {
            return Err(Error::InvalidState(format!(
                "pointer file_id {} does not match file {}",
                pointer.file_id, self.file_id
            )));
        }
        let (record, _) = self.decode_record_at(pointer.offset as usize)?;
        Ok(record)
    }
}

fn header_len() -> usize {
    4 + 2 + 8 + 4
}

/// Reads a checkpoint file fully into memory from a `Read` source,
/// validating it on the way in.
pub fn read_checkpoint_file(
    mut r: impl Read,
    key_ser: Arc<dyn KeySerializer>,
    value_ser: Arc<dyn ValueSerializer>,
) -> Result<CheckpointFile> {
    let mut bytes = Vec::new();
    r.read_to_end(&mut bytes).map_err(Error::from)?;
    CheckpointFile::parse(bytes, key_ser, value_ser)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vstore_core::{RawKeySerializer, RawValueSerializer, Vsn};

    fn rec(key: &str, vsn: u64, value: Option<&str>) -> (Key, u64, Kind, Option<Value>) {
        let kind = if value.is_some() { Kind::Inserted } else { Kind::Deleted };
        (Key::from(key), vsn, kind, value.map(Value::from))
    }

    fn serializers() -> (Arc<dyn KeySerializer>, Arc<dyn ValueSerializer>) {
        (Arc::new(RawKeySerializer), Arc::new(RawValueSerializer))
    }

    #[test]
    fn round_trips_sorted_records() {
        let records = vec![
            rec("k1", 1, Some("v1")),
            rec("k2", 2, Some("v2")),
            rec("k3", 3, None),
        ];
        let (key_ser, value_ser) = serializers();
        let mut writer = CheckpointFileWriter::new(Vec::new(), 7, 8, key_ser.clone(), value_ser.clone()).unwrap();
        let mut pointers = Vec::new();
        for (k, vsn, kind, v) in &records {
            let p = writer
                .write_record(RecordRef { key: k, vsn: *vsn, kind: *kind, value: v.as_ref() })
                .unwrap();
            pointers.push(p);
        }
        let bytes = writer.finish().unwrap();

        let file = CheckpointFile::parse(bytes, key_ser, value_ser).unwrap();
        assert_eq!(file.file_id, 7);
        let decoded = file.iter_records().unwrap();
        assert_eq!(decoded.len(), 3);
        for (i, d) in decoded.iter().enumerate() {
            assert_eq!(d.key, records[i].0);
            assert_eq!(d.vsn, records[i].1);
            assert_eq!(d.kind, records[i].2);
            assert_eq!(d.value, records[i].3);
        }

        let direct = file.read_at(pointers[1]).unwrap();
        assert_eq!(direct.key, records[1].0);
        assert_eq!(direct.vsn, Vsn::new(2).get());
    }

    #[test]
    fn corrupted_crc_is_rejected() {
        let (key_ser, value_ser) = serializers();
        let mut writer = CheckpointFileWriter::new(Vec::new(), 1, 64, key_ser.clone(), value_ser.clone()).unwrap();
        writer
            .write_record(RecordRef {
                key: &Key::from("k"),
                vsn: 1,
                kind: Kind::Inserted,
                value: Some(&Value::from("v")),
            })
            .unwrap();
        let mut bytes = writer.finish().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(CheckpointFile::parse(bytes, key_ser, value_ser).is_err());
    }
}
