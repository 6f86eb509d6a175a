//! Store metadata: table geometry plus the Arrow schema
//!
//! On-disk format:
//! ```text
//! offset                    field
//! 0                         writer_count   (native-endian usize)
//! +sizeof(usize)            array_length   (native-endian usize)
//! +sizeof(usize)            capacity       (native-endian usize)
//! +sizeof(usize)            Arrow IPC schema stream (schema message + EOS)
//! ```
//!
//! The header is native-endian; the file is not portable across
//! architectures. Installation is atomic: the encoding is written to
//! `<path>.tmp` and renamed over `<path>`, so the meta file either exists in
//! full or not at all.

use std::fmt;
use std::fs;
use std::io::Cursor;
use std::mem;
use std::path::{Path, PathBuf};

use arrow::datatypes::SchemaRef;
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;

use crate::{Result, StoreError};

const HEADER_LEN: usize = 3 * mem::size_of::<usize>();

/// Immutable table geometry fixed at create time.
#[derive(Debug, Clone)]
pub struct StoreMeta {
    writer_count: usize,
    array_length: usize,
    capacity: usize,
    schema: SchemaRef,
}

impl StoreMeta {
    pub fn new(
        writer_count: usize,
        array_length: usize,
        capacity: usize,
        schema: SchemaRef,
    ) -> Self {
        Self {
            writer_count,
            array_length,
            capacity,
            schema,
        }
    }

    /// Number of producers striping each record batch.
    pub fn writer_count(&self) -> usize {
        self.writer_count
    }

    /// Rows per record batch.
    pub fn array_length(&self) -> usize {
        self.array_length
    }

    /// Number of record batches the store can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Encode the meta record.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.writer_count.to_ne_bytes());
        buf.extend_from_slice(&self.array_length.to_ne_bytes());
        buf.extend_from_slice(&self.capacity.to_ne_bytes());
        {
            let mut writer = StreamWriter::try_new(&mut buf, self.schema.as_ref())?;
            writer.finish()?;
        }
        Ok(buf)
    }

    /// Decode a meta record from bytes.
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(StoreError::BadMeta(format!(
                "header truncated: {} bytes, need {}",
                bytes.len(),
                HEADER_LEN
            )));
        }

        let word = mem::size_of::<usize>();
        let writer_count = usize::from_ne_bytes(bytes[..word].try_into().unwrap());
        let array_length = usize::from_ne_bytes(bytes[word..2 * word].try_into().unwrap());
        let capacity = usize::from_ne_bytes(bytes[2 * word..3 * word].try_into().unwrap());

        if writer_count == 0 || array_length == 0 || capacity == 0 {
            return Err(StoreError::BadMeta(format!(
                "zero dimension in header: writer_count={writer_count}, \
                 array_length={array_length}, capacity={capacity}"
            )));
        }

        let reader = StreamReader::try_new(Cursor::new(&bytes[HEADER_LEN..]), None)
            .map_err(|e| StoreError::BadMeta(format!("schema bytes: {e}")))?;
        let schema = reader.schema();

        Ok(Self {
            writer_count,
            array_length,
            capacity,
            schema,
        })
    }

    /// Write the meta record to `path`, made visible by an atomic rename.
    pub fn serialize(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        let tmp = tmp_path(path);
        fs::write(&tmp, &bytes)?;
        // Rename is the commit point: the meta file never exists half written.
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Read and decode the meta record at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::deserialize(&bytes)
    }
}

impl fmt::Display for StoreMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "writer_count: {}", self.writer_count)?;
        writeln!(f, "array_length: {}", self.array_length)?;
        writeln!(f, "capacity: {}", self.capacity)?;
        write!(f, "schema:")?;
        for field in self.schema.fields() {
            write!(f, "\n  {}: {}", field.name(), field.data_type())?;
        }
        Ok(())
    }
}

/// Staging path used while installing a file atomically.
pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}
