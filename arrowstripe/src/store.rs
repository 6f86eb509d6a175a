//! Store lifecycle: a directory of data, bitmap and meta files
//!
//! A store directory is created in three steps: the data file, the bitmap
//! file, then the meta file installed by atomic rename. The meta file is the
//! ready marker; a directory without it is not a store, whatever else it
//! contains. A failed create removes whatever it managed to put on disk.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use arrow::datatypes::SchemaRef;

use crate::layout::TableLayout;
use crate::meta::{self, StoreMeta};
use crate::mmap::{MapOptions, MmapFile};
use crate::reader::StripeReader;
use crate::types;
use crate::writer::StripeWriter;
use crate::{Result, StoreError};

pub const DATA_FILE: &str = "data.mmap";
pub const BITMAP_FILE: &str = "bitmap.mmap";
pub const META_FILE: &str = "meta.bin";

/// Create-time configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateOptions {
    /// Mapping flags for the views established later.
    pub map: MapOptions,
    /// Byte used to prefill `data.mmap`. The bitmap is always zeroed.
    pub fill_with: u8,
}

/// A memory-mapped columnar record batch store.
///
/// The store owns the mappings; [`StripeWriter`] and [`StripeReader`]
/// handles borrow from it and cannot outlive it. Dropping the store unmaps
/// and closes everything; the files persist on disk until removed
/// externally.
pub struct StripeStore {
    location: PathBuf,
    meta: StoreMeta,
    layout: TableLayout,
    data: MmapFile,
    bitmap: MmapFile,
}

impl fmt::Debug for StripeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeStore")
            .field("location", &self.location)
            .field("writer_count", &self.meta.writer_count())
            .field("array_length", &self.meta.array_length())
            .field("capacity", &self.meta.capacity())
            .finish_non_exhaustive()
    }
}

fn data_file(location: &Path) -> PathBuf {
    location.join(DATA_FILE)
}

fn bitmap_file(location: &Path) -> PathBuf {
    location.join(BITMAP_FILE)
}

fn meta_file(location: &Path) -> PathBuf {
    location.join(META_FILE)
}

impl StripeStore {
    /// Create a store under `location`.
    ///
    /// The geometry is immutable afterwards: `writer_count` producers each
    /// own `array_length / writer_count` rows of every batch, and the store
    /// holds up to `capacity` batches.
    pub fn create(
        location: &Path,
        writer_count: usize,
        array_length: usize,
        capacity: usize,
        schema: SchemaRef,
        options: CreateOptions,
    ) -> Result<Self> {
        if writer_count == 0 {
            return Err(StoreError::InvalidArgument(
                "writer_count must be positive".into(),
            ));
        }
        if array_length == 0 {
            return Err(StoreError::InvalidArgument(
                "array_length must be positive".into(),
            ));
        }
        if capacity == 0 {
            return Err(StoreError::InvalidArgument(
                "capacity must be positive".into(),
            ));
        }
        if schema.fields().is_empty() {
            return Err(StoreError::InvalidArgument(
                "schema must have at least one field".into(),
            ));
        }
        if writer_count > array_length {
            return Err(StoreError::InvalidArgument(format!(
                "writer_count {writer_count} exceeds array_length {array_length}"
            )));
        }
        if array_length % writer_count != 0 {
            return Err(StoreError::InvalidArgument(format!(
                "array_length {array_length} is not divisible by writer_count {writer_count}"
            )));
        }
        for field in schema.fields() {
            types::c_data_format(field.data_type())?;
        }

        let meta = StoreMeta::new(writer_count, array_length, capacity, schema);
        let layout = TableLayout::new(&meta)?;

        match Self::create_files(location, &meta, &layout, options) {
            Ok((data, bitmap)) => {
                log::debug!(
                    "created store at {} ({} batches of {} rows, {} writers)",
                    location.display(),
                    capacity,
                    array_length,
                    writer_count
                );
                Ok(Self {
                    location: location.to_path_buf(),
                    meta,
                    layout,
                    data,
                    bitmap,
                })
            }
            Err(err) => {
                // a failed create never leaves partial files behind
                let _ = fs::remove_file(data_file(location));
                let _ = fs::remove_file(bitmap_file(location));
                let _ = fs::remove_file(meta::tmp_path(&meta_file(location)));
                Err(err)
            }
        }
    }

    fn create_files(
        location: &Path,
        meta: &StoreMeta,
        layout: &TableLayout,
        options: CreateOptions,
    ) -> Result<(MmapFile, MmapFile)> {
        let data = MmapFile::create(
            &data_file(location),
            layout.data_len(),
            options.fill_with,
            options.map,
        )?;
        let bitmap = MmapFile::create(&bitmap_file(location), layout.bitmap_len(), 0x00, options.map)?;
        // installed last and atomically: once meta.bin exists, the store is ready
        meta.serialize(&meta_file(location))?;
        Ok((data, bitmap))
    }

    /// Open the store at `location` without modifying any file contents.
    pub fn open(location: &Path, options: MapOptions) -> Result<Self> {
        if !Self::ready(location) {
            return Err(StoreError::NotReady(location.to_path_buf()));
        }

        let meta = StoreMeta::load(&meta_file(location))?;
        let layout = TableLayout::new(&meta)?;
        let data = MmapFile::open(&data_file(location), options)?;
        let bitmap = MmapFile::open(&bitmap_file(location), options)?;

        log::debug!("opened store at {}", location.display());

        Ok(Self {
            location: location.to_path_buf(),
            meta,
            layout,
            data,
            bitmap,
        })
    }

    /// Whether the store at `location` is ready to open.
    pub fn ready(location: &Path) -> bool {
        meta_file(location).exists()
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn meta(&self) -> &StoreMeta {
        &self.meta
    }

    /// Ingestion handle for producer `id`.
    ///
    /// Handles are cheap to construct; the caller keeps one per producer
    /// thread for the thread's lifetime.
    pub fn writer(&self, id: usize) -> Result<StripeWriter<'_>> {
        if id >= self.meta.writer_count() {
            return Err(StoreError::OutOfRange {
                what: "writer id",
                value: id,
                limit: self.meta.writer_count(),
            });
        }
        let data = self.data.write_view()?;
        let bitmap = self.bitmap.write_view()?;
        Ok(StripeWriter::new(id, &self.meta, &self.layout, data, bitmap))
    }

    /// The store's single consumer handle.
    pub fn reader(&self) -> Result<StripeReader<'_>> {
        let data = self.data.read_view()?;
        let bitmap = self.bitmap.read_view()?;
        Ok(StripeReader::new(&self.meta, &self.layout, data, bitmap))
    }
}
