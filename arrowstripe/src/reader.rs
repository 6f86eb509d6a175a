//! Single-consumer scan with zero-copy Arrow views
//!
//! The reader walks the bitmap one batch at a time. For a committed batch it
//! builds a struct array whose column buffers point straight into the data
//! mapping: no bytes are copied, the buffers alias the file. The array can
//! be handed to downstream consumers over the Arrow C Data Interface stream
//! ABI via [`StripeReader::read_stream`].

use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use arrow::alloc::Allocation;
use arrow::array::{make_array, ArrayData, ArrayRef, StructArray};
use arrow::buffer::Buffer;
use arrow::datatypes::{Fields, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::ffi_stream::FFI_ArrowArrayStream;
use arrow::record_batch::{RecordBatch, RecordBatchReader};
use memmap2::Mmap;

use crate::layout::TableLayout;
use crate::meta::StoreMeta;
use crate::mmap;
use crate::{Result, StoreError};

/// Scans committed batches and exposes them without copying.
///
/// There is exactly one reader per store. The handle borrows from the
/// [`StripeStore`](crate::StripeStore); arrays it hands out additionally
/// hold the read mapping through an `Arc`, so a consumer-side buffer release
/// only drops a reference and can never free mapping memory.
pub struct StripeReader<'s> {
    meta: &'s StoreMeta,
    layout: &'s TableLayout,
    data: Arc<Mmap>,
    bitmap: Arc<Mmap>,
    fields: Fields,
    schema: SchemaRef,
    next: usize,
}

impl<'s> StripeReader<'s> {
    pub(crate) fn new(
        meta: &'s StoreMeta,
        layout: &'s TableLayout,
        data: &Arc<Mmap>,
        bitmap: &Arc<Mmap>,
    ) -> Self {
        let fields = meta.schema().fields().clone();
        let schema = Arc::new(Schema::new(fields.clone()));
        Self {
            meta,
            layout,
            data: data.clone(),
            bitmap: bitmap.clone(),
            fields,
            schema,
            next: 0,
        }
    }

    /// Index the next [`read`](Self::read) call will probe.
    pub fn index(&self) -> usize {
        self.next
    }

    /// Schema of the struct arrays this reader yields.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Scan at the current index.
    ///
    /// Returns `Some` and advances when the batch there is committed;
    /// returns `None` and leaves the cursor unchanged when it is not, so the
    /// caller may retry with its own backoff. Fails with `OutOfRange` once
    /// the cursor has moved past the last slot.
    pub fn read(&mut self) -> Result<Option<StructArray>> {
        let batch = self.read_at(self.next)?;
        if batch.is_some() {
            self.next += 1;
        }
        Ok(batch)
    }

    /// Probe an explicit index without moving the cursor.
    pub fn read_at(&self, index: usize) -> Result<Option<StructArray>> {
        if index >= self.layout.capacity() {
            return Err(StoreError::OutOfRange {
                what: "batch index",
                value: index,
                limit: self.layout.capacity(),
            });
        }
        if !self.committed(index) {
            return Ok(None);
        }
        self.build_views(index).map(Some)
    }

    /// Scan at the current index, rebinding `out` to a one-batch C stream on
    /// success. Returns whether a committed batch was exported.
    pub fn read_stream(&mut self, out: &mut FFI_ArrowArrayStream) -> Result<bool> {
        match self.read()? {
            Some(array) => {
                *out = self.export(array);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Probe an explicit index, rebinding `out` on success. Does not move
    /// the cursor.
    pub fn read_stream_at(&self, out: &mut FFI_ArrowArrayStream, index: usize) -> Result<bool> {
        match self.read_at(index)? {
            Some(array) => {
                *out = self.export(array);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// A batch is committed once every producer has set its bitmap cell.
    ///
    /// The acquire loads pair with the writers' release stores, so the data
    /// bytes of a committed batch are visible to this thread.
    fn committed(&self, index: usize) -> bool {
        let row = self.layout.bitmap_row(index);
        (0..self.meta.writer_count()).all(|p| mmap::load_acquire(&self.bitmap, row + p) == 0xFF)
    }

    fn build_views(&self, index: usize) -> Result<StructArray> {
        let rows = self.layout.array_length();
        let batch_offset = self.layout.batch_offset(index);
        let owner: Arc<dyn Allocation> = self.data.clone();

        let mut columns: Vec<ArrayRef> = Vec::with_capacity(self.fields.len());
        for (col, field) in self.fields.iter().enumerate() {
            let offset = batch_offset + self.layout.col_offset(col);
            let len = self.layout.col_array_size(col);

            // The buffer aliases the mapping. The Arc owner keeps the pages
            // mapped for as long as any exported buffer is alive; releasing
            // the buffer only drops that reference.
            let ptr = unsafe { NonNull::new_unchecked(self.data.as_ptr().add(offset) as *mut u8) };
            let buffer = unsafe { Buffer::from_custom_allocation(ptr, len, owner.clone()) };

            let data = ArrayData::builder(field.data_type().clone())
                .len(rows)
                .add_buffer(buffer)
                .build()?;
            columns.push(make_array(data));
        }

        Ok(StructArray::try_new(self.fields.clone(), columns, None)?)
    }

    fn export(&self, array: StructArray) -> FFI_ArrowArrayStream {
        let reader = SingleBatch {
            schema: self.schema.clone(),
            batch: Some(RecordBatch::from(array)),
        };
        FFI_ArrowArrayStream::new(Box::new(reader))
    }
}

impl fmt::Debug for StripeReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeReader")
            .field("next", &self.next)
            .field("capacity", &self.layout.capacity())
            .finish_non_exhaustive()
    }
}

/// One-batch stream backing the C Data Interface export.
struct SingleBatch {
    schema: SchemaRef,
    batch: Option<RecordBatch>,
}

impl Iterator for SingleBatch {
    type Item = std::result::Result<RecordBatch, ArrowError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.batch.take().map(Ok)
    }
}

impl RecordBatchReader for SingleBatch {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }
}
