//! Per-producer ingestion handle

use std::fmt;

use arrow::array::Array;
use arrow::record_batch::RecordBatch;

use crate::layout::TableLayout;
use crate::meta::StoreMeta;
use crate::mmap::WriteMap;
use crate::{Result, StoreError};

/// Writes one producer's stripe of each record batch.
///
/// A writer borrows its views from the [`StripeStore`](crate::StripeStore)
/// and cannot outlive it. At most one thread may drive a given producer id;
/// writers with distinct ids never touch the same bytes and need no
/// synchronization among themselves.
pub struct StripeWriter<'s> {
    id: usize,
    meta: &'s StoreMeta,
    layout: &'s TableLayout,
    data: &'s WriteMap,
    bitmap: &'s WriteMap,
    owned_rows: usize,
    next: usize,
}

impl<'s> StripeWriter<'s> {
    pub(crate) fn new(
        id: usize,
        meta: &'s StoreMeta,
        layout: &'s TableLayout,
        data: &'s WriteMap,
        bitmap: &'s WriteMap,
    ) -> Self {
        Self {
            id,
            meta,
            layout,
            data,
            bitmap,
            owned_rows: layout.stripe_rows(id),
            next: 0,
        }
    }

    /// Producer id of this writer.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Rows this writer contributes to each batch.
    pub fn owned_rows(&self) -> usize {
        self.owned_rows
    }

    /// Index the next [`write`](Self::write) call will fill.
    pub fn next_index(&self) -> usize {
        self.next
    }

    /// Append `batch` at this writer's next index and return the index
    /// written.
    pub fn write(&mut self, batch: &RecordBatch) -> Result<usize> {
        if self.next >= self.layout.capacity() {
            return Err(StoreError::Full(self.layout.capacity()));
        }
        let index = self.next;
        self.write_at(batch, index)?;
        self.next += 1;
        Ok(index)
    }

    /// Write `batch` at an explicit index, overwriting any previous stripe
    /// contents there. Does not move the append cursor.
    pub fn write_at(&mut self, batch: &RecordBatch, index: usize) -> Result<()> {
        if index >= self.layout.capacity() {
            return Err(StoreError::OutOfRange {
                what: "batch index",
                value: index,
                limit: self.layout.capacity(),
            });
        }
        if batch.schema().as_ref() != self.meta.schema().as_ref() {
            return Err(StoreError::SchemaMismatch);
        }
        if batch.num_rows() != self.owned_rows {
            return Err(StoreError::WrongRowCount {
                got: batch.num_rows(),
                expected: self.owned_rows,
            });
        }

        let batch_offset = self.layout.batch_offset(index);
        for col in 0..self.layout.columns() {
            let width = self.layout.col_width(col);
            let stripe_len = width * self.owned_rows;
            let dst = batch_offset + self.layout.stripe_offset(col, self.id);

            let values = batch.column(col).to_data();
            let start = values.offset() * width;
            let src = &values.buffers()[0].as_slice()[start..start + stripe_len];

            // Stripes of distinct producers are disjoint by construction,
            // and this producer id has a single driving thread.
            unsafe { self.data.write_bytes(dst, src) };
        }

        // Publishes the stripe bytes: a reader that observes this cell as
        // 0xFF also observes the column data stored above.
        self.bitmap
            .store_release(self.layout.bitmap_row(index) + self.id, 0xFF);
        Ok(())
    }
}

impl fmt::Debug for StripeWriter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeWriter")
            .field("id", &self.id)
            .field("owned_rows", &self.owned_rows)
            .field("next", &self.next)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CreateOptions, StripeStore};
    use arrow::array::{ArrayRef, Int32Array, Int64Array};
    use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn two_col_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int32, false),
            Field::new("age", DataType::Int32, false),
        ]))
    }

    fn batch(schema: &SchemaRef, ids: Vec<i32>, ages: Vec<i32>) -> RecordBatch {
        RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int32Array::from(ids)) as ArrayRef,
                Arc::new(Int32Array::from(ages)) as ArrayRef,
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_owned_rows() {
        let dir = tempdir().unwrap();
        let store = StripeStore::create(
            dir.path(),
            4,
            16,
            1,
            two_col_schema(),
            CreateOptions::default(),
        )
        .unwrap();

        for id in 0..4 {
            assert_eq!(store.writer(id).unwrap().owned_rows(), 4);
        }
    }

    #[test]
    fn test_append_advances_and_fills_up() {
        let dir = tempdir().unwrap();
        let schema = two_col_schema();
        let store =
            StripeStore::create(dir.path(), 1, 2, 3, schema.clone(), CreateOptions::default())
                .unwrap();

        let mut writer = store.writer(0).unwrap();
        let b = batch(&schema, vec![1, 2], vec![10, 20]);

        assert_eq!(writer.write(&b).unwrap(), 0);
        assert_eq!(writer.write(&b).unwrap(), 1);
        assert_eq!(writer.write(&b).unwrap(), 2);
        assert_eq!(writer.next_index(), 3);

        let err = writer.write(&b).unwrap_err();
        assert!(matches!(err, StoreError::Full(3)));
    }

    #[test]
    fn test_write_at_out_of_range() {
        let dir = tempdir().unwrap();
        let schema = two_col_schema();
        let store =
            StripeStore::create(dir.path(), 1, 2, 3, schema.clone(), CreateOptions::default())
                .unwrap();

        let mut writer = store.writer(0).unwrap();
        let b = batch(&schema, vec![1, 2], vec![10, 20]);

        let err = writer.write_at(&b, 3).unwrap_err();
        assert!(matches!(err, StoreError::OutOfRange { value: 3, .. }));
    }

    #[test]
    fn test_schema_mismatch() {
        let dir = tempdir().unwrap();
        let store = StripeStore::create(
            dir.path(),
            1,
            2,
            1,
            two_col_schema(),
            CreateOptions::default(),
        )
        .unwrap();

        // same field names, wider type
        let other = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("age", DataType::Int64, false),
        ]));
        let b = RecordBatch::try_new(
            other,
            vec![
                Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef,
                Arc::new(Int64Array::from(vec![10, 20])) as ArrayRef,
            ],
        )
        .unwrap();

        let mut writer = store.writer(0).unwrap();
        let err = writer.write(&b).unwrap_err();
        assert!(matches!(err, StoreError::SchemaMismatch));
    }

    #[test]
    fn test_wrong_row_count() {
        let dir = tempdir().unwrap();
        let schema = two_col_schema();
        let store =
            StripeStore::create(dir.path(), 2, 4, 1, schema.clone(), CreateOptions::default())
                .unwrap();

        // writer owns 2 rows, batch has 3
        let b = batch(&schema, vec![1, 2, 3], vec![10, 20, 30]);
        let mut writer = store.writer(0).unwrap();
        let err = writer.write(&b).unwrap_err();
        assert!(matches!(
            err,
            StoreError::WrongRowCount { got: 3, expected: 2 }
        ));
    }

    #[test]
    fn test_stripes_land_at_computed_offsets() {
        let dir = tempdir().unwrap();
        let schema = two_col_schema();
        let store =
            StripeStore::create(dir.path(), 2, 4, 1, schema.clone(), CreateOptions::default())
                .unwrap();

        store
            .writer(0)
            .unwrap()
            .write(&batch(&schema, vec![1, 2], vec![21, 22]))
            .unwrap();
        store
            .writer(1)
            .unwrap()
            .write(&batch(&schema, vec![3, 4], vec![23, 24]))
            .unwrap();

        // data.mmap holds column id then column age, each striped in halves
        let raw = std::fs::read(dir.path().join("data.mmap")).unwrap();
        let expect: Vec<i32> = vec![1, 2, 3, 4, 21, 22, 23, 24];
        let got: Vec<i32> = raw
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(got, expect);

        let bitmap = std::fs::read(dir.path().join("bitmap.mmap")).unwrap();
        assert_eq!(bitmap, vec![0xFF, 0xFF]);
    }

    #[test]
    fn test_sliced_batch_column_is_copied_correctly() {
        let dir = tempdir().unwrap();
        let schema = two_col_schema();
        let store =
            StripeStore::create(dir.path(), 1, 2, 1, schema.clone(), CreateOptions::default())
                .unwrap();

        // a batch sliced out of a larger one has a non-zero array offset
        let big = batch(&schema, vec![9, 1, 2, 9], vec![9, 10, 20, 9]);
        let sliced = big.slice(1, 2);

        store.writer(0).unwrap().write(&sliced).unwrap();

        let raw = std::fs::read(dir.path().join("data.mmap")).unwrap();
        let got: Vec<i32> = raw
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(got, vec![1, 2, 10, 20]);
    }
}
