//! Offset arithmetic for the striped columnar layout
//!
//! Everything a writer or reader needs to address the data and bitmap files
//! is derived once from the store meta:
//!
//! ```text
//! data.mmap, batch b at b·W·L:
//! ┌──────────── column 0 ────────────┬── column 1 ──┬ ...
//! │ stripe p=0 │ stripe p=1 │  ...   │              │
//! └──────────────────────────────────┴──────────────┴ ...
//!   w₀·(L/P)     column c starts at (Σᵢ<c wᵢ)·L
//!
//! bitmap.mmap: C rows of P bytes, cell (b, p) at b·P + p
//! ```

use crate::meta::StoreMeta;
use crate::types;
use crate::{Result, StoreError};

#[derive(Debug, Clone)]
pub(crate) struct TableLayout {
    writer_count: usize,
    array_length: usize,
    capacity: usize,
    row_width: usize,
    col_widths: Vec<usize>,
    col_offsets: Vec<usize>,
    col_array_sizes: Vec<usize>,
    batch_size: usize,
}

impl TableLayout {
    pub fn new(meta: &StoreMeta) -> Result<Self> {
        let fields = meta.schema().fields();
        let mut col_widths = Vec::with_capacity(fields.len());
        for field in fields {
            let width = types::fixed_byte_width(field.data_type()).ok_or_else(|| {
                StoreError::InvalidArgument(format!(
                    "field {} has no fixed byte width: {}",
                    field.name(),
                    field.data_type()
                ))
            })?;
            col_widths.push(width);
        }

        let array_length = meta.array_length();
        let mut col_offsets = Vec::with_capacity(col_widths.len());
        let mut row_width = 0usize;
        for &width in &col_widths {
            col_offsets.push(row_width * array_length);
            row_width += width;
        }
        let col_array_sizes = col_widths.iter().map(|w| w * array_length).collect();

        Ok(Self {
            writer_count: meta.writer_count(),
            array_length,
            capacity: meta.capacity(),
            row_width,
            col_widths,
            col_offsets,
            col_array_sizes,
            batch_size: row_width * array_length,
        })
    }

    pub fn writer_count(&self) -> usize {
        self.writer_count
    }

    pub fn array_length(&self) -> usize {
        self.array_length
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn columns(&self) -> usize {
        self.col_widths.len()
    }

    pub fn row_width(&self) -> usize {
        self.row_width
    }

    /// Bytes per record batch: `row_width · array_length`.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Required length of `data.mmap`.
    pub fn data_len(&self) -> usize {
        self.capacity * self.batch_size
    }

    /// Required length of `bitmap.mmap`.
    pub fn bitmap_len(&self) -> usize {
        self.capacity * self.writer_count
    }

    pub fn col_width(&self, col: usize) -> usize {
        self.col_widths[col]
    }

    /// Offset of column `col` from the start of a batch.
    pub fn col_offset(&self, col: usize) -> usize {
        self.col_offsets[col]
    }

    /// Full column size within one batch: `width · array_length`.
    pub fn col_array_size(&self, col: usize) -> usize {
        self.col_array_sizes[col]
    }

    /// Offset of batch `index` from the start of the data file.
    pub fn batch_offset(&self, index: usize) -> usize {
        index * self.batch_size
    }

    /// Offset of batch `index`'s bitmap row from the start of the bitmap file.
    pub fn bitmap_row(&self, index: usize) -> usize {
        index * self.writer_count
    }

    /// Rows owned by producer `id` within each batch.
    ///
    /// The divisibility invariant makes every producer own `L/P` rows; the
    /// general form for the last producer is kept so the layout stays valid
    /// if that invariant is ever relaxed.
    pub fn stripe_rows(&self, id: usize) -> usize {
        let base = self.array_length / self.writer_count;
        if id < self.writer_count - 1 {
            base
        } else {
            self.array_length - base * (self.writer_count - 1)
        }
    }

    /// Bytes of one producer stripe of column `col`.
    pub fn stripe_size(&self, col: usize) -> usize {
        self.col_widths[col] * (self.array_length / self.writer_count)
    }

    /// Offset of producer `id`'s stripe of column `col` from the start of a
    /// batch.
    pub fn stripe_offset(&self, col: usize, id: usize) -> usize {
        self.col_offsets[col] + id * self.stripe_size(col)
    }
}
