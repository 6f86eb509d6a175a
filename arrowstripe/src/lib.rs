//! arrowstripe: memory-mapped columnar record batch store
//!
//! A fixed-schema table of rows is laid out column by column inside a single
//! on-disk file that is mapped into the address space of a fixed set of
//! producer threads and one reader thread. Producers copy pre-formed Arrow
//! record batches into disjoint per-producer stripes; the reader exposes
//! committed batches as Arrow struct arrays whose buffers alias the mapping
//! directly, exportable over the Arrow C Data Interface stream ABI.
//!
//! Store directory layout:
//! ```text
//! <location>/
//!   data.mmap      capacity · array_length · row_width bytes
//!                  column-major batches, concatenated
//!   bitmap.mmap    capacity · writer_count bytes
//!                  one completion byte per (batch, producer)
//!   meta.bin       geometry triple + Arrow IPC schema
//!   meta.bin.tmp   staging file, renamed into place atomically
//! ```
//!
//! Within a batch, column `c` starts at `(Σᵢ<c widthᵢ) · array_length` and
//! producer `p` owns the stripe `p · widthᶜ · (array_length / writer_count)`
//! bytes into it. A batch is committed once all `writer_count` bytes of its
//! bitmap row read `0xFF`; the bitmap store is release-ordered and the
//! reader's check is acquire-ordered, so observing the flags implies
//! observing the data.

pub mod meta;
pub mod mmap;
pub mod reader;
pub mod store;
pub mod types;
pub mod writer;

mod layout;

pub use meta::StoreMeta;
pub use mmap::MapOptions;
pub use reader::StripeReader;
pub use store::{CreateOptions, StripeStore};
pub use writer::StripeWriter;

use std::path::PathBuf;

/// Store error type
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{what} out of range: {value}, limit: {limit}")]
    OutOfRange {
        what: &'static str,
        value: usize,
        limit: usize,
    },

    #[error("Store at {0} is not ready")]
    NotReady(PathBuf),

    #[error("Batch schema does not match store schema")]
    SchemaMismatch,

    #[error("Batch has {got} rows, writer owns {expected}")]
    WrongRowCount { got: usize, expected: usize },

    #[error("Corrupt meta: {0}")]
    BadMeta(String),

    #[error("Store is full: capacity {0} batches")]
    Full(usize),
}

pub type Result<T> = std::result::Result<T, StoreError>;
