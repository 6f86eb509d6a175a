//! File-backed memory mappings with separate read and write views

use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use memmap2::{Advice, Mmap, MmapMut, MmapOptions};
use once_cell::sync::OnceCell;

use crate::{Result, StoreError};

/// Mapping flags applied when views are established.
///
/// The underlying mappings are always `MAP_SHARED`; these options only add
/// pre-faulting and paging hints on top.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapOptions {
    /// Pre-fault pages of the read view (`MAP_POPULATE`). Linux only.
    pub populate_read: bool,
    /// Pre-fault pages of the write view (`MAP_POPULATE`). Linux only.
    pub populate_write: bool,
    /// `madvise` hint applied once after each view is mapped.
    pub advice: Option<Advice>,
}

/// A single mapped file.
///
/// The handle exclusively owns the file descriptor and any established
/// address ranges; both views are unmapped when the handle is dropped. Views
/// are borrows bounded by the handle, except that the read view is
/// additionally `Arc`ed so exported Arrow buffers can hold the mapping alive
/// on their own.
pub struct MmapFile {
    path: PathBuf,
    file: File,
    len: usize,
    options: MapOptions,
    read_view: OnceCell<Arc<Mmap>>,
    write_view: OnceCell<WriteMap>,
}

impl MmapFile {
    /// Create a file of `len` bytes and prefill it with `fill_with`.
    ///
    /// The parent directory is created if missing; an existing file at
    /// `path` is truncated.
    pub fn create(path: &Path, len: usize, fill_with: u8, options: MapOptions) -> Result<Self> {
        if len == 0 {
            return Err(StoreError::InvalidArgument(format!(
                "cannot create zero-length mapping: {}",
                path.display()
            )));
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(len as u64)?;

        // set_len on a truncated file already zero-fills; only touch the
        // pages for a non-zero pattern.
        if fill_with != 0 {
            let mut map = unsafe { MmapOptions::new().map_mut(&file)? };
            map.fill(fill_with);
            map.flush()?;
        }

        log::debug!("created mapping {} ({} bytes)", path.display(), len);

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
            options,
            read_view: OnceCell::new(),
            write_view: OnceCell::new(),
        })
    }

    /// Open an existing file; the length comes from file metadata.
    pub fn open(path: &Path, options: MapOptions) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len() as usize;
        if len == 0 {
            return Err(StoreError::InvalidArgument(format!(
                "mapped file {} is empty",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
            options,
            read_view: OnceCell::new(),
            write_view: OnceCell::new(),
        })
    }

    /// Length of the mapped file in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Shared read-only view, established on first use.
    pub fn read_view(&self) -> Result<&Arc<Mmap>> {
        self.read_view.get_or_try_init(|| {
            #[cfg(target_os = "linux")]
            let map = unsafe {
                let mut opts = MmapOptions::new();
                if self.options.populate_read {
                    opts.populate();
                }
                opts.map(&self.file)?
            };
            #[cfg(not(target_os = "linux"))]
            let map = unsafe { Mmap::map(&self.file)? };

            if let Some(advice) = self.options.advice {
                map.advise(advice)?;
            }
            Ok(Arc::new(map))
        })
    }

    /// Shared writable view, established on first use.
    pub fn write_view(&self) -> Result<&WriteMap> {
        self.write_view.get_or_try_init(|| {
            #[cfg(target_os = "linux")]
            let map = unsafe {
                let mut opts = MmapOptions::new();
                if self.options.populate_write {
                    opts.populate();
                }
                opts.map_mut(&self.file)?
            };
            #[cfg(not(target_os = "linux"))]
            let map = unsafe { MmapMut::map_mut(&self.file)? };

            if let Some(advice) = self.options.advice {
                map.advise(advice)?;
            }
            Ok(WriteMap::new(map))
        })
    }
}

impl fmt::Debug for MmapFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MmapFile")
            .field("path", &self.path)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

/// Shared writable view of a mapping.
///
/// Multiple producer threads hold `&WriteMap` and copy into ranges they have
/// exclusive ownership of; disjointness of those ranges is the caller's
/// invariant, not checked here.
pub struct WriteMap {
    ptr: *mut u8,
    len: usize,
    _map: MmapMut,
}

// The raw pointer aliases mapping memory that callers partition into
// disjoint ranges; cross-thread publication goes through store_release.
unsafe impl Send for WriteMap {}
unsafe impl Sync for WriteMap {}

impl WriteMap {
    fn new(mut map: MmapMut) -> Self {
        let ptr = map.as_mut_ptr();
        let len = map.len();
        Self {
            ptr,
            len,
            _map: map,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy `src` into the mapping at `offset`.
    ///
    /// # Safety
    ///
    /// `offset..offset + src.len()` must be in bounds, and no other thread
    /// may concurrently write the same range.
    pub unsafe fn write_bytes(&self, offset: usize, src: &[u8]) {
        debug_assert!(offset + src.len() <= self.len);
        ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.add(offset), src.len());
    }

    /// Store one byte at `offset` with release ordering, publishing every
    /// write this thread made to the mapping before the call.
    pub fn store_release(&self, offset: usize, value: u8) {
        debug_assert!(offset < self.len);
        // Single-byte cells are always aligned; each cell has one writer.
        let cell = unsafe { &*(self.ptr.add(offset) as *const AtomicU8) };
        cell.store(value, Ordering::Release);
    }
}

/// Load one byte from a read view with acquire ordering, pairing with
/// [`WriteMap::store_release`].
pub(crate) fn load_acquire(map: &Mmap, offset: usize) -> u8 {
    debug_assert!(offset < map.len());
    let cell = unsafe { &*(map.as_ptr().add(offset) as *const AtomicU8) };
    cell.load(Ordering::Acquire)
}
