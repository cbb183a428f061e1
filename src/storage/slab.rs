//! # Slab: One Memory-Mapped Page File
//!
//! A `Slab` owns the memory mapping for exactly one page file. Page files
//! have a fixed size chosen at log creation, so a slab never grows or
//! remaps; its mapping stays valid for the slab's whole lifetime.
//!
//! ## Shared-Write Access
//!
//! Unlike a pager that hands out `&mut [u8]` under exclusive borrows, the
//! log engine writes and reads a page concurrently: the single writer
//! appends at the cursor while readers copy already-published regions and
//! the preloader touch-reads the whole extent. The slab therefore maps the
//! file with [`memmap2::MmapRaw`], whose raw-pointer access is shared by
//! design, and exposes narrow, bounds-checked read/write entry points. The
//! publication protocol that makes the concurrency sound lives one level up
//! in [`crate::storage::page::Page`]: payload bytes are written before the
//! cursor word is released, and readers never touch bytes past the cursor
//! they observed.
//!
//! ## In-File Layout
//!
//! ```text
//! Offset 0:                 Page header (32 bytes)
//!   0..4                    Published write cursor (u32 LE, atomic)
//!   4..8                    Full flag (u32 LE, atomic, 0 or 1)
//!   8..32                   Reserved
//! Offset 32:                Data region (page_size - 32 bytes)
//! ```
//!
//! The cursor lives inside the mapping rather than in process memory so a
//! reader process mapping the same file observes writer progress.
//!
//! ## Error Handling
//!
//! All fallible operations return `eyre::Result` with the file path and
//! operation wrapped in. A short or oversized existing file is rejected at
//! open time; the engine never maps a file whose size differs from the
//! configured page size.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use eyre::{ensure, Result, WrapErr};
use memmap2::MmapRaw;

use crate::config::PAGE_HEADER_SIZE;

const FULL_FLAG_OFFSET: usize = 4;

pub struct Slab {
    mmap: MmapRaw,
    len: usize,
    path: PathBuf,
}

impl Slab {
    /// Creates the backing file (or opens it if it already exists), sizes it
    /// to exactly `len` bytes and maps it.
    pub fn create<P: AsRef<Path>>(path: P, len: usize) -> Result<Self> {
        let path = path.as_ref();

        ensure!(
            len > PAGE_HEADER_SIZE,
            "page size {} must exceed the header size {}",
            len,
            PAGE_HEADER_SIZE
        );

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .wrap_err_with(|| format!("failed to create page file '{}'", path.display()))?;

        let existing = file
            .metadata()
            .wrap_err_with(|| format!("failed to stat page file '{}'", path.display()))?
            .len();

        if existing == 0 {
            file.set_len(len as u64)
                .wrap_err_with(|| format!("failed to size page file '{}'", path.display()))?;
        } else {
            ensure!(
                existing == len as u64,
                "page file '{}' is {} bytes, expected {}",
                path.display(),
                existing,
                len
            );
        }

        let mmap = MmapRaw::map_raw(&file)
            .wrap_err_with(|| format!("failed to memory-map '{}'", path.display()))?;

        Ok(Self {
            mmap,
            len,
            path: path.to_path_buf(),
        })
    }

    /// Opens an existing page file without creating it.
    pub fn open<P: AsRef<Path>>(path: P, len: usize) -> Result<Self> {
        let path = path.as_ref();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .wrap_err_with(|| format!("failed to open page file '{}'", path.display()))?;

        let existing = file
            .metadata()
            .wrap_err_with(|| format!("failed to stat page file '{}'", path.display()))?
            .len();

        ensure!(
            existing == len as u64,
            "page file '{}' is {} bytes, expected {}",
            path.display(),
            existing,
            len
        );

        let mmap = MmapRaw::map_raw(&file)
            .wrap_err_with(|| format!("failed to memory-map '{}'", path.display()))?;

        Ok(Self {
            mmap,
            len,
            path: path.to_path_buf(),
        })
    }

    /// The published write cursor word in the mapped header.
    pub fn cursor(&self) -> &AtomicU32 {
        // SAFETY: the mapping is at least PAGE_HEADER_SIZE bytes (checked in
        // create/open), mmap regions are page-aligned so offset 0 satisfies
        // AtomicU32 alignment, and the returned borrow cannot outlive the
        // mapping because it is tied to &self.
        unsafe { &*(self.mmap.as_ptr() as *const AtomicU32) }
    }

    /// The full-flag word in the mapped header.
    fn full_flag(&self) -> &AtomicU32 {
        // SAFETY: offset 4 lies within the header (PAGE_HEADER_SIZE >= 8 by
        // the layout above), is 4-byte aligned, and the borrow is tied to
        // &self like cursor().
        unsafe { &*(self.mmap.as_ptr().add(FULL_FLAG_OFFSET) as *const AtomicU32) }
    }

    /// Marks the page full. Set by the writer when an append does not fit;
    /// the cursor itself stays on the last published record boundary.
    pub fn mark_full(&self) {
        self.full_flag().store(1, Ordering::Release);
    }

    /// Whether the writer has marked this page full.
    pub fn is_marked_full(&self) -> bool {
        self.full_flag().load(Ordering::Acquire) != 0
    }

    /// Copies `src` into the data region at `offset` (data-relative).
    ///
    /// Callers must not write a region that another thread may concurrently
    /// read; the single-writer append protocol guarantees this by only
    /// writing past the published cursor.
    pub fn write(&self, offset: usize, src: &[u8]) {
        debug_assert!(offset + src.len() <= self.data_capacity());

        // SAFETY: the destination range lies inside the mapping
        // (PAGE_HEADER_SIZE + offset + src.len() <= self.len, asserted
        // above), src is a valid borrow, and the regions cannot overlap
        // because src is process memory while the destination is the
        // mapping. Concurrent readers never access bytes past the published
        // cursor, and this range is past it until the subsequent release
        // store.
        unsafe {
            let dst = self.mmap.as_mut_ptr().add(PAGE_HEADER_SIZE + offset);
            std::ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len());
        }
    }

    /// Copies from the data region at `offset` into `dst`, returning the
    /// number of bytes copied (clamped to the data region end).
    pub fn read(&self, offset: usize, dst: &mut [u8]) -> usize {
        let capacity = self.data_capacity();
        if offset >= capacity {
            return 0;
        }

        let n = dst.len().min(capacity - offset);
        // SAFETY: the source range lies inside the mapping (offset + n <=
        // data capacity), dst is a valid exclusive borrow, and the regions
        // do not overlap (mapping vs process memory).
        unsafe {
            let src = self.mmap.as_ptr().add(PAGE_HEADER_SIZE + offset);
            std::ptr::copy_nonoverlapping(src, dst.as_mut_ptr(), n);
        }
        n
    }

    /// Borrows `len` bytes of the data region at `offset` without copying.
    pub fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        assert!(
            offset + len <= self.data_capacity(),
            "slice {}..{} out of bounds (data capacity {})",
            offset,
            offset + len,
            self.data_capacity()
        );

        // SAFETY: the range is inside the mapping (asserted above) and the
        // borrow is tied to &self, so it cannot outlive the mapping.
        unsafe {
            std::slice::from_raw_parts(self.mmap.as_ptr().add(PAGE_HEADER_SIZE + offset), len)
        }
    }

    /// Asks the OS to fault the whole mapping in ahead of use.
    pub fn advise_willneed(&self) {
        #[cfg(unix)]
        // SAFETY: madvise with MADV_WILLNEED is a hint; the range covers
        // exactly the mapping, which stays valid for the life of self.
        unsafe {
            libc::madvise(
                self.mmap.as_mut_ptr() as *mut libc::c_void,
                self.len,
                libc::MADV_WILLNEED,
            );
        }
    }

    /// Total mapped length, header included.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes available for records, header excluded.
    pub fn data_capacity(&self) -> usize {
        self.len - PAGE_HEADER_SIZE
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes the mapping to its backing file.
    pub fn sync(&self) -> Result<()> {
        self.mmap
            .flush()
            .wrap_err_with(|| format!("failed to sync page file '{}'", self.path.display()))
    }

    /// Publishes a new cursor value after the payload bytes it covers have
    /// been written.
    pub fn publish_cursor(&self, position: u32) {
        self.cursor().store(position, Ordering::Release);
    }

    /// Reads the published cursor.
    pub fn published_cursor(&self) -> u32 {
        self.cursor().load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Slab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slab")
            .field("path", &self.path)
            .field("len", &self.len)
            .field("cursor", &self.published_cursor())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TEST_PAGE: usize = 4096;

    #[test]
    fn create_sizes_backing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0000000000000000.page");

        let slab = Slab::create(&path, TEST_PAGE).unwrap();

        assert_eq!(slab.len(), TEST_PAGE);
        assert_eq!(slab.data_capacity(), TEST_PAGE - PAGE_HEADER_SIZE);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), TEST_PAGE as u64);
    }

    #[test]
    fn create_rejects_tiny_page_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tiny.page");

        assert!(Slab::create(&path, PAGE_HEADER_SIZE).is_err());
    }

    #[test]
    fn open_rejects_size_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.page");

        std::fs::write(&path, vec![0u8; 100]).unwrap();

        let result = Slab::open(&path, TEST_PAGE);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("expected"));
    }

    #[test]
    fn open_fails_for_missing_file() {
        let dir = tempdir().unwrap();

        assert!(Slab::open(dir.path().join("absent.page"), TEST_PAGE).is_err());
    }

    #[test]
    fn write_read_round_trip() {
        let dir = tempdir().unwrap();
        let slab = Slab::create(dir.path().join("rt.page"), TEST_PAGE).unwrap();

        slab.write(10, b"hello slab");

        let mut buf = [0u8; 10];
        let n = slab.read(10, &mut buf);

        assert_eq!(n, 10);
        assert_eq!(&buf, b"hello slab");
    }

    #[test]
    fn read_clamps_at_data_region_end() {
        let dir = tempdir().unwrap();
        let slab = Slab::create(dir.path().join("clamp.page"), TEST_PAGE).unwrap();

        let capacity = slab.data_capacity();
        let mut buf = [0u8; 64];

        assert_eq!(slab.read(capacity - 16, &mut buf), 16);
        assert_eq!(slab.read(capacity, &mut buf), 0);
        assert_eq!(slab.read(capacity + 100, &mut buf), 0);
    }

    #[test]
    fn cursor_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cursor.page");

        {
            let slab = Slab::create(&path, TEST_PAGE).unwrap();
            slab.publish_cursor(1234);
            slab.sync().unwrap();
        }

        let slab = Slab::open(&path, TEST_PAGE).unwrap();
        assert_eq!(slab.published_cursor(), 1234);
    }

    #[test]
    fn full_flag_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("full.page");

        {
            let slab = Slab::create(&path, TEST_PAGE).unwrap();
            assert!(!slab.is_marked_full());
            slab.mark_full();
            slab.sync().unwrap();
        }

        let slab = Slab::open(&path, TEST_PAGE).unwrap();
        assert!(slab.is_marked_full());
    }

    #[test]
    fn bytes_returns_written_region() {
        let dir = tempdir().unwrap();
        let slab = Slab::create(dir.path().join("bytes.page"), TEST_PAGE).unwrap();

        slab.write(0, &[0xAB, 0xCD, 0xEF]);

        assert_eq!(slab.bytes(0, 3), &[0xAB, 0xCD, 0xEF]);
    }
}
