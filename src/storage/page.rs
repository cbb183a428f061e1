//! # Page: Append Cursor and Liveness Reference Count
//!
//! A `Page` owns one [`Slab`] and layers the record protocol on top of it:
//! the single writer claims space at the published cursor, and any number of
//! concurrent readers consume records strictly below it.
//!
//! ## Publication Protocol
//!
//! An append writes the length prefix and payload into the slab first, then
//! publishes the new cursor with a release store. A reader that observes
//! `next_available_position() > position` via the acquire load is therefore
//! guaranteed the bytes up to that position are fully written. Within a page
//! this totally orders records; across pages ordering follows the monotonic
//! page numbers.
//!
//! ## Reference Counting
//!
//! Every accessor pairs one `acquire_reference` with one `release_reference`.
//! The count starts at 0 when the page factory creates the page and reaching
//! 0 marks the page reclaimable; the unmapper performs the actual unmap
//! asynchronously. Two deliberate asymmetries:
//!
//! - `release_reference` saturates at 0. The bounded cache forcibly releases
//!   an evicted page's reference without waiting for holders, so a holder's
//!   own release can arrive after the count already hit 0. The count never
//!   goes negative.
//! - Unmapping claims the count by swapping 0 for a tombstone. A tombstoned
//!   page refuses further acquisition, which forces the cache to build a
//!   fresh instance; a page with a non-zero count can never be unmapped.
//!
//! ## Full Marking
//!
//! When an append does not fit, the writer sets the full flag in the mapped
//! header and leaves the cursor on the last record boundary. Readers treat a
//! page as finished when the flag is set or when fewer than 4 bytes of data
//! region remain past the cursor.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::RECORD_HEADER_SIZE;
use crate::storage::slab::Slab;

/// Recoverable signal from [`Page::append`]: the record does not fit and the
/// caller must allocate the next page and retry there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFull;

impl std::fmt::Display for PageFull {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("page full")
    }
}

impl std::error::Error for PageFull {}

/// Reference-count value marking a page whose slab has been reclaimed.
const UNMAPPED: i64 = i64::MIN;

pub struct Page {
    number: u64,
    slab: RwLock<Option<Arc<Slab>>>,
    references: AtomicI64,
}

impl Page {
    pub fn new(slab: Slab, number: u64) -> Self {
        Self {
            number,
            slab: RwLock::new(Some(Arc::new(slab))),
            references: AtomicI64::new(0),
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    /// The slab backing this page, or `None` once unmapped.
    pub(crate) fn slab(&self) -> Option<Arc<Slab>> {
        self.slab.read().clone()
    }

    fn slab_ref(&self) -> Arc<Slab> {
        self.slab().expect("page accessed after unmap") // INVARIANT: callers hold a reference, which blocks the unmapper's tombstone swap
    }

    /// Appends `[len][payload]` at the current cursor.
    ///
    /// Single-writer discipline: only one thread may append to a given page
    /// at a time. On insufficient space the page is marked full, the cursor
    /// stays unchanged and `PageFull` is returned.
    pub fn append(&self, payload: &[u8]) -> Result<u32, PageFull> {
        let slab = self.slab_ref();
        let cursor = slab.published_cursor();
        let capacity = slab.data_capacity() as u64;
        let required = (RECORD_HEADER_SIZE + payload.len()) as u64;

        if cursor as u64 + required > capacity {
            slab.mark_full();
            return Err(PageFull);
        }

        let position = cursor as usize;
        slab.write(position, &(payload.len() as u32).to_le_bytes());
        slab.write(position + RECORD_HEADER_SIZE, payload);
        slab.publish_cursor(cursor + required as u32);

        Ok(cursor)
    }

    /// Copies bytes from the data region at `offset` into `dest`, returning
    /// the number of bytes copied. Safe to call concurrently with `append`
    /// for regions at or below the published cursor; the preloader also uses
    /// it to touch unwritten regions, whose contents are unspecified.
    pub fn read(&self, offset: u32, dest: &mut [u8]) -> usize {
        self.slab_ref().read(offset as usize, dest)
    }

    /// The published write cursor: 0 when nothing has been written yet.
    pub fn next_available_position(&self) -> u32 {
        self.slab_ref().published_cursor()
    }

    /// Whether the writer is done with this page: the full flag is set or no
    /// further record header can fit past the cursor.
    pub fn is_full(&self) -> bool {
        let slab = self.slab_ref();
        slab.is_marked_full()
            || slab.published_cursor() as usize + RECORD_HEADER_SIZE > slab.data_capacity()
    }

    /// Increments the liveness count. Returns `false` if the page has been
    /// unmapped, in which case the caller must obtain a fresh instance.
    pub fn acquire_reference(&self) -> bool {
        self.references
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                if count == UNMAPPED {
                    None
                } else {
                    Some(count + 1)
                }
            })
            .is_ok()
    }

    /// Decrements the liveness count, saturating at 0. Extra releases are
    /// legal after a forced eviction.
    pub fn release_reference(&self) {
        let _ = self
            .references
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                if count <= 0 {
                    None
                } else {
                    Some(count - 1)
                }
            });
    }

    /// Current liveness count; 0 for an unmapped page.
    pub fn reference_count(&self) -> i64 {
        self.references.load(Ordering::Acquire).max(0)
    }

    pub fn is_unmapped(&self) -> bool {
        self.references.load(Ordering::Acquire) == UNMAPPED
    }

    /// Whether the backing slab is still mapped. Holding a reference
    /// guarantees this stays true until the matching release.
    pub fn is_mapped(&self) -> bool {
        self.slab.read().is_some()
    }

    /// Attempts to reclaim the mapping. Succeeds only when the count is
    /// exactly 0: the count is swapped for a tombstone so no acquisition can
    /// race past, then the slab is dropped. Returns `false` when the page is
    /// referenced or already unmapped.
    pub fn try_unmap(&self) -> bool {
        if self
            .references
            .compare_exchange(0, UNMAPPED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let slab = self.slab.write().take();
        drop(slab);
        true
    }

    /// Flushes the page's mapping to disk.
    pub fn sync(&self) -> eyre::Result<()> {
        self.slab_ref().sync()
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("number", &self.number)
            .field("references", &self.references.load(Ordering::Relaxed))
            .field("unmapped", &self.is_unmapped())
            .finish()
    }
}
