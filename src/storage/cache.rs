//! # Bounded Page Cache
//!
//! This module implements the in-memory window over the log's pages: a
//! fixed-capacity, direct-mapped cache of [`Page`] objects keyed by
//! `page_number % capacity`, and the [`PageCache`] facade that creates and
//! maps pages on demand, owns the [`PageIndex`] and hands evicted pages to
//! the unmapper.
//!
//! ## Why Direct-Mapped Instead of LRU?
//!
//! A recency-based cache needs bookkeeping on every hit (list splicing or
//! visited flags) and a scan on every eviction. The log's access pattern is
//! strictly sequential per task, so slot collisions are rare and positional
//! eviction is enough:
//!
//! ```text
//! slot = page_number % capacity
//! ```
//!
//! Each slot holds at most one live page; a new page number mapping to an
//! occupied slot evicts the occupant. Lookup, installation and eviction are
//! all O(1) and allocation-free.
//!
//! ## Eviction Hazard
//!
//! Eviction does NOT wait for holders: the occupant's reference is released
//! once, immediately, even if other tasks still hold references to it. A
//! page can therefore be evicted while logically hot if a colliding page
//! number is accessed. Callers must treat any held reference as valid only
//! for a short, non-suspending critical section, and must not assume that
//! re-acquiring the same page number returns the same instance.
//!
//! ## Slot Installation
//!
//! Writer and reader paths can both trigger cache population, so each slot
//! is guarded by its own mutex and the page factory runs under that guard.
//! Two threads can never map the same page number twice; critical sections
//! stay short (one file create + mmap at worst).
//!
//! ## On-Disk Layout
//!
//! One file per page in the log directory, named by zero-padded decimal
//! page number:
//!
//! ```text
//! log_dir/
//! ├── 0000000000000000.page
//! ├── 0000000000000001.page
//! └── 0000000000000002.page
//! ```
//!
//! Every file is exactly `page_size` bytes; a short or corrupted file is a
//! fatal mapping error at acquire time.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use eyre::{ensure, Result, WrapErr};
use parking_lot::Mutex;

use crate::storage::index::PageIndex;
use crate::storage::page::Page;
use crate::storage::slab::Slab;

pub const PAGE_FILE_EXTENSION: &str = "page";

/// Builds the backing file name for a page number.
pub fn page_file_name(page_number: u64) -> String {
    format!("{:016}.{}", page_number, PAGE_FILE_EXTENSION)
}

/// Parses a backing file name back into a page number.
fn parse_page_file_name(path: &Path) -> Option<u64> {
    if path.extension()? != PAGE_FILE_EXTENSION {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

/// Creates and maps the page for a given page number.
pub type PageFactory = Box<dyn Fn(u64) -> Result<Page> + Send + Sync>;

/// Fixed-capacity, direct-mapped window of live pages.
pub struct LoadedPageCache {
    slots: Box<[Mutex<Option<Arc<Page>>>]>,
    factory: PageFactory,
}

impl LoadedPageCache {
    pub fn new(factory: PageFactory, capacity: usize) -> Result<Self> {
        ensure!(capacity > 0, "page cache capacity must be at least 1");

        let slots = (0..capacity)
            .map(|_| Mutex::new(None))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self { slots, factory })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the page for `page_number` with its reference count
    /// incremented, plus the slot occupant this acquisition forcibly
    /// evicted, if any. The caller owes one `release_reference`.
    pub fn acquire(&self, page_number: u64) -> Result<(Arc<Page>, Option<Arc<Page>>)> {
        let slot = &self.slots[(page_number % self.slots.len() as u64) as usize];
        let mut occupant = slot.lock();

        if let Some(page) = occupant.as_ref() {
            if page.number() == page_number && page.acquire_reference() {
                return Ok((Arc::clone(page), None));
            }
        }

        // Miss, collision, or an occupant the unmapper already reclaimed.
        let evicted = occupant.take();
        if let Some(old) = evicted.as_ref() {
            old.release_reference();
        }

        let page = Arc::new((self.factory)(page_number)?);
        let acquired = page.acquire_reference();
        debug_assert!(acquired, "factory returned an unmapped page");
        *occupant = Some(Arc::clone(&page));

        Ok((page, evicted))
    }

    /// Snapshot of the currently resident pages, for the unmapper's scan.
    pub fn resident(&self) -> Vec<Arc<Page>> {
        self.slots
            .iter()
            .filter_map(|slot| slot.lock().clone())
            .collect()
    }
}

/// Pages handed off for asynchronous reclamation.
#[derive(Default)]
pub struct UnmapQueue {
    pending: Mutex<VecDeque<Arc<Page>>>,
}

impl UnmapQueue {
    pub fn offer(&self, page: Arc<Page>) {
        self.pending.lock().push_back(page);
    }

    pub fn drain(&self) -> Vec<Arc<Page>> {
        self.pending.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

/// A reader's progress cell: the page number it is currently consuming.
#[derive(Debug)]
pub struct ReaderProgress {
    page_number: AtomicU64,
}

impl ReaderProgress {
    fn new() -> Self {
        Self {
            page_number: AtomicU64::new(0),
        }
    }

    pub fn set(&self, page_number: u64) {
        self.page_number.store(page_number, Ordering::Release);
    }

    pub fn get(&self) -> u64 {
        self.page_number.load(Ordering::Acquire)
    }
}

/// Registry of active readers, consulted by the unmapper so reclamation
/// stays behind every reader's cursor. Cells are held weakly: a reader that
/// stops simply drops its cell and no longer pins the low-water mark.
#[derive(Default)]
pub struct ReaderRegistry {
    cells: Mutex<Vec<Weak<ReaderProgress>>>,
}

impl ReaderRegistry {
    pub fn register(&self) -> Arc<ReaderProgress> {
        let cell = Arc::new(ReaderProgress::new());
        self.cells.lock().push(Arc::downgrade(&cell));
        cell
    }

    /// The lowest page number any live reader is on, or `default` when no
    /// readers are registered. Dead cells are pruned as a side effect.
    pub fn low_water_mark(&self, default: u64) -> u64 {
        let mut cells = self.cells.lock();
        cells.retain(|cell| cell.strong_count() > 0);

        cells
            .iter()
            .filter_map(|cell| cell.upgrade())
            .map(|cell| cell.get())
            .min()
            .unwrap_or(default)
    }
}

/// Creates and maps pages on demand, indexed by page number.
pub struct PageCache {
    directory: PathBuf,
    page_size: usize,
    loaded: LoadedPageCache,
    index: Arc<PageIndex>,
    unmap_queue: Arc<UnmapQueue>,
    readers: Arc<ReaderRegistry>,
}

impl PageCache {
    /// Opens the log directory, creating it if needed, and initializes the
    /// page index from the highest page file already present.
    pub fn create<P: AsRef<Path>>(directory: P, page_size: usize, capacity: usize) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();

        std::fs::create_dir_all(&directory)
            .wrap_err_with(|| format!("failed to create log directory '{}'", directory.display()))?;

        let highest = highest_existing_page(&directory)?.unwrap_or(0);

        let factory_dir = directory.clone();
        let factory: PageFactory = Box::new(move |page_number| {
            let path = factory_dir.join(page_file_name(page_number));
            let slab = Slab::create(&path, page_size)?;
            Ok(Page::new(slab, page_number))
        });

        Ok(Self {
            directory,
            page_size,
            loaded: LoadedPageCache::new(factory, capacity)?,
            index: Arc::new(PageIndex::new(highest)),
            unmap_queue: Arc::new(UnmapQueue::default()),
            readers: Arc::new(ReaderRegistry::default()),
        })
    }

    /// Returns the page for `page_number`, creating and mapping it if not
    /// resident, with its reference count incremented. The caller owes one
    /// `release_reference`.
    pub fn acquire(&self, page_number: u64) -> Result<Arc<Page>> {
        let (page, evicted) = self.loaded.acquire(page_number)?;
        if let Some(old) = evicted {
            self.unmap_queue.offer(old);
        }
        Ok(page)
    }

    /// Like `acquire`, but also advances the page index when `page_number`
    /// is a new highest. Used when extending the log.
    pub fn allocate(&self, page_number: u64) -> Result<Arc<Page>> {
        let page = self.acquire(page_number)?;
        self.index.advance_if_higher(page_number);
        Ok(page)
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn page_index(&self) -> &Arc<PageIndex> {
        &self.index
    }

    pub fn unmap_queue(&self) -> &Arc<UnmapQueue> {
        &self.unmap_queue
    }

    pub fn reader_registry(&self) -> &Arc<ReaderRegistry> {
        &self.readers
    }

    pub(crate) fn resident_pages(&self) -> Vec<Arc<Page>> {
        self.loaded.resident()
    }
}

fn highest_existing_page(directory: &Path) -> Result<Option<u64>> {
    let mut highest = None;

    let entries = std::fs::read_dir(directory)
        .wrap_err_with(|| format!("failed to list log directory '{}'", directory.display()))?;

    for entry in entries {
        let entry = entry
            .wrap_err_with(|| format!("failed to list log directory '{}'", directory.display()))?;
        if let Some(number) = parse_page_file_name(&entry.path()) {
            highest = Some(highest.map_or(number, |h: u64| h.max(number)));
        }
    }

    Ok(highest)
}
