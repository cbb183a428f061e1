//! # Log Builder
//!
//! Fluent configuration for opening a [`Log`]: page size, bounded-cache
//! capacity, preload window and the idle policies of the background tasks
//! and tailing readers. Settings are chained before `open()`:
//!
//! ```ignore
//! let log = Log::builder()
//!     .path("./orders-log")
//!     .page_size(1024 * 1024)
//!     .cache_capacity(64)
//!     .open()?;
//! ```
//!
//! | Option            | Default        | Description                          |
//! |-------------------|----------------|--------------------------------------|
//! | page_size         | 4 MiB          | Size of each page file, fixed per log|
//! | cache_capacity    | 32             | Simultaneously resident pages        |
//! | preload_window    | 5              | Pages mapped ahead of the writer     |
//! | preload_idle      | 1 µs           | Preloader pause when idle            |
//! | unmap_idle        | 10 ms          | Unmapper pause between sweeps        |
//! | tail_idle         | 1 ms           | Tailing reader pause when caught up  |
//! | background_tasks  | true           | Start preloader and unmapper on open |
//!
//! The page size must match any page files already present in the
//! directory; a mismatch surfaces as a fatal mapping error on first
//! acquire.

use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{ensure, Result};

use crate::config::{
    DEFAULT_CACHE_CAPACITY, DEFAULT_PAGE_SIZE, DEFAULT_PRELOAD_IDLE, DEFAULT_TAIL_IDLE,
    DEFAULT_UNMAP_IDLE, PAGE_HEADER_SIZE, PRELOAD_WINDOW, RECORD_HEADER_SIZE,
};
use crate::log::Log;

pub struct LogBuilder {
    path: Option<PathBuf>,
    page_size: usize,
    cache_capacity: usize,
    preload_window: u64,
    preload_idle: Duration,
    unmap_idle: Duration,
    tail_idle: Duration,
    background_tasks: bool,
}

impl Default for LogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LogBuilder {
    pub fn new() -> Self {
        Self {
            path: None,
            page_size: DEFAULT_PAGE_SIZE,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            preload_window: PRELOAD_WINDOW,
            preload_idle: DEFAULT_PRELOAD_IDLE,
            unmap_idle: DEFAULT_UNMAP_IDLE,
            tail_idle: DEFAULT_TAIL_IDLE,
            background_tasks: true,
        }
    }

    /// Directory holding the page files. Created if absent.
    pub fn path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Size of each page file in bytes, header included.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Number of simultaneously resident pages in the bounded cache.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Pages the preloader maps ahead of the writer per round.
    pub fn preload_window(mut self, window: u64) -> Self {
        self.preload_window = window;
        self
    }

    /// Preloader pause between polls when no progress is observed.
    pub fn preload_idle(mut self, pause: Duration) -> Self {
        self.preload_idle = pause;
        self
    }

    /// Unmapper pause between reclamation sweeps.
    pub fn unmap_idle(mut self, pause: Duration) -> Self {
        self.unmap_idle = pause;
        self
    }

    /// Pause used by tailing readers created through [`Log::tailing_reader`].
    pub fn tail_idle(mut self, pause: Duration) -> Self {
        self.tail_idle = pause;
        self
    }

    /// Whether to start the preloader and unmapper on open. Disable for
    /// fully deterministic single-threaded use.
    pub fn background_tasks(mut self, enabled: bool) -> Self {
        self.background_tasks = enabled;
        self
    }

    pub fn open(self) -> Result<Log> {
        let path = self.path.clone();
        ensure!(path.is_some(), "log path is required");

        ensure!(
            self.page_size > PAGE_HEADER_SIZE + RECORD_HEADER_SIZE,
            "page size {} cannot hold the page header and a record header",
            self.page_size
        );
        ensure!(
            self.cache_capacity > 0,
            "cache capacity must be at least 1"
        );

        Log::open_with(self)
    }

    pub(crate) fn into_parts(self) -> LogOptions {
        LogOptions {
            path: self.path.expect("path checked in open"), // INVARIANT: open() validated the path before calling Log::open_with
            page_size: self.page_size,
            cache_capacity: self.cache_capacity,
            preload_window: self.preload_window,
            preload_idle: self.preload_idle,
            unmap_idle: self.unmap_idle,
            tail_idle: self.tail_idle,
            background_tasks: self.background_tasks,
        }
    }
}

pub(crate) struct LogOptions {
    pub path: PathBuf,
    pub page_size: usize,
    pub cache_capacity: usize,
    pub preload_window: u64,
    pub preload_idle: Duration,
    pub unmap_idle: Duration,
    pub tail_idle: Duration,
    pub background_tasks: bool,
}
