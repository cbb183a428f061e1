//! # Log Facade
//!
//! `Log` ties the engine together for an embedding application: it opens
//! the page cache over a directory, drives the single writer's append path
//! (rolling to a fresh page on [`PageFull`]), starts and stops the
//! preloader and unmapper, and hands out streaming readers.
//!
//! ## Writer Discipline
//!
//! The engine assumes a single writer per log. `Log` enforces that with a
//! mutex around the writer state, so `append` can be called from any thread
//! while appends stay totally ordered. The writer keeps one reference on
//! its current page for its whole tenure, which protects the page from the
//! unmapper until the writer rolls past it.
//!
//! ## Reopening
//!
//! Opening an existing directory resumes where the previous writer left
//! off: the page index is rebuilt from the page files on disk and the
//! cursor of the highest page is recovered from its mapped header. A full
//! highest page simply rolls on the first append.

mod builder;

pub use builder::LogBuilder;
use builder::LogOptions;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use eyre::{ensure, Result};
use parking_lot::Mutex;

use crate::config::RECORD_HEADER_SIZE;
use crate::reader::{ReadMode, RecordHandler, StreamingReader};
use crate::storage::{Page, PageCache, PageFull};
use crate::tasks::idle::{Backoff, StaticPause};
use crate::tasks::preloader::Preloader;
use crate::tasks::unmapper::Unmapper;
use crate::tasks::BackgroundTask;

struct WriterState {
    page: Arc<Page>,
}

impl Drop for WriterState {
    fn drop(&mut self) {
        self.page.release_reference();
    }
}

pub struct Log {
    cache: Arc<PageCache>,
    writer: Mutex<WriterState>,
    tail_idle: Duration,
    tasks: Vec<BackgroundTask>,
}

impl Log {
    pub fn builder() -> LogBuilder {
        LogBuilder::new()
    }

    /// Opens a log at `path` with default options.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::builder().path(path).open()
    }

    pub(crate) fn open_with(builder: LogBuilder) -> Result<Self> {
        let options = builder.into_parts();
        let cache = Arc::new(PageCache::create(
            &options.path,
            options.page_size,
            options.cache_capacity,
        )?);

        // The writer resumes on the highest allocated page; its published
        // cursor was recovered from the mapped header.
        let current = cache.acquire(cache.page_index().highest_page_number())?;
        let writer = Mutex::new(WriterState { page: current });

        let mut tasks = Vec::new();
        if options.background_tasks {
            tasks.push(Preloader::spawn(
                Arc::clone(&cache),
                Box::new(StaticPause::new(options.preload_idle)),
                options.preload_window,
            )?);
            tasks.push(Unmapper::spawn(
                Arc::clone(&cache),
                Box::new(Backoff::new(options.unmap_idle)),
            )?);
        }

        tracing::info!(
            path = %options.path.display(),
            page_size = options.page_size,
            cache_capacity = options.cache_capacity,
            "log opened"
        );

        Ok(Self {
            cache,
            writer,
            tail_idle: options.tail_idle,
            tasks,
        })
    }

    /// Appends one record, rolling to the next page when the current one
    /// fills. Returns the `(page_number, position)` the record landed at.
    pub fn append(&self, payload: &[u8]) -> Result<(u64, u32)> {
        let capacity = self.cache.page_size() - crate::config::PAGE_HEADER_SIZE;
        ensure!(
            RECORD_HEADER_SIZE + payload.len() <= capacity,
            "record of {} bytes cannot fit a page (data capacity {})",
            payload.len(),
            capacity
        );

        let mut writer = self.writer.lock();
        loop {
            match writer.page.append(payload) {
                Ok(position) => return Ok((writer.page.number(), position)),
                Err(PageFull) => {
                    let next = writer.page.number() + 1;
                    let page = self.cache.allocate(next)?;
                    writer.page.release_reference();
                    writer.page = page;
                }
            }
        }
    }

    /// Creates a tailing reader over this log using the configured tail
    /// idle pause. The caller drives it via `process`.
    pub fn tailing_reader<H: RecordHandler>(&self, handler: H) -> StreamingReader<H> {
        StreamingReader::new(
            Arc::clone(&self.cache),
            handler,
            ReadMode::Tailing,
            Box::new(Backoff::new(self.tail_idle)),
        )
    }

    /// Creates a finite reader that replays the records written so far and
    /// terminates without blocking.
    pub fn finite_reader<H: RecordHandler>(&self, handler: H) -> StreamingReader<H> {
        StreamingReader::new(
            Arc::clone(&self.cache),
            handler,
            ReadMode::Finite,
            Box::new(StaticPause::new(self.tail_idle)),
        )
    }

    pub fn page_cache(&self) -> &Arc<PageCache> {
        &self.cache
    }

    /// Flushes the writer's current page to disk.
    pub fn sync(&self) -> Result<()> {
        self.writer.lock().page.sync()
    }

    /// Stops the background tasks. The writer's page reference is released
    /// when the log drops.
    pub fn close(self) {}
}

impl Drop for Log {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Slice;
    use tempfile::tempdir;

    const TEST_PAGE: usize = 256;

    fn small_log(path: &Path) -> Log {
        Log::builder()
            .path(path)
            .page_size(TEST_PAGE)
            .cache_capacity(8)
            .background_tasks(false)
            .open()
            .unwrap()
    }

    #[test]
    fn append_returns_increasing_positions() {
        let dir = tempdir().unwrap();
        let log = small_log(dir.path());

        let (p0, pos0) = log.append(b"one").unwrap();
        let (p1, pos1) = log.append(b"two").unwrap();

        assert_eq!((p0, pos0), (0, 0));
        assert_eq!((p1, pos1), (0, 4 + 3));
    }

    #[test]
    fn append_rolls_to_next_page_when_full() {
        let dir = tempdir().unwrap();
        let log = small_log(dir.path());

        let mut highest_seen = 0;
        for _ in 0..32 {
            let (page, _) = log.append(&[5u8; 48]).unwrap();
            highest_seen = highest_seen.max(page);
        }

        assert!(highest_seen > 0);
        assert_eq!(
            log.page_cache().page_index().highest_page_number(),
            highest_seen
        );
    }

    #[test]
    fn oversized_record_is_rejected() {
        let dir = tempdir().unwrap();
        let log = small_log(dir.path());

        assert!(log.append(&[0u8; TEST_PAGE]).is_err());
        assert!(log.append(b"still works").is_ok());
    }

    #[test]
    fn reopen_resumes_after_existing_records() {
        let dir = tempdir().unwrap();

        {
            let log = small_log(dir.path());
            log.append(b"before close").unwrap();
            log.sync().unwrap();
            log.close();
        }

        let log = small_log(dir.path());
        let (page, position) = log.append(b"after reopen").unwrap();
        assert_eq!(page, 0);
        assert_eq!(position, 4 + 12);

        let mut seen = vec![];
        {
            let mut reader = log.finite_reader(|record: &Slice, _: u64, _: u32| {
                seen.push(record.to_vec());
            });
            reader.process(&crate::tasks::CancellationToken::new()).unwrap();
        }

        assert_eq!(seen, vec![b"before close".to_vec(), b"after reopen".to_vec()]);
    }

    #[test]
    fn builder_requires_path() {
        assert!(Log::builder().open().is_err());
    }

    #[test]
    fn builder_rejects_degenerate_page_size() {
        let dir = tempdir().unwrap();
        assert!(Log::builder().path(dir.path()).page_size(16).open().is_err());
    }
}
