//! # Preloader
//!
//! Maps pages ahead of the writer and touch-reads their full extent so the
//! OS faults them into memory before the writer arrives. Without it, the
//! first append into a fresh page stalls on file creation and a cold page
//! fault; with it, the write path only ever lands on warm mappings.
//!
//! ## Polling Protocol
//!
//! Each iteration reads the page index. On a virgin log (highest page 0,
//! nothing preloaded yet) page 0 is preloaded once. After that, the task
//! watches the highest allocated page: once the writer has produced data on
//! it (`next_available_position() != 0`) and the page is past the recorded
//! preload progress, the next `window` page numbers are allocated and
//! touched. Progress is recorded trailing the observed page so the same
//! window is not reloaded until the writer crosses it.
//!
//! Preloading a page does not pin it: the reference taken for the touch
//! reads is released before the next page is handled.
//!
//! ## Failure
//!
//! A mapping failure is a storage fault and fatal: the task logs the error
//! and terminates rather than continue against a broken backing store.

use std::sync::Arc;

use eyre::Result;

use crate::config::{PAGE_HEADER_SIZE, PRELOAD_TOUCH_STRIDE};
use crate::storage::PageCache;
use crate::tasks::idle::IdleStrategy;
use crate::tasks::{BackgroundTask, CancellationToken};

const TASK_NAME: &str = "pagelog-preloader";

pub struct Preloader {
    cache: Arc<PageCache>,
    idle: Box<dyn IdleStrategy>,
    window: u64,
    page_zero_loaded: bool,
    last_loaded_page: Option<u64>,
}

impl Preloader {
    pub fn new(cache: Arc<PageCache>, idle: Box<dyn IdleStrategy>, window: u64) -> Self {
        Self {
            cache,
            idle,
            window,
            page_zero_loaded: false,
            last_loaded_page: None,
        }
    }

    /// Spawns the preload loop as a background task.
    pub fn spawn(
        cache: Arc<PageCache>,
        idle: Box<dyn IdleStrategy>,
        window: u64,
    ) -> Result<BackgroundTask> {
        let preloader = Self::new(cache, idle, window);
        BackgroundTask::spawn(TASK_NAME, move |token| preloader.run(token))
    }

    pub fn run(mut self, token: CancellationToken) {
        while !token.is_cancelled() {
            match self.poll() {
                Ok(true) => self.idle.reset(),
                Ok(false) => self.idle.idle(),
                Err(error) => {
                    tracing::error!(error = %error, "preloader terminated on storage fault");
                    return;
                }
            }
        }
    }

    /// One iteration of the preload protocol. Returns whether any page was
    /// preloaded.
    pub(crate) fn poll(&mut self) -> Result<bool> {
        let highest = self.cache.page_index().highest_page_number();

        if highest == 0 && !self.page_zero_loaded {
            self.preload_page(0)?;
            self.page_zero_loaded = true;
            return Ok(true);
        }

        let page = self.cache.acquire(highest)?;
        let position = page.next_available_position();
        page.release_reference();

        let past_progress = self.last_loaded_page.map_or(true, |last| highest > last);
        if position != 0 && past_progress {
            for page_number in highest + 1..=highest + self.window {
                self.preload_page(page_number)?;
            }
            // Progress trails the observed page; the window reloads only
            // once the writer has crossed it.
            self.last_loaded_page = Some(highest + 2);
            return Ok(true);
        }

        Ok(false)
    }

    fn preload_page(&self, page_number: u64) -> Result<()> {
        let page = self.cache.allocate(page_number)?;

        if let Some(slab) = page.slab() {
            slab.advise_willneed();
        }

        let capacity = self.cache.page_size() - PAGE_HEADER_SIZE;
        let mut probe = [0u8; 1];
        let mut offset = 0;
        while offset < capacity {
            page.read(offset as u32, &mut probe);
            offset += PRELOAD_TOUCH_STRIDE;
        }

        page.release_reference();
        tracing::trace!(page = page_number, "preloaded page");
        Ok(())
    }
}
