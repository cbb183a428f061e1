//! # Unmapper
//!
//! Reclaims memory mappings for pages the log no longer needs resident:
//! pages whose reference count has fallen to zero and which sit behind the
//! writer and every registered reader. Delayed reclamation only costs
//! memory, never correctness, so the task runs at idle priority relative to
//! the append and read hot paths.
//!
//! ## Candidate Sources
//!
//! Two places produce candidates. The bounded cache offers every page it
//! forcibly evicts on slot collision to the [`UnmapQueue`]; the sweep also
//! scans the currently resident slots, because a page a reader has finished
//! with can sit in its slot with a zero count indefinitely.
//!
//! ## Safety Rule
//!
//! A page is never unmapped while its reference count is non-zero.
//! [`Page::try_unmap`] enforces this with a compare-and-swap from exactly
//! zero to a tombstone, so a concurrent acquisition either lands before the
//! swap (count becomes non-zero, unmap refuses) or after it (acquisition
//! fails and the cache rebuilds the page). Queue candidates that are still
//! referenced are requeued for a later sweep.

use std::sync::Arc;

use eyre::Result;

use crate::storage::{Page, PageCache};
use crate::tasks::idle::IdleStrategy;
use crate::tasks::{BackgroundTask, CancellationToken};

const TASK_NAME: &str = "pagelog-unmapper";

pub struct Unmapper {
    cache: Arc<PageCache>,
    idle: Box<dyn IdleStrategy>,
}

impl Unmapper {
    pub fn new(cache: Arc<PageCache>, idle: Box<dyn IdleStrategy>) -> Self {
        Self { cache, idle }
    }

    /// Spawns the reclamation loop as a background task.
    pub fn spawn(cache: Arc<PageCache>, idle: Box<dyn IdleStrategy>) -> Result<BackgroundTask> {
        let unmapper = Self::new(cache, idle);
        BackgroundTask::spawn(TASK_NAME, move |token| unmapper.run(token))
    }

    pub fn run(mut self, token: CancellationToken) {
        while !token.is_cancelled() {
            if self.sweep() > 0 {
                self.idle.reset();
            } else {
                self.idle.idle();
            }
        }
    }

    /// One reclamation pass. Returns the number of pages unmapped.
    pub(crate) fn sweep(&self) -> usize {
        let highest = self.cache.page_index().highest_page_number();
        // Reclamation stays strictly behind every reader and the writer.
        let limit = self
            .cache
            .reader_registry()
            .low_water_mark(highest)
            .min(highest);

        let mut reclaimed = 0;

        for page in self.cache.unmap_queue().drain() {
            if page.is_unmapped() {
                continue;
            }
            if self.eligible(&page, limit) && page.try_unmap() {
                reclaimed += 1;
            } else {
                self.cache.unmap_queue().offer(page);
            }
        }

        for page in self.cache.resident_pages() {
            if self.eligible(&page, limit) && page.try_unmap() {
                reclaimed += 1;
            }
        }

        if reclaimed > 0 {
            tracing::debug!(reclaimed, limit, "unmapped pages");
        }

        reclaimed
    }

    fn eligible(&self, page: &Page, limit: u64) -> bool {
        page.number() < limit && page.reference_count() == 0
    }
}
