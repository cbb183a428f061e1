//! # Streaming Reader
//!
//! Sequential consumption of the log: a reader walks pages from 0 forward,
//! cursor pair `(page_number, position)`, invoking a [`RecordHandler`] for
//! every record strictly in write order. Each reader owns its cursor; any
//! number of readers can tail the same log independently of the writer's
//! pace and of each other.
//!
//! ## Modes
//!
//! - [`ReadMode::Tailing`] — live consumption: when caught up, the reader
//!   idles via its injected strategy and re-checks, delivering new records
//!   without being restarted.
//! - [`ReadMode::Finite`] — replay of an already-written log: the loop
//!   terminates once no further data is available and never blocks.
//!
//! ## Record Views
//!
//! Records are handed to the handler as a [`Slice`]: a scoped view directly
//! into the page's mapped memory, bound to a held page reference. Dropping
//! the slice performs the paired release exactly once, which is what makes
//! reference misuse unrepresentable on this path: there is no way to leak
//! the reference or release it twice. The handler must not retain the view
//! beyond the call; copy the bytes out if they are needed later.

use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use eyre::{ensure, Result};

use crate::config::RECORD_HEADER_SIZE;
use crate::storage::{Page, PageCache, ReaderProgress, Slab};
use crate::tasks::idle::IdleStrategy;
use crate::tasks::CancellationToken;

/// Scoped view of one record's payload inside a page's mapped memory.
///
/// Single-use and single-threaded: the view is only valid for the duration
/// of the handler call it is passed to. The backing page reference is
/// released when the slice drops. A reference held across a suspension
/// point is unsafe territory: a colliding cache acquisition can forcibly
/// strip the underlying reference at any time.
pub struct Slice {
    page: Arc<Page>,
    slab: Arc<Slab>,
    offset: usize,
    len: usize,
    _single_threaded: PhantomData<*const ()>,
}

impl Slice {
    fn new(page: Arc<Page>, slab: Arc<Slab>, offset: usize, len: usize) -> Self {
        Self {
            page,
            slab,
            offset,
            len,
            _single_threaded: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bytes(&self) -> &[u8] {
        self.slab.bytes(self.offset, self.len)
    }

    /// Releases the underlying page reference. Equivalent to dropping the
    /// slice; provided for call sites that want the release to be explicit.
    pub fn release(self) {}
}

impl Deref for Slice {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.bytes()
    }
}

impl Drop for Slice {
    fn drop(&mut self) {
        self.page.release_reference();
    }
}

/// Capability invoked synchronously for each record, in write order.
pub trait RecordHandler {
    fn on_record(&mut self, record: &Slice, page_number: u64, position: u32);
}

impl<F: FnMut(&Slice, u64, u32)> RecordHandler for F {
    fn on_record(&mut self, record: &Slice, page_number: u64, position: u32) {
        self(record, page_number, position)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Keep waiting for and consuming new records indefinitely.
    Tailing,
    /// Consume a fixed, already-written log and terminate when caught up.
    Finite,
}

enum Step {
    Delivered,
    NextPage,
    NoData,
}

pub struct StreamingReader<H: RecordHandler> {
    cache: Arc<PageCache>,
    handler: H,
    mode: ReadMode,
    idle: Box<dyn IdleStrategy>,
    page_number: u64,
    position: u32,
    progress: Arc<ReaderProgress>,
}

impl<H: RecordHandler> StreamingReader<H> {
    pub fn new(
        cache: Arc<PageCache>,
        handler: H,
        mode: ReadMode,
        idle: Box<dyn IdleStrategy>,
    ) -> Self {
        let progress = cache.reader_registry().register();
        Self {
            cache,
            handler,
            mode,
            idle,
            page_number: 0,
            position: 0,
            progress,
        }
    }

    /// The reader's current cursor.
    pub fn cursor(&self) -> (u64, u32) {
        (self.page_number, self.position)
    }

    /// Runs the consumption loop until cancelled or, in finite mode, until
    /// the log is exhausted. No reference is held when this returns.
    pub fn process(&mut self, token: &CancellationToken) -> Result<()> {
        while !token.is_cancelled() {
            match self.step()? {
                Step::Delivered | Step::NextPage => self.idle.reset(),
                Step::NoData => match self.mode {
                    ReadMode::Finite => return Ok(()),
                    ReadMode::Tailing => self.idle.idle(),
                },
            }
        }
        Ok(())
    }

    fn step(&mut self) -> Result<Step> {
        if self.page_number > self.cache.page_index().highest_page_number() {
            return Ok(Step::NoData);
        }

        let page = self.cache.acquire(self.page_number)?;
        let cursor = page.next_available_position();

        if cursor > self.position {
            return self.deliver(page, cursor);
        }

        let full = page.is_full();
        page.release_reference();

        if full {
            self.page_number += 1;
            self.position = 0;
            self.progress.set(self.page_number);
            return Ok(Step::NextPage);
        }

        Ok(Step::NoData)
    }

    fn deliver(&mut self, page: Arc<Page>, cursor: u32) -> Result<Step> {
        let mut length_bytes = [0u8; 4];
        page.read(self.position, &mut length_bytes);
        let length = u32::from_le_bytes(length_bytes);

        ensure!(
            self.position as u64 + RECORD_HEADER_SIZE as u64 + length as u64 <= cursor as u64,
            "corrupt record at page {} position {}: length {} exceeds published cursor {}",
            self.page_number,
            self.position,
            length,
            cursor
        );

        let slab = page.slab().expect("record page unmapped while referenced"); // INVARIANT: the acquired reference blocks the unmapper's tombstone swap
        let slice = Slice::new(
            Arc::clone(&page),
            slab,
            self.position as usize + RECORD_HEADER_SIZE,
            length as usize,
        );

        self.handler
            .on_record(&slice, self.page_number, self.position);
        drop(slice);

        self.position += RECORD_HEADER_SIZE as u32 + length;
        Ok(Step::Delivered)
    }
}
