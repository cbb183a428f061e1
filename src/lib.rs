//! # pagelog — Persistent Paged Record Log
//!
//! `pagelog` is an append-only record log over fixed-size memory-mapped
//! page files, built as a low-latency transport medium: one writer appends
//! length-framed records, any number of independent readers tail the pages
//! in order and replay records as they arrive. The interesting engineering
//! is in the paging and consumption engine, not in any messaging API
//! layered on top.
//!
//! ## Quick Start
//!
//! ```ignore
//! use pagelog::{Log, Slice};
//!
//! let log = Log::builder()
//!     .path("./orders-log")
//!     .page_size(1024 * 1024)
//!     .open()?;
//!
//! log.append(b"order accepted")?;
//!
//! let mut reader = log.finite_reader(|record: &Slice, page: u64, position: u32| {
//!     println!("{} bytes at page {} position {}", record.len(), page, position);
//! });
//! reader.process(&pagelog::CancellationToken::new())?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │       Log (writer path, task lifecycle)      │
//! ├──────────────────────────────────────────────┤
//! │  StreamingReader (cursor walk, RecordHandler)│
//! ├──────────────────────────────────────────────┤
//! │  PageCache / LoadedPageCache (bounded window)│
//! ├───────────────────────┬──────────────────────┤
//! │  Preloader (ahead)    │  Unmapper (behind)   │
//! ├───────────────────────┴──────────────────────┤
//! │  Page / Slab (mmap, cursor, refcount)        │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! The writer claims space in the current page; when a page fills, the next
//! page number is allocated and the page index advances. The preloader maps
//! pages ahead of the writer so appends never block on a cold page fault;
//! the unmapper reclaims mappings behind every reader. Coordination happens
//! only through the page index, per-page cursors and per-page reference
//! counts — all atomics, no coarse lock on the hot paths.
//!
//! ## On-Disk Layout
//!
//! ```text
//! log_dir/
//! ├── 0000000000000000.page    # fixed size, cursor in mapped header
//! ├── 0000000000000001.page
//! └── 0000000000000002.page
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: slabs, pages, the page index and the bounded cache
//! - [`reader`]: streaming consumption, record handler, record slices
//! - [`tasks`]: idle strategies, preloader, unmapper, task harness
//! - [`log`]: the embedding facade with builder configuration
//! - [`config`]: wire-format constants and tuning defaults

pub mod config;
pub mod log;
pub mod reader;
pub mod storage;
pub mod tasks;

pub use config::{DEFAULT_PAGE_SIZE, PAGE_HEADER_SIZE, RECORD_HEADER_SIZE};
pub use log::{Log, LogBuilder};
pub use reader::{ReadMode, RecordHandler, Slice, StreamingReader};
pub use storage::{LoadedPageCache, Page, PageCache, PageFull, PageIndex};
pub use tasks::idle::{Backoff, IdleStrategy, StaticPause};
pub use tasks::{BackgroundTask, CancellationToken};
