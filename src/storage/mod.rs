//! # Storage Module
//!
//! The paging engine under the log: memory-mapped page files, the append
//! cursor and liveness reference counting, and the bounded page cache that
//! keeps memory usage constant regardless of log length.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  PageCache (create/map on demand, PageIndex) │
//! ├──────────────────────────────────────────────┤
//! │  LoadedPageCache (direct-mapped, N slots)    │
//! ├──────────────────────────────────────────────┤
//! │  Page (cursor, reference count)              │
//! ├──────────────────────────────────────────────┤
//! │  Slab (one mmap region per page file)        │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Writes and reads go directly against the mapped region; the OS page
//! cache does the buffering, and the preload/unmap background tasks (in
//! [`crate::tasks`]) keep the mapped set warm and bounded.
//!
//! ## Shared State
//!
//! Exactly three pieces of mutable state are shared between the writer,
//! readers and background tasks: the page index, each page's published
//! cursor, and each page's reference count. All three are atomics; the only
//! locks in the module are the per-slot mutexes guarding cache installation
//! and the per-page slab slot taken on unmap.
//!
//! ## Module Organization
//!
//! - `slab`: one fixed-size memory mapping per page file
//! - `page`: record framing, cursor publication, reference counting
//! - `index`: the highest-allocated-page counter
//! - `cache`: direct-mapped bounded cache, page factory, unmap hand-off

pub mod cache;
pub mod index;
pub mod page;
pub mod slab;

pub use cache::{
    page_file_name, LoadedPageCache, PageCache, PageFactory, ReaderProgress, ReaderRegistry,
    UnmapQueue,
};
pub use index::PageIndex;
pub use page::{Page, PageFull};
pub use slab::Slab;
