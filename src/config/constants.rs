//! # Configuration Constants
//!
//! This module centralizes the numeric constants of the log engine, grouping
//! interdependent values together and documenting their relationships.
//!
//! ## Dependency Graph
//!
//! ```text
//! DEFAULT_PAGE_SIZE (4 MiB)
//!       │
//!       ├─> PAGE_HEADER_SIZE (32 bytes, fixed)
//!       │     The published write cursor lives in the first header word and
//!       │     the full flag in the second, so that reader processes mapping
//!       │     the same file observe writer progress. The data region is
//!       │     page_size - PAGE_HEADER_SIZE.
//!       │
//!       └─> RECORD_HEADER_SIZE (4 bytes per record)
//!             A page is also treated as full once fewer than
//!             RECORD_HEADER_SIZE bytes of data region remain unclaimed.
//!
//! PRELOAD_WINDOW (5 pages)
//!       │
//!       └─> Pages mapped and touch-read ahead of the writer each time the
//!           preloader observes progress on the highest allocated page.
//!
//! PRELOAD_TOUCH_STRIDE (4096 bytes)
//!       │
//!       └─> Stride of the preload touch reads. One read per OS page is
//!           enough to fault the mapping in.
//! ```
//!
//! ## Critical Invariants
//!
//! 1. `PAGE_HEADER_SIZE >= 8` (cursor word and full flag must fit)
//! 2. `DEFAULT_PAGE_SIZE > PAGE_HEADER_SIZE + RECORD_HEADER_SIZE`

use std::time::Duration;

/// Fixed size of the in-page header region holding the published cursor.
pub const PAGE_HEADER_SIZE: usize = 32;

/// Length prefix stored before every record payload.
pub const RECORD_HEADER_SIZE: usize = 4;

/// Default size of one page file, header included.
pub const DEFAULT_PAGE_SIZE: usize = 4 * 1024 * 1024;

/// Default number of simultaneously resident pages in the bounded cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 32;

/// Pages mapped ahead of the writer per preload round.
pub const PRELOAD_WINDOW: u64 = 5;

/// Stride of the preloader's touch reads across a page's data region.
pub const PRELOAD_TOUCH_STRIDE: usize = 4096;

/// Default pause between preloader polls when no progress is observed.
pub const DEFAULT_PRELOAD_IDLE: Duration = Duration::from_micros(1);

/// Default pause between unmapper scans.
pub const DEFAULT_UNMAP_IDLE: Duration = Duration::from_millis(10);

/// Default pause for a tailing reader waiting on new records.
pub const DEFAULT_TAIL_IDLE: Duration = Duration::from_millis(1);

const _: () = assert!(PAGE_HEADER_SIZE >= 8);
const _: () = assert!(DEFAULT_PAGE_SIZE > PAGE_HEADER_SIZE + RECORD_HEADER_SIZE);
