//! # Page Index
//!
//! Process-visible counter of the highest page number currently allocated.
//! This is the coordination point between the writer (which advances it when
//! a page fills), the preloader (which maps ahead of it) and readers (which
//! refuse to walk past it).
//!
//! ## Access Pattern
//!
//! Read-often, write-rare: every reader iteration and preloader poll loads
//! the counter, while stores only happen when the log grows by a page. A
//! single atomic integer is therefore enough; no lock is involved.
//!
//! ## Monotonicity
//!
//! The counter never decreases. [`PageIndex::advance_to`] asserts strict
//! growth and panics on regression, which indicates a programming error in
//! the allocator rather than a recoverable condition.
//! [`PageIndex::advance_if_higher`] is the racy-allocator variant: the
//! writer and the preloader both allocate pages concurrently, so the "only
//! advance when this is a new highest" decision has to be a single atomic
//! maximum rather than a check followed by a store.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub struct PageIndex {
    highest_page_number: AtomicU64,
}

impl PageIndex {
    pub fn new(initial: u64) -> Self {
        Self {
            highest_page_number: AtomicU64::new(initial),
        }
    }

    pub fn highest_page_number(&self) -> u64 {
        self.highest_page_number.load(Ordering::Acquire)
    }

    /// Advances the counter to `to`. Panics if `to` is not strictly greater
    /// than the current value.
    pub fn advance_to(&self, to: u64) {
        let result = self
            .highest_page_number
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if to > current {
                    Some(to)
                } else {
                    None
                }
            });

        if let Err(current) = result {
            panic!("page index regression: advance to {} from {}", to, current);
        }
    }

    /// Advances the counter to `to` unless it is already at or past it.
    /// Returns whether this call moved the counter.
    pub fn advance_if_higher(&self, to: u64) -> bool {
        self.highest_page_number.fetch_max(to, Ordering::AcqRel) < to
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_initial_value() {
        assert_eq!(PageIndex::new(0).highest_page_number(), 0);
        assert_eq!(PageIndex::new(17).highest_page_number(), 17);
    }

    #[test]
    fn advance_to_moves_forward() {
        let index = PageIndex::new(0);

        index.advance_to(1);
        index.advance_to(5);

        assert_eq!(index.highest_page_number(), 5);
    }

    #[test]
    #[should_panic(expected = "page index regression")]
    fn advance_to_panics_on_regression() {
        let index = PageIndex::new(3);
        index.advance_to(3);
    }

    #[test]
    fn advance_if_higher_is_idempotent() {
        let index = PageIndex::new(2);

        assert!(index.advance_if_higher(4));
        assert!(!index.advance_if_higher(4));
        assert!(!index.advance_if_higher(1));

        assert_eq!(index.highest_page_number(), 4);
    }
}
