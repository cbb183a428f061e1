//! # Configuration Module
//!
//! This module centralizes the configuration constants for the log engine.
//! Constants are grouped by functional area and interdependencies are
//! documented next to the values they constrain.
//!
//! ## Why Centralization?
//!
//! The page header size, record header size and end-of-page marker together
//! define the on-disk framing; a mismatch between any two of them corrupts
//! the reader protocol. Co-locating them with compile-time checks keeps the
//! framing consistent.
//!
//! Runtime-tunable settings (page size, cache capacity, idle strategies)
//! live on [`crate::log::LogBuilder`]; the constants here are their defaults
//! and the fixed wire-format values.

pub mod constants;
pub use constants::*;
