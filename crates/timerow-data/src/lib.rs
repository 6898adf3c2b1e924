//! Data layer for timerow.
//!
//! Parses raw sensor exports, owns the canonical dataset on disk, derives the
//! typical-day aggregate and prepares the read-only views handed to the
//! presentation layer.

pub mod aggregator;
pub mod history;
pub mod parser;
pub mod summary;
pub mod views;

pub use timerow_core as core;
