//! Core types shared by every timerow crate.
//!
//! Holds the error taxonomy, the canonical data model, timestamp and decimal
//! helpers, command-line settings and the secrets file loader.

pub mod error;
pub mod formatting;
pub mod models;
pub mod secrets;
pub mod settings;
pub mod time_utils;
