//! Core types for Shaker Monitor.
//!
//! Domain models, column-role detection, timestamp normalization, the
//! screen heuristics, number formatting and CLI settings shared by the
//! ingestion crate and the binary.

pub mod calculations;
pub mod error;
pub mod formatting;
pub mod models;
pub mod schema;
pub mod settings;
pub mod time_utils;

pub use error::{Result, ShakerError};
