//! Ingestion layer for Shaker Monitor.
//!
//! Responsible for discovering CSV streams in ZIP archives, single files and
//! directories, parsing them into tables, merging them into one time series,
//! deriving daily and per-day metrics, and running the top-level batch
//! pipeline.

pub mod aggregator;
pub mod analysis;
pub mod archive;
pub mod export;
pub mod merger;
pub mod reader;

pub use shaker_core as core;
