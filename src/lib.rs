//! pagewise - resumable, page-granular PDF ingestion
//!
//! This crate provides:
//! - Source discovery with content fingerprints and sidecar metadata
//! - A persistent, prioritized ingestion queue in SQLite
//! - Page-by-page OCR through a chain of vision models with rate-limit fallback
//! - Boundary-aware chunking with every page persisted as soon as it is read

pub mod chunk;
pub mod commands;
pub mod config;
pub mod error;
pub mod extract;
pub mod meta;
pub mod ocr;
pub mod progress;
pub mod queue;
pub mod scan;

pub use config::Config;
pub use error::{Error, Result};
