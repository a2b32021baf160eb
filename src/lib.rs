//! ebook-nav: navigation and reading-progress engine for EPUB readers.
//!
//! This crate opens EPUB containers, parses their spine, manifest and
//! table of contents, and keeps track of where the reader is. Rendering is
//! left to an external [`renderer::Renderer`]; the engine tells it what to
//! show and turns its page-count reports into absolute page numbers.
//!
//! # Features
//!
//! - Container extraction into a per-book cache (zip crate or `unzip`)
//! - EPUB 3 navigation document and NCX table-of-contents parsing
//! - Tolerant TOC to spine resolution
//! - Chapter/sub-page navigation with queued restores and anchors
//! - Estimated and measured page counts, absolute pages and percentages
//! - Per-page reading time with a time gate
//! - Progress persistence in SQLite, including legacy record migration

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Configuration and CLI.
pub mod config;
/// Container extraction and content-root discovery.
pub mod container;
/// Database operations.
pub mod db;
/// Document structure parsing.
pub mod document;
/// Error types.
pub mod error;
/// Book model.
pub mod library;
/// Navigation state machine.
pub mod navigation;
/// Page accounting.
pub mod pagination;
/// Progress records and storage.
pub mod progress;
/// Reading-time tracking.
pub mod reading_time;
/// Renderer boundary.
pub mod renderer;
/// Reading sessions.
pub mod session;
/// TOC resolution.
pub mod toc;


pub use config::{Cli, Command, Config};
pub use db::Database;
pub use error::{AppError, Result};
pub use session::{ReaderSession, ReadingClock, SessionOptions};
