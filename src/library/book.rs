//! Book metadata model.

use crate::document::Metadata;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// A document the reader can open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    /// Unique identifier for the book; also names its extraction cache.
    pub id: String,

    /// Book title.
    pub title: String,

    /// Authors (may be empty).
    pub authors: Vec<String>,

    /// Language code (e.g., "en", "fr").
    pub language: Option<String>,

    /// Path to the book file.
    pub path: PathBuf,
}

impl Book {
    /// Create a new book with minimal information.
    pub fn new(path: PathBuf) -> Self {
        let title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Unknown")
            .to_string();

        // Generate a deterministic UUID based on the file path
        let id = Uuid::new_v5(&Uuid::NAMESPACE_URL, path.to_string_lossy().as_bytes()).to_string();

        Self {
            id,
            title,
            authors: Vec::new(),
            language: None,
            path,
        }
    }

    /// Overwrite file-derived fields with what the package declares.
    pub fn apply_metadata(&mut self, metadata: &Metadata) {
        if let Some(title) = metadata.title.as_ref().filter(|t| !t.is_empty()) {
            self.title = title.clone();
        }
        if !metadata.authors.is_empty() {
            self.authors = metadata.authors.clone();
        }
        if metadata.language.is_some() {
            self.language = metadata.language.clone();
        }
    }

    /// Get the filename of the book.
    pub fn filename(&self) -> &str {
        self.path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
    }

    /// Get display name for authors.
    pub fn authors_display(&self) -> String {
        if self.authors.is_empty() {
            "Unknown Author".to_string()
        } else {
            self.authors.join(", ")
        }
    }
}
