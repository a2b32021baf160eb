use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the engine.
#[derive(Error, Debug)]
pub enum AppError {
    /// The document file does not exist.
    #[error("Book not found: {0}")]
    NotFound(String),

    /// The container could not be unpacked into the cache directory.
    #[error("Extraction failed (exit code {exit_code:?}): {reason}")]
    ExtractionFailed {
        /// Exit status of the extraction process, if one was spawned.
        exit_code: Option<i32>,
        /// Human readable cause.
        reason: String,
    },

    /// The package descriptor is missing, unparsable or structurally invalid.
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    /// No package descriptor was found under the extraction root.
    #[error("Content root not found under {}", .0.display())]
    ContentRootNotFound(PathBuf),

    /// A spine item references an id the manifest does not declare.
    #[error("Resource not found in manifest: {0}")]
    ResourceNotFoundInManifest(String),

    /// A page identifier is not of the form `"{chapter}-{sub_page}"`.
    #[error("Invalid page identifier: {0}")]
    InvalidPageId(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP archive error.
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// XML parsing error.
    #[error("XML parsing error: {0}")]
    Xml(#[from] roxmltree::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (storage, task join).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Message shown when a book cannot be opened.
    pub fn user_message(&self) -> String {
        match self {
            AppError::NotFound(path) => format!("Book file not found at: {}", path),
            AppError::ExtractionFailed { .. } => {
                "The book could not be opened: its archive could not be unpacked.".to_string()
            }
            AppError::MalformedDocument(_) => {
                "The book could not be opened: its structure could not be read.".to_string()
            }
            other => format!("Failed to load book: {}", other),
        }
    }
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, AppError>;
