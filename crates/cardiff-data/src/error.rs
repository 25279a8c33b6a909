//! Error types for data acquisition.

use thiserror::Error;

/// Result type for acquisition operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors that can occur while discovering, downloading or reading archives.
#[derive(Debug, Error)]
pub enum DataError {
    /// Network error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// HTTP error status
    #[error("HTTP error: {0}")]
    Http(String),

    /// Index page could not be interpreted
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// ZIP archive error
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Row sink error, surfaced from the consumer of extracted rows
    #[error("Sink error: {0}")]
    Sink(String),
}
