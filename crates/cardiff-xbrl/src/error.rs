//! Error types for accounts extraction.

use thiserror::Error;

/// Result type for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Errors that can occur while extracting rows from an accounts document.
///
/// Only [`ExtractError::BadFilename`] ever reaches the caller of
/// [`document_to_rows`](crate::document_to_rows); the other kinds are trapped
/// inside the engine and reported through the row's `error` column.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    /// Filename does not match the bulk-data naming convention
    #[error("filename does not match accounts naming convention: {0}")]
    BadFilename(String),

    /// Document could not be parsed even in recovery mode
    #[error("malformed XML: {0}")]
    BadXml(String),

    /// A date could not be parsed from the fact text
    #[error("unparseable date: {0}")]
    BadDate(String),

    /// A fact value could not be coerced to its column type
    #[error("unparseable value: {0}")]
    BadValue(String),
}
