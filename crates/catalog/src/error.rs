//! Catalog Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A catalog error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    #[display("manga not found: {_0}")]
    MangaNotFound(#[error(not(source))] i64),
    #[display("chapter not found: {_0}")]
    ChapterNotFound(#[error(not(source))] i64),
    /// A stored value could not be converted to or from its column.
    #[display("invalid catalog data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // SQLITE_BUSY after the busy timeout is the only transient failure
        // worth another attempt.
        matches!(self, Self::Database)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::MangaNotFound(_) | Self::ChapterNotFound(_))
    }
}
