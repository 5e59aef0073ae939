//! Archive Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// An archive error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The container could not be parsed at all. Don't retry with the same input.
    #[display("archive is corrupt or not a ZIP container")]
    Corrupt,
    /// The requested entry does not exist in the archive.
    #[display("entry not found: {_0}")]
    EntryNotFound(#[error(not(source))] String),
    /// The entry exists but its contents could not be decompressed.
    #[display("entry could not be read: {_0}")]
    UnreadableEntry(#[error(not(source))] String),
    /// The archive lists more entries than the configured limit.
    #[display("archive has too many entries ({_0})")]
    TooManyEntries(#[error(not(source))] usize),
    /// The declared uncompressed size exceeds the configured limit.
    #[display("archive expands to too many bytes ({_0})")]
    TooLarge(#[error(not(source))] u64),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Archives are immutable byte buffers; the same input always gives
        // the same answer.
        false
    }
}
