//! Library Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Failures from the archive, catalog
//! and storage crates stay attached as children of these kinds.

use derive_more::{Display, Error};
use koma_archive::error::{Error as ArchiveError, ErrorKind as ArchiveErrorKind};
use koma_catalog::{ChapterId, MangaId};

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// ### Rejections (fix the input, don't retry)
/// - [`ErrorKind::UnsupportedFormat`]
/// - [`ErrorKind::ArchiveCorrupt`]
/// - [`ErrorKind::ArchiveTooLarge`]
///
/// ### Lookups
/// - [`ErrorKind::MangaNotFound`]
/// - [`ErrorKind::ChapterNotFound`]
/// - [`ErrorKind::PageNotFound`]
/// - [`ErrorKind::CoverNotFound`]
///
/// ### Dependency Errors
/// - [`ErrorKind::Storage`]
/// - [`ErrorKind::Catalog`]
/// - [`ErrorKind::Config`]
/// - [`ErrorKind::Task`]
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The upload's extension isn't accepted for this operation.
    #[display("unsupported upload format: {_0}")]
    UnsupportedFormat(#[error(not(source))] String),
    /// The upload isn't a readable ZIP container.
    #[display("archive is corrupt or unreadable")]
    ArchiveCorrupt,
    /// The upload exceeds the configured entry or size limits.
    #[display("archive exceeds the configured limits")]
    ArchiveTooLarge,
    #[display("manga not found: {_0}")]
    MangaNotFound(#[error(not(source))] MangaId),
    #[display("chapter not found: {_0}")]
    ChapterNotFound(#[error(not(source))] ChapterId),
    #[display("page not found: {_0}")]
    PageNotFound(#[error(not(source))] String),
    /// Neither the manga's cover nor the placeholder could be read.
    #[display("cover not found for manga {_0}")]
    CoverNotFound(#[error(not(source))] MangaId),
    /// An image could not be decoded or re-encoded.
    #[display("image conversion failed")]
    Conversion,
    #[display("storage operation failed")]
    Storage,
    #[display("catalog operation failed")]
    Catalog,
    #[display("invalid configuration")]
    Config,
    /// A blocking worker panicked or was cancelled.
    #[display("background task failed")]
    Task,
}

impl ErrorKind {
    /// Convert an archive error into a library error, keeping the archive
    /// crate's `Exn` frame as a child in the error tree.
    #[track_caller]
    pub fn archive(err: ArchiveError) -> Error {
        let kind = match &*err {
            ArchiveErrorKind::TooManyEntries(_) | ArchiveErrorKind::TooLarge(_) => Self::ArchiveTooLarge,
            ArchiveErrorKind::EntryNotFound(path) | ArchiveErrorKind::UnreadableEntry(path) => {
                Self::PageNotFound(path.clone())
            },
            ArchiveErrorKind::Corrupt => Self::ArchiveCorrupt,
        };
        err.raise(kind)
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage | Self::Catalog | Self::Task)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::MangaNotFound(_) | Self::ChapterNotFound(_) | Self::PageNotFound(_) | Self::CoverNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::UnsupportedFormat("rar".to_string()).to_string(), "unsupported upload format: rar");
        assert_eq!(ErrorKind::MangaNotFound(MangaId(7)).to_string(), "manga not found: 7");
        assert_eq!(ErrorKind::PageNotFound("img-00009".to_string()).to_string(), "page not found: img-00009");
    }

    #[test]
    fn test_classification() {
        assert!(ErrorKind::Storage.is_retryable());
        assert!(!ErrorKind::ArchiveCorrupt.is_retryable());
        assert!(ErrorKind::ChapterNotFound(ChapterId(1)).is_not_found());
        assert!(!ErrorKind::Catalog.is_not_found());
    }

    #[test]
    fn test_archive_errors_are_translated() {
        let cases = [
            (ArchiveErrorKind::Corrupt, ErrorKind::ArchiveCorrupt),
            (ArchiveErrorKind::TooManyEntries(9), ErrorKind::ArchiveTooLarge),
            (ArchiveErrorKind::TooLarge(9), ErrorKind::ArchiveTooLarge),
            (ArchiveErrorKind::EntryNotFound("a.jpg".to_string()), ErrorKind::PageNotFound("a.jpg".to_string())),
        ];
        for (from, to) in cases {
            assert_eq!(*ErrorKind::archive(exn::Exn::from(from)), to);
        }
    }
}
