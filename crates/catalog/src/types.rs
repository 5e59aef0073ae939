//! Catalog records as seen by the rest of the workspace.

use derive_more::{Display, From};
use koma_archive::ChapterIndex;
use time::UtcDateTime;

#[derive(Debug, Display, From, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MangaId(pub i64);

#[derive(Debug, Display, From, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChapterId(pub i64);

/// Where a record's pages physically come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSource {
    /// Storage-relative path of the uploaded archive.
    pub path: String,
    /// Chapter directory inside the archive (with trailing slash), if the
    /// chapter doesn't span the whole archive.
    pub folder: Option<String>,
    /// Name of the file as it was uploaded.
    pub file_name: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverAsset {
    /// Storage-relative path of the cover image.
    pub path: String,
    pub content_type: String,
    /// The image could not be normalized and was stored as uploaded.
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manga {
    pub id: MangaId,
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub cover: CoverAsset,
    pub source: ArchiveSource,
    /// BLAKE3 of the uploaded archive, hex encoded.
    pub archive_hash: String,
    pub uploaded_at: UtcDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub id: ChapterId,
    pub manga_id: MangaId,
    pub number: u32,
    pub title: String,
    pub source: ArchiveSource,
    /// `None` until the chapter's pages have been enumerated.
    pub index: Option<ChapterIndex>,
    pub uploaded_at: UtcDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewManga {
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub cover: CoverAsset,
    pub source: ArchiveSource,
    pub archive_hash: String,
    pub uploaded_at: UtcDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChapter {
    pub number: u32,
    pub title: String,
    pub source: ArchiveSource,
    pub index: Option<ChapterIndex>,
    pub uploaded_at: UtcDateTime,
}

/// Replacement metadata for a manga. Every field is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MangaUpdate {
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub cover: CoverAsset,
}

/// Editable chapter fields; `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterUpdate {
    pub title: Option<String>,
    pub number: Option<u32>,
}

impl ChapterUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.number.is_none()
    }
}
