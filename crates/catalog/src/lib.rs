//! SQLite catalog of uploaded manga and their chapters.
//!
//! The catalog records what was uploaded, where the archive bytes live in
//! storage and, per chapter, the page index derived from the archive. The
//! archive itself remains the source of truth for page contents; a chapter
//! whose index is missing can always be re-derived from it.

mod db;
pub mod error;
mod models;
mod repo;
mod types;

pub use crate::db::Database;
pub use crate::repo::Repository;
pub use crate::types::{
    ArchiveSource, Chapter, ChapterId, ChapterUpdate, CoverAsset, Manga, MangaId, MangaUpdate, NewChapter, NewManga,
};
