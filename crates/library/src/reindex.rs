//! Lazy chapter indexing.
//!
//! A chapter whose index was never persisted gets it built from its archive
//! the first time its pages are asked for. Building is a pure function of the
//! archive bytes, so two requests racing to index the same chapter compute
//! identical indexes and the last write wins harmlessly. A chapter that
//! really has no pages keeps its persisted empty index.

use crate::error::{ErrorKind, Result};
use crate::{Library, open_archive};
use exn::ResultExt;
use koma_archive::{Archive, ChapterIndex, ImageSet, collect_images};
use koma_catalog::{Chapter, ChapterId};
use std::path::Path;
use tracing::instrument;

/// Index the page images of `folder` (the whole archive when `None`).
pub(crate) fn index_archive(archive: &Archive, folder: Option<&str>) -> ChapterIndex {
    ChapterIndex::build(collect_images(archive.entries(), folder, ImageSet::Page))
}

impl Library {
    /// The ordered pages of a chapter, with their identifiers.
    #[instrument(skip(self))]
    pub async fn pages(&self, id: ChapterId) -> Result<ChapterIndex> {
        let chapter = self.find_chapter(id).await?;
        match &chapter.index {
            Some(index) => Ok(index.clone()),
            None => self.rebuild_index(&chapter).await,
        }
    }

    /// Rebuild and persist a chapter's index, whether or not it has one.
    pub async fn reindex(&self, id: ChapterId) -> Result<ChapterIndex> {
        let chapter = self.find_chapter(id).await?;
        self.rebuild_index(&chapter).await
    }

    #[instrument(skip_all, fields(chapter = %chapter.id, folder = ?chapter.source.folder))]
    async fn rebuild_index(&self, chapter: &Chapter) -> Result<ChapterIndex> {
        let bytes = self.backend.read(Path::new(&chapter.source.path)).await.or_raise(|| ErrorKind::Storage)?;
        let folder = chapter.source.folder.clone();
        let limits = self.limits;
        let index = crate::blocking(move || {
            let archive = open_archive(bytes, limits)?;
            Ok(index_archive(&archive, folder.as_deref()))
        })
        .await?;
        self.persist_index(chapter.id, &index).await?;
        Ok(index)
    }

    pub(crate) async fn persist_index(&self, id: ChapterId, index: &ChapterIndex) -> Result<()> {
        if let Err(e) = self.repo.replace_chapter_index(id, index).await {
            let kind = if e.is_not_found() {
                ErrorKind::ChapterNotFound(id)
            } else {
                ErrorKind::Catalog
            };
            return Err(e.raise(kind));
        }
        tracing::info!(chapter = %id, pages = index.len(), "Rebuilt chapter index");
        Ok(())
    }
}
