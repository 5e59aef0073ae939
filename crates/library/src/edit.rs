//! Metadata edits and deletion.
//!
//! Stored files are shared between records whenever their content is
//! identical, so a file is only removed once the catalog no longer
//! references it. The cover placeholder is never removed.

use crate::Library;
use crate::error::{ErrorKind, Result};
use crate::upload::Upload;
use exn::ResultExt;
use futures::future::join_all;
use koma_catalog::{Chapter, ChapterId, ChapterUpdate, Manga, MangaId, MangaUpdate};
use std::collections::BTreeSet;
use tracing::instrument;

/// Replacement metadata for a manga.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MangaEdit {
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    /// A new cover image; the current cover is kept when absent.
    pub cover: Option<Upload>,
}

fn raise_catalog(e: koma_catalog::error::Error, not_found: ErrorKind) -> crate::error::Error {
    let kind = if e.is_not_found() { not_found } else { ErrorKind::Catalog };
    e.raise(kind)
}

impl Library {
    #[instrument(skip(self, edit), fields(title = %edit.title))]
    pub async fn update_manga(&self, id: MangaId, edit: MangaEdit) -> Result<Manga> {
        let current = self.find_manga(id).await?;
        let MangaEdit {
            title,
            author,
            description,
            cover,
        } = edit;

        let prepared = match cover.filter(|cover| !cover.bytes.is_empty()) {
            Some(upload) => Some(self.prepare_cover(upload.file_name, upload.bytes).await?),
            None => None,
        };
        let shared = self.files.read().await;
        let cover = match prepared {
            Some(prepared) => {
                self.store_cover(&prepared).await?;
                prepared.asset
            },
            None => current.cover.clone(),
        };
        let update = MangaUpdate {
            title,
            author,
            description,
            cover,
        };
        let updated = self.repo.update_manga(id, &update).await;
        drop(shared);
        if let Err(e) = updated {
            if update.cover.path != current.cover.path {
                self.release_cover(&update.cover.path).await;
            }
            return Err(raise_catalog(e, ErrorKind::MangaNotFound(id)));
        }
        if update.cover.path != current.cover.path {
            self.release_cover(&current.cover.path).await;
        }
        self.find_manga(id).await
    }

    /// Change a chapter's title and/or number. Its pages never change.
    #[instrument(skip(self))]
    pub async fn edit_chapter(&self, id: ChapterId, update: ChapterUpdate) -> Result<Chapter> {
        if !update.is_empty() {
            self.repo
                .update_chapter(id, &update)
                .await
                .map_err(|e| raise_catalog(e, ErrorKind::ChapterNotFound(id)))?;
        }
        self.find_chapter(id).await
    }

    #[instrument(skip(self))]
    pub async fn delete_chapter(&self, id: ChapterId) -> Result<()> {
        let chapter = self.find_chapter(id).await?;
        self.repo
            .delete_chapter(id)
            .await
            .map_err(|e| raise_catalog(e, ErrorKind::ChapterNotFound(id)))?;
        self.release_archive(&chapter.source.path).await;
        tracing::info!(manga = %chapter.manga_id, number = chapter.number, "Deleted chapter");
        Ok(())
    }

    /// Delete a manga, its chapters, and every stored file only they used.
    #[instrument(skip(self))]
    pub async fn delete_manga(&self, id: MangaId) -> Result<()> {
        let manga = self.find_manga(id).await?;
        let chapters = self.repo.list_chapters(id).await.or_raise(|| ErrorKind::Catalog)?;
        self.repo
            .delete_manga(id)
            .await
            .map_err(|e| raise_catalog(e, ErrorKind::MangaNotFound(id)))?;

        let archives: BTreeSet<&str> = std::iter::once(manga.source.path.as_str())
            .chain(chapters.iter().map(|chapter| chapter.source.path.as_str()))
            .collect();
        join_all(archives.into_iter().map(|path| self.release_archive(path))).await;
        self.release_cover(&manga.cover.path).await;
        tracing::info!(title = %manga.title, chapters = chapters.len(), "Deleted manga");
        Ok(())
    }
}
