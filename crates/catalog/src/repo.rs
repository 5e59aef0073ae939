//! Repository for manga and chapter records.
//!
//! A manga owns its chapters: deleting a manga cascades to every chapter row.
//! Archive and cover files are not this crate's business, but callers need to
//! know whether a stored file is still referenced before deleting it, hence
//! the reference-count queries.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{ChapterRow, ChapterValues, IndexColumns, MangaRow, MangaValues};
use crate::types::{Chapter, ChapterId, ChapterUpdate, Manga, MangaId, MangaUpdate, NewChapter, NewManga};
use exn::ResultExt;
use koma_archive::ChapterIndex;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Insert a manga together with all of its chapters.
    ///
    /// Either everything is persisted or nothing is.
    #[instrument(skip_all, fields(title = %manga.title, chapters = chapters.len()))]
    pub async fn insert_manga(&self, manga: &NewManga, chapters: &[NewChapter]) -> Result<(Manga, Vec<Chapter>)> {
        let values = MangaValues::try_from(manga)?;
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let id: i64 = sqlx::query_scalar(include_str!("../queries/insert_manga.sql"))
            .bind(values.title)
            .bind(values.author)
            .bind(values.description)
            .bind(values.cover_path)
            .bind(values.cover_content_type)
            .bind(values.cover_degraded)
            .bind(values.archive_path)
            .bind(values.file_name)
            .bind(values.file_size)
            .bind(values.archive_hash)
            .bind(values.uploaded_at)
            .fetch_one(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let manga_id = MangaId(id);
        let mut inserted = Vec::with_capacity(chapters.len());
        for chapter in chapters {
            inserted.push(Self::insert_chapter_in(&mut tx, manga_id, chapter).await?);
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        let manga = Manga {
            id: manga_id,
            title: manga.title.clone(),
            author: manga.author.clone(),
            description: manga.description.clone(),
            cover: manga.cover.clone(),
            source: manga.source.clone(),
            archive_hash: manga.archive_hash.clone(),
            uploaded_at: manga.uploaded_at,
        };
        Ok((manga, inserted))
    }

    /// Add a chapter to an existing manga.
    #[instrument(skip(self, chapter), fields(number = chapter.number))]
    pub async fn insert_chapter(&self, manga_id: MangaId, chapter: &NewChapter) -> Result<Chapter> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM mangas WHERE id = ?")
            .bind(manga_id.0)
            .fetch_optional(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if exists.is_none() {
            exn::bail!(ErrorKind::MangaNotFound(manga_id.0));
        }
        let inserted = Self::insert_chapter_in(&mut tx, manga_id, chapter).await?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(inserted)
    }

    async fn insert_chapter_in(
        tx: &mut Transaction<'_, Sqlite>,
        manga_id: MangaId,
        chapter: &NewChapter,
    ) -> Result<Chapter> {
        let values = ChapterValues::try_from(chapter)?;
        let id: i64 = sqlx::query_scalar(include_str!("../queries/insert_chapter.sql"))
            .bind(manga_id.0)
            .bind(values.number)
            .bind(values.title)
            .bind(values.archive_path)
            .bind(values.folder)
            .bind(values.file_name)
            .bind(values.file_size)
            .bind(values.index.index_version)
            .bind(values.index.image_list)
            .bind(values.index.image_id_map)
            .bind(values.uploaded_at)
            .fetch_one(&mut **tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(Chapter {
            id: ChapterId(id),
            manga_id,
            number: chapter.number,
            title: chapter.title.clone(),
            source: chapter.source.clone(),
            index: chapter.index.clone(),
            uploaded_at: chapter.uploaded_at,
        })
    }

    // =========================================================================
    // Get/Fetch
    // =========================================================================

    pub async fn get_manga(&self, id: MangaId) -> Result<Option<Manga>> {
        let row: Option<MangaRow> = sqlx::query_as(include_str!("../queries/get_manga.sql"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Manga::try_from).transpose()
    }

    pub async fn get_chapter(&self, id: ChapterId) -> Result<Option<Chapter>> {
        let row: Option<ChapterRow> = sqlx::query_as(include_str!("../queries/get_chapter.sql"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Chapter::try_from).transpose()
    }

    /// Chapters of a manga, ordered by chapter number (then creation order).
    pub async fn list_chapters(&self, manga_id: MangaId) -> Result<Vec<Chapter>> {
        let rows: Vec<ChapterRow> = sqlx::query_as(include_str!("../queries/list_chapters.sql"))
            .bind(manga_id.0)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Chapter::try_from).collect()
    }

    /// How many manga and chapter records point at an archive path.
    pub async fn archive_references(&self, path: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../queries/count_archive_references.sql"))
            .bind(path)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("reference count"))
    }

    /// How many manga records use a cover path.
    pub async fn cover_references(&self, path: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../queries/count_cover_references.sql"))
            .bind(path)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("reference count"))
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Overwrite a chapter's persisted index.
    ///
    /// Always a full replacement; concurrent writers of the same index simply
    /// overwrite each other.
    pub async fn replace_chapter_index(&self, id: ChapterId, index: &ChapterIndex) -> Result<()> {
        let columns = IndexColumns::try_from(Some(index))?;
        let result = sqlx::query(include_str!("../queries/replace_chapter_index.sql"))
            .bind(columns.index_version)
            .bind(columns.image_list)
            .bind(columns.image_id_map)
            .bind(id.0)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::ChapterNotFound(id.0));
        }
        Ok(())
    }

    pub async fn update_chapter(&self, id: ChapterId, update: &ChapterUpdate) -> Result<()> {
        let result = sqlx::query(include_str!("../queries/update_chapter.sql"))
            .bind(update.title.as_deref())
            .bind(update.number.map(i64::from))
            .bind(id.0)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::ChapterNotFound(id.0));
        }
        Ok(())
    }

    pub async fn update_manga(&self, id: MangaId, update: &MangaUpdate) -> Result<()> {
        let result = sqlx::query(include_str!("../queries/update_manga.sql"))
            .bind(&update.title)
            .bind(update.author.as_deref())
            .bind(update.description.as_deref())
            .bind(&update.cover.path)
            .bind(&update.cover.content_type)
            .bind(update.cover.degraded)
            .bind(id.0)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::MangaNotFound(id.0));
        }
        Ok(())
    }

    // =========================================================================
    // Delete
    // =========================================================================

    pub async fn delete_chapter(&self, id: ChapterId) -> Result<()> {
        let result = sqlx::query(include_str!("../queries/delete_chapter.sql"))
            .bind(id.0)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::ChapterNotFound(id.0));
        }
        Ok(())
    }

    /// Delete a manga and, by cascade, all of its chapters.
    pub async fn delete_manga(&self, id: MangaId) -> Result<()> {
        let result = sqlx::query(include_str!("../queries/delete_manga.sql"))
            .bind(id.0)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::MangaNotFound(id.0));
        }
        Ok(())
    }
}
