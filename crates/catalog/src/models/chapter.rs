use super::{IndexColumns, size_from_column, size_to_column, timestamp_from_column};
use crate::error::{Error, ErrorKind, Result};
use crate::types::{ArchiveSource, Chapter, ChapterId, MangaId, NewChapter};
use exn::ResultExt;

#[derive(sqlx::FromRow)]
pub(crate) struct ChapterRow {
    pub(crate) id: i64,
    pub(crate) manga_id: i64,
    pub(crate) number: i64,
    pub(crate) title: String,
    pub(crate) archive_path: String,
    pub(crate) folder: Option<String>,
    pub(crate) file_name: String,
    pub(crate) file_size: i64,
    #[sqlx(flatten)]
    pub(crate) index: IndexColumns,
    pub(crate) uploaded_at: i64,
}
impl TryFrom<ChapterRow> for Chapter {
    type Error = Error;
    fn try_from(row: ChapterRow) -> Result<Self> {
        Ok(Self {
            id: ChapterId(row.id),
            manga_id: MangaId(row.manga_id),
            number: u32::try_from(row.number).or_raise(|| ErrorKind::InvalidData("chapter number"))?,
            title: row.title,
            source: ArchiveSource {
                path: row.archive_path,
                folder: row.folder,
                file_name: row.file_name,
                size: size_from_column(row.file_size)?,
            },
            index: row.index.try_into()?,
            uploaded_at: timestamp_from_column(row.uploaded_at)?,
        })
    }
}

/// Column values of a chapter that hasn't been assigned an id yet.
pub(crate) struct ChapterValues {
    pub(crate) number: i64,
    pub(crate) title: String,
    pub(crate) archive_path: String,
    pub(crate) folder: Option<String>,
    pub(crate) file_name: String,
    pub(crate) file_size: i64,
    pub(crate) index: IndexColumns,
    pub(crate) uploaded_at: i64,
}
impl TryFrom<&NewChapter> for ChapterValues {
    type Error = Error;
    fn try_from(chapter: &NewChapter) -> Result<Self> {
        Ok(Self {
            number: i64::from(chapter.number),
            title: chapter.title.clone(),
            archive_path: chapter.source.path.clone(),
            folder: chapter.source.folder.clone(),
            file_name: chapter.source.file_name.clone(),
            file_size: size_to_column(chapter.source.size)?,
            index: IndexColumns::try_from(chapter.index.as_ref())?,
            uploaded_at: chapter.uploaded_at.unix_timestamp(),
        })
    }
}
