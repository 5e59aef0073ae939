use super::{size_from_column, size_to_column, timestamp_from_column};
use crate::error::{Error, Result};
use crate::types::{ArchiveSource, CoverAsset, Manga, MangaId, NewManga};

#[derive(sqlx::FromRow)]
pub(crate) struct MangaRow {
    pub(crate) id: i64,
    pub(crate) title: String,
    pub(crate) author: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) cover_path: String,
    pub(crate) cover_content_type: String,
    pub(crate) cover_degraded: bool,
    pub(crate) archive_path: String,
    pub(crate) file_name: String,
    pub(crate) file_size: i64,
    pub(crate) archive_hash: String,
    pub(crate) uploaded_at: i64,
}
impl TryFrom<MangaRow> for Manga {
    type Error = Error;
    fn try_from(row: MangaRow) -> Result<Self> {
        Ok(Self {
            id: MangaId(row.id),
            title: row.title,
            author: row.author,
            description: row.description,
            cover: CoverAsset {
                path: row.cover_path,
                content_type: row.cover_content_type,
                degraded: row.cover_degraded,
            },
            source: ArchiveSource {
                path: row.archive_path,
                folder: None,
                file_name: row.file_name,
                size: size_from_column(row.file_size)?,
            },
            archive_hash: row.archive_hash,
            uploaded_at: timestamp_from_column(row.uploaded_at)?,
        })
    }
}

/// Column values of a manga that hasn't been assigned an id yet.
pub(crate) struct MangaValues {
    pub(crate) title: String,
    pub(crate) author: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) cover_path: String,
    pub(crate) cover_content_type: String,
    pub(crate) cover_degraded: bool,
    pub(crate) archive_path: String,
    pub(crate) file_name: String,
    pub(crate) file_size: i64,
    pub(crate) archive_hash: String,
    pub(crate) uploaded_at: i64,
}
impl TryFrom<&NewManga> for MangaValues {
    type Error = Error;
    fn try_from(manga: &NewManga) -> Result<Self> {
        Ok(Self {
            title: manga.title.clone(),
            author: manga.author.clone(),
            description: manga.description.clone(),
            cover_path: manga.cover.path.clone(),
            cover_content_type: manga.cover.content_type.clone(),
            cover_degraded: manga.cover.degraded,
            archive_path: manga.source.path.clone(),
            file_name: manga.source.file_name.clone(),
            file_size: size_to_column(manga.source.size)?,
            archive_hash: manga.archive_hash.clone(),
            uploaded_at: manga.uploaded_at.unix_timestamp(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use time::UtcDateTime;

    fn row() -> MangaRow {
        MangaRow {
            id: 7,
            title: "Yotsuba&!".to_string(),
            author: Some("Kiyohiko Azuma".to_string()),
            description: None,
            cover_path: "covers/cover-ab12.jpg".to_string(),
            cover_content_type: "image/jpeg".to_string(),
            cover_degraded: false,
            archive_path: "files/ab12.cbz".to_string(),
            file_name: "Yotsuba v01.cbz".to_string(),
            file_size: 52_428_800,
            archive_hash: "ab12".to_string(),
            uploaded_at: 1_772_000_000,
        }
    }

    #[test]
    fn test_row_to_model() {
        let manga = Manga::try_from(row()).unwrap();
        assert_eq!(manga.id, MangaId(7));
        assert_eq!(manga.source.size, 52_428_800);
        assert_eq!(manga.source.folder, None);
        assert_eq!(manga.uploaded_at.unix_timestamp(), 1_772_000_000);
    }

    #[test]
    fn test_negative_size_is_invalid() {
        let mut row = row();
        row.file_size = -1;
        let err = Manga::try_from(row).unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidData("file size"));
    }

    #[test]
    fn test_model_to_values() {
        let uploaded_at = UtcDateTime::now();
        let manga = NewManga {
            title: "Yotsuba&!".to_string(),
            author: None,
            description: Some("Enjoy everything.".to_string()),
            cover: CoverAsset {
                path: "covers/default-cover.jpg".to_string(),
                content_type: "image/jpeg".to_string(),
                degraded: false,
            },
            source: ArchiveSource {
                path: "files/ab12.cbz".to_string(),
                folder: None,
                file_name: "y.cbz".to_string(),
                size: 10,
            },
            archive_hash: "ab12".to_string(),
            uploaded_at,
        };
        let values = MangaValues::try_from(&manga).unwrap();
        assert_eq!(values.file_size, 10);
        assert_eq!(values.uploaded_at, uploaded_at.unix_timestamp());
    }
}
