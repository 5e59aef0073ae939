//! Turning uploads into catalog records.
//!
//! An upload is parsed completely before anything is written: a corrupt or
//! oversized archive is rejected with no stored file and no catalog record.
//! Archives are stored under the BLAKE3 of their bytes, so uploading the same
//! file twice stores it once.

use crate::cover::PreparedCover;
use crate::error::{ErrorKind, Result};
use crate::upload::{Upload, UploadKind};
use crate::{Library, open_archive};
use exn::ResultExt;
use koma_archive::{ChapterIndex, Conflict, Detection, ImageSet, chapter_title, collect_images, detect};
use koma_catalog::{ArchiveSource, Chapter, Manga, MangaId, NewChapter, NewManga};
use time::UtcDateTime;
use tracing::instrument;

/// A whole manga upload, with its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MangaUpload {
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub archive: Upload,
    /// Explicit cover image; derived from the archive when absent.
    pub cover: Option<Upload>,
}
impl MangaUpload {
    pub fn new(title: impl Into<String>, archive: Upload) -> Self {
        Self {
            title: title.into(),
            author: None,
            description: None,
            archive,
            cover: None,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_cover(mut self, cover: Upload) -> Self {
        self.cover = Some(cover);
        self
    }
}

/// A single chapter added to an existing manga. The whole archive is the
/// chapter, whatever its directory layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterUpload {
    pub number: u32,
    /// Defaults to "Chapter {number}".
    pub title: Option<String>,
    pub archive: Upload,
}
impl ChapterUpload {
    pub fn new(number: u32, archive: Upload) -> Self {
        Self {
            number,
            title: None,
            archive,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// What a manga ingestion produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ingested {
    pub manga: Manga,
    /// Ordered by chapter number. Empty when the archive held no page images.
    pub chapters: Vec<Chapter>,
    /// Chapter directories dropped because an earlier directory claimed the
    /// same number.
    pub conflicts: Vec<Conflict>,
}

/// Everything learned from an archive on the blocking pool.
struct Analysis {
    bytes: Vec<u8>,
    hash: String,
    detection: Detection,
    cover: Option<PreparedCover>,
}

// The catalog stores whole seconds.
fn now() -> UtcDateTime {
    let now = UtcDateTime::now();
    now.replace_nanosecond(0).unwrap_or(now)
}

fn reject_empty(upload: &Upload) -> Result<()> {
    if upload.bytes.is_empty() {
        tracing::warn!(file = %upload.file_name, "Rejecting empty upload");
        exn::bail!(ErrorKind::ArchiveCorrupt);
    }
    Ok(())
}

impl Library {
    /// Ingest a manga archive.
    ///
    /// Chapters are inferred from the archive layout and indexed up front.
    /// An archive without a single page image is still accepted and simply
    /// has no chapters.
    #[instrument(skip_all, fields(title = %upload.title, file = %upload.archive.file_name))]
    pub async fn ingest_manga(&self, upload: MangaUpload) -> Result<Ingested> {
        let MangaUpload {
            title,
            author,
            description,
            archive,
            cover,
        } = upload;
        let ext = UploadKind::Manga.accept(&archive)?;
        reject_empty(&archive)?;
        let cover = cover.filter(|cover| {
            if cover.bytes.is_empty() {
                tracing::warn!(file = %cover.file_name, "Ignoring empty cover upload");
            }
            !cover.bytes.is_empty()
        });

        let Upload { file_name, bytes } = archive;
        let settings = self.covers.clone();
        let limits = self.limits;
        let derive_cover = cover.is_none();
        let analysis = crate::blocking(move || {
            let mut archive = open_archive(bytes, limits)?;
            let detection = detect(archive.entries());
            let cover = if derive_cover {
                PreparedCover::from_archive(&mut archive, &settings)
            } else {
                None
            };
            let bytes = archive.into_inner();
            let hash = blake3::hash(&bytes).to_string();
            Ok(Analysis {
                bytes,
                hash,
                detection,
                cover,
            })
        })
        .await?;

        let cover = match cover {
            Some(upload) => self.prepare_cover(upload.file_name, upload.bytes).await?,
            None => analysis.cover.unwrap_or_else(|| PreparedCover::placeholder(&self.covers)),
        };
        if analysis.detection.is_empty() {
            tracing::warn!("No page images found; the manga will have no chapters");
        }

        let path = format!("files/{}.{ext}", analysis.hash);
        let shared = self.files.read().await;
        self.store(&path, &analysis.bytes).await?;
        if let Err(e) = self.store_cover(&cover).await {
            drop(shared);
            self.release_archive(&path).await;
            return Err(e);
        }

        let uploaded_at = now();
        let source = ArchiveSource {
            path: path.clone(),
            folder: None,
            file_name,
            size: analysis.bytes.len() as u64,
        };
        let Detection { chapters, conflicts } = analysis.detection;
        let chapters: Vec<NewChapter> = chapters
            .into_iter()
            .map(|chapter| NewChapter {
                number: chapter.number,
                title: chapter.title,
                source: ArchiveSource {
                    folder: chapter.folder,
                    ..source.clone()
                },
                index: Some(ChapterIndex::build(chapter.images)),
                uploaded_at,
            })
            .collect();
        let manga = NewManga {
            title,
            author,
            description,
            cover: cover.asset,
            source,
            archive_hash: analysis.hash,
            uploaded_at,
        };

        let inserted = self.repo.insert_manga(&manga, &chapters).await;
        drop(shared);
        let (manga, chapters) = match inserted {
            Ok(inserted) => inserted,
            Err(e) => {
                self.release_archive(&path).await;
                self.release_cover(&manga.cover.path).await;
                return Err(e).or_raise(|| ErrorKind::Catalog);
            },
        };
        tracing::info!(manga = %manga.id, chapters = chapters.len(), conflicts = conflicts.len(), "Ingested manga");
        Ok(Ingested {
            manga,
            chapters,
            conflicts,
        })
    }

    /// Add a chapter archive to an existing manga.
    #[instrument(skip(self, upload), fields(number = upload.number, file = %upload.archive.file_name))]
    pub async fn add_chapter(&self, manga_id: MangaId, upload: ChapterUpload) -> Result<Chapter> {
        self.find_manga(manga_id).await?;
        let ChapterUpload { number, title, archive } = upload;
        let ext = UploadKind::Chapter.accept(&archive)?;
        reject_empty(&archive)?;

        let Upload { file_name, bytes } = archive;
        let limits = self.limits;
        let (bytes, hash, images) = crate::blocking(move || {
            let archive = open_archive(bytes, limits)?;
            let images = collect_images(archive.entries(), None, ImageSet::Page);
            let bytes = archive.into_inner();
            let hash = blake3::hash(&bytes).to_string();
            Ok((bytes, hash, images))
        })
        .await?;
        if images.is_empty() {
            tracing::warn!("No page images found in chapter archive");
        }

        let path = format!("chapters/{hash}.{ext}");
        let shared = self.files.read().await;
        self.store(&path, &bytes).await?;
        let chapter = NewChapter {
            number,
            title: title.filter(|t| !t.trim().is_empty()).unwrap_or_else(|| chapter_title(number)),
            source: ArchiveSource {
                path: path.clone(),
                folder: None,
                file_name,
                size: bytes.len() as u64,
            },
            index: Some(ChapterIndex::build(images)),
            uploaded_at: now(),
        };
        let inserted = self.repo.insert_chapter(manga_id, &chapter).await;
        drop(shared);
        match inserted {
            Ok(chapter) => {
                tracing::info!(chapter = %chapter.id, pages = chapter.index.as_ref().map_or(0, ChapterIndex::len), "Added chapter");
                Ok(chapter)
            },
            Err(e) => {
                self.release_archive(&path).await;
                let kind = if e.is_not_found() {
                    ErrorKind::MangaNotFound(manga_id)
                } else {
                    ErrorKind::Catalog
                };
                Err(e.raise(kind))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use koma_archive::Limits;
    use koma_archive::fixtures::{zip_of, zip_with};
    use koma_catalog::Database;
    use koma_config::CoverConfig;
    use koma_storage::StorageBackend;
    use koma_storage::backend::MockBackend;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    fn paths(chapter: &Chapter) -> Vec<&str> {
        chapter.index.as_ref().unwrap().images().iter().map(String::as_str).collect()
    }

    #[tokio::test]
    async fn test_ingest_numbered_directories() {
        let Harness { library, backend } = harness().await;
        let page = png();
        let bytes = zip_with(&[
            ("10/", b""),
            ("10/a.jpg", &page),
            ("2/", b""),
            ("2/p10.jpg", &page),
            ("2/p2.jpg", &page),
            ("1/", b""),
            ("1/x.png", &page),
            ("extras/", b""),
            ("extras/cover.jpg", &page),
        ]);
        let size = bytes.len() as u64;
        let hash = blake3::hash(&bytes).to_string();
        let upload = MangaUpload::new("Berserk", Upload::new("berserk.cbz", bytes)).with_author("Kentaro Miura");
        let ingested = library.ingest_manga(upload).await.unwrap();

        let numbers: Vec<u32> = ingested.chapters.iter().map(|c| c.number).collect();
        assert_eq!(numbers, [1, 2, 10]);
        let titles: Vec<&str> = ingested.chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, ["Chapter 1", "Chapter 2", "Chapter 10"]);
        assert_eq!(paths(&ingested.chapters[1]), ["2/p2.jpg", "2/p10.jpg"]);
        assert_eq!(ingested.chapters[1].source.folder.as_deref(), Some("2/"));
        assert_eq!(ingested.chapters[1].index.as_ref().unwrap().resolve("img-00002"), Some("2/p10.jpg"));
        assert!(ingested.conflicts.is_empty());

        let manga = &ingested.manga;
        assert_eq!(manga.author.as_deref(), Some("Kentaro Miura"));
        assert_eq!(manga.archive_hash, hash);
        assert_eq!(manga.source.path, format!("files/{hash}.cbz"));
        assert_eq!(manga.source.size, size);
        assert_eq!(manga.source.file_name, "berserk.cbz");
        assert!(!manga.cover.degraded);
        assert!(manga.cover.path.starts_with("covers/cover-"));
        assert!(backend.exists(Path::new(&manga.source.path)).await.unwrap());
        assert!(backend.exists(Path::new(&manga.cover.path)).await.unwrap());

        let details = library.manga(manga.id).await.unwrap();
        assert_eq!(&details.manga, manga);
        assert_eq!(details.chapters, ingested.chapters);
    }

    #[tokio::test]
    async fn test_ingest_flat_archive_is_one_chapter() {
        let Harness { library, .. } = harness().await;
        let bytes = zip_of(&["scans/page10.jpg", "page2.webp", "notes.txt", "scans/page1.jpg"]);
        let ingested = library.ingest_manga(MangaUpload::new("Flat", Upload::new("flat.zip", bytes))).await.unwrap();
        assert_eq!(ingested.chapters.len(), 1);
        let chapter = &ingested.chapters[0];
        assert_eq!((chapter.number, chapter.title.as_str()), (1, "Chapter 1"));
        assert_eq!(chapter.source.folder, None);
        assert_eq!(paths(chapter), ["page2.webp", "scans/page1.jpg", "scans/page10.jpg"]);
    }

    #[tokio::test]
    async fn test_ingest_reports_duplicate_numbers() {
        let Harness { library, .. } = harness().await;
        let bytes = zip_of(&["01/", "01/a.jpg", "1/", "1/b.jpg", "2/", "2/c.jpg"]);
        let ingested = library.ingest_manga(MangaUpload::new("Dupes", Upload::new("d.zip", bytes))).await.unwrap();
        let numbers: Vec<u32> = ingested.chapters.iter().map(|c| c.number).collect();
        assert_eq!(numbers, [1, 2]);
        assert_eq!(paths(&ingested.chapters[0]), ["01/a.jpg"]);
        assert_eq!(
            ingested.conflicts,
            [Conflict {
                number: 1,
                kept: "01/".to_string(),
                dropped: "1/".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_ingest_without_images_uses_placeholder() {
        let Harness { library, backend } = harness().await;
        let bytes = zip_of(&["readme.txt", "1/", "1/notes.md"]);
        let ingested = library.ingest_manga(MangaUpload::new("Empty", Upload::new("e.zip", bytes))).await.unwrap();
        assert!(ingested.chapters.is_empty());
        assert_eq!(ingested.manga.cover.path, "covers/default-cover.jpg");
        assert!(!ingested.manga.cover.degraded);
        // Archive and placeholder only; the placeholder is never rewritten.
        assert_eq!(backend.paths().await.len(), 2);
        assert_eq!(backend.read(Path::new("covers/default-cover.jpg")).await.unwrap(), placeholder());
    }

    #[tokio::test]
    async fn test_ingest_explicit_cover() {
        let Harness { library, backend } = harness().await;
        let archive = Upload::new("a.zip", zip_of(&["1/", "1/a.jpg"]));
        let upload = MangaUpload::new("Cover", archive.clone()).with_cover(Upload::new("front.png", png()));
        let ingested = library.ingest_manga(upload).await.unwrap();
        let cover = backend.read(Path::new(&ingested.manga.cover.path)).await.unwrap();
        let decoded = image::load_from_memory(&cover).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (300, 400));

        let upload = MangaUpload::new("Broken cover", archive).with_cover(Upload::new("front.gif", b"GIF89a-cut".to_vec()));
        let ingested = library.ingest_manga(upload).await.unwrap();
        assert!(ingested.manga.cover.degraded);
        assert!(ingested.manga.cover.path.ends_with(".gif"));
        assert_eq!(ingested.manga.cover.content_type, "image/gif");
        assert_eq!(backend.read(Path::new(&ingested.manga.cover.path)).await.unwrap(), b"GIF89a-cut");
    }

    #[tokio::test]
    async fn test_ingest_accepts_zip_named_rar() {
        let Harness { library, .. } = harness().await;
        let upload = MangaUpload::new("Rar", Upload::new("series.cbr", zip_of(&["a.jpg"])));
        let ingested = library.ingest_manga(upload).await.unwrap();
        assert!(ingested.manga.source.path.ends_with(".cbr"));
        assert_eq!(ingested.chapters.len(), 1);
    }

    #[tokio::test]
    async fn test_ingest_rejections_store_nothing() {
        let Harness { library, backend } = harness().await;
        let cases = [
            (Upload::new("a.7z", zip_of(&["a.jpg"])), ErrorKind::UnsupportedFormat("7z".to_string())),
            (Upload::new("a.zip", b"PK but not really".to_vec()), ErrorKind::ArchiveCorrupt),
            (Upload::new("a.zip", Vec::new()), ErrorKind::ArchiveCorrupt),
        ];
        for (upload, expected) in cases {
            let err = library.ingest_manga(MangaUpload::new("Nope", upload)).await.unwrap_err();
            assert_eq!(*err, expected);
        }
        assert_eq!(backend.paths().await, [PathBuf::from("covers/default-cover.jpg")]);
    }

    #[tokio::test]
    async fn test_failed_cover_write_releases_archive() {
        let Harness { library, backend } = harness().await;
        // Undecodable, so it's kept under its own extension, which storage refuses.
        let cover = Upload::new("front.j\0pg", b"not an image".to_vec());
        let upload = MangaUpload::new("Orphan", Upload::new("o.zip", zip_of(&["a.jpg"]))).with_cover(cover);
        let err = library.ingest_manga(upload).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Storage);
        assert_eq!(backend.paths().await, [PathBuf::from("covers/default-cover.jpg")]);
    }

    #[tokio::test]
    async fn test_ingest_enforces_limits() {
        let backend = Arc::new(MockBackend::default());
        let db = Database::connect_in_memory().await.unwrap();
        let limits = Limits {
            max_entries: 2,
            ..Limits::default()
        };
        let library = Library::with_parts(backend, db, CoverConfig::default(), limits);
        let bytes = zip_of(&["a.jpg", "b.jpg", "c.jpg"]);
        let err = library.ingest_manga(MangaUpload::new("Big", Upload::new("big.zip", bytes))).await.unwrap_err();
        assert_eq!(*err, ErrorKind::ArchiveTooLarge);
    }

    #[tokio::test]
    async fn test_identical_uploads_share_storage() {
        let Harness { library, backend } = harness().await;
        let upload = MangaUpload::new("Twice", Upload::new("t.zip", zip_of(&["a.txt"])));
        let first = library.ingest_manga(upload.clone()).await.unwrap();
        let second = library.ingest_manga(upload).await.unwrap();
        assert_ne!(first.manga.id, second.manga.id);
        assert_eq!(first.manga.source.path, second.manga.source.path);
        assert_eq!(backend.paths().await.len(), 2);
    }

    #[tokio::test]
    async fn test_add_chapter() {
        let Harness { library, backend } = harness().await;
        let ingested = library
            .ingest_manga(MangaUpload::new("Host", Upload::new("h.zip", zip_of(&["1/", "1/a.jpg"]))))
            .await
            .unwrap();
        let id = ingested.manga.id;

        // Directory structure inside a chapter upload is irrelevant.
        let bytes = zip_of(&["5/", "5/b.png", "extra/a.jpg", "a.bmp"]);
        let chapter = library.add_chapter(id, ChapterUpload::new(7, Upload::new("c7.cbz", bytes))).await.unwrap();
        assert_eq!((chapter.number, chapter.title.as_str()), (7, "Chapter 7"));
        assert_eq!(paths(&chapter), ["5/b.png", "extra/a.jpg"]);
        assert!(chapter.source.path.starts_with("chapters/"));
        assert!(backend.exists(Path::new(&chapter.source.path)).await.unwrap());

        let upload = ChapterUpload::new(8, Upload::new("c8.zip", zip_of(&["p.jpg"]))).with_title("Extra");
        let chapter = library.add_chapter(id, upload).await.unwrap();
        assert_eq!(chapter.title, "Extra");

        let numbers: Vec<u32> = library.chapters(id).await.unwrap().iter().map(|c| c.number).collect();
        assert_eq!(numbers, [1, 7, 8]);
    }

    #[tokio::test]
    async fn test_add_chapter_rejections() {
        let Harness { library, .. } = harness().await;
        let err = library
            .add_chapter(MangaId(99), ChapterUpload::new(1, Upload::new("c.zip", zip_of(&["a.jpg"]))))
            .await
            .unwrap_err();
        assert_eq!(*err, ErrorKind::MangaNotFound(MangaId(99)));

        let ingested = library
            .ingest_manga(MangaUpload::new("Host", Upload::new("h.zip", zip_of(&["a.jpg"]))))
            .await
            .unwrap();
        let id = ingested.manga.id;
        // Whole manga uploads accept RAR names, chapters don't.
        let err = library
            .add_chapter(id, ChapterUpload::new(2, Upload::new("c.cbr", zip_of(&["a.jpg"]))))
            .await
            .unwrap_err();
        assert_eq!(*err, ErrorKind::UnsupportedFormat("cbr".to_string()));
        let err = library
            .add_chapter(id, ChapterUpload::new(2, Upload::new("c.zip", b"garbage".to_vec())))
            .await
            .unwrap_err();
        assert_eq!(*err, ErrorKind::ArchiveCorrupt);
        assert_eq!(library.chapters(id).await.unwrap().len(), 1);
    }
}
