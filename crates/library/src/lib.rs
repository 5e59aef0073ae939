//! Manga library: ingestion, lazy indexing and page serving.
//!
//! [`Library`] ties the pieces together. Uploaded archives are parsed by
//! [`koma_archive`], their bytes kept in a [`koma_storage`] backend under
//! content-addressed names, and what was found recorded in the
//! [`koma_catalog`]. Pages are always read back out of the original archive
//! on demand; nothing is ever extracted to disk.
//!
//! All archive parsing, decompression and image re-encoding happens on
//! tokio's blocking pool. The [`Archive`] handle lives inside that closure
//! and is dropped with it, whichever way it exits.

mod cover;
mod edit;
pub mod error;
mod ingest;
mod page;
mod reindex;
mod upload;

pub use crate::cover::{CoverImage, normalize_cover, render_placeholder};
pub use crate::edit::MangaEdit;
pub use crate::ingest::{ChapterUpload, Ingested, MangaUpload};
pub use crate::page::{Page, resolve_token};
pub use crate::upload::{Upload, UploadKind};
pub use koma_catalog::{Chapter, ChapterId, ChapterUpdate, Manga, MangaId};

use crate::error::{ErrorKind, Result};
use derive_more::From;
use exn::ResultExt;
use koma_archive::{Archive, Limits};
use koma_catalog::{Database, Repository};
use koma_config::{Config, CoverConfig};
use koma_storage::BackendHandle;
use koma_storage::backend::LocalBackend;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::instrument;

/// Name given to the storage backend created by [`Library::open`].
pub const LOCAL_BACKEND: &str = "local";

/// The manga library service.
///
/// Cheap to clone; clones share the storage backend and database pool.
#[derive(Clone)]
pub struct Library {
    backend: BackendHandle,
    db: Database,
    repo: Repository,
    covers: CoverConfig,
    limits: Limits,
    /// Held shared from storing a file until the record that references it
    /// is committed, and exclusively while unreferenced files are removed.
    files: Arc<RwLock<()>>,
}

/// A manga together with its chapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MangaDetails {
    pub manga: Manga,
    /// Ordered by chapter number.
    pub chapters: Vec<Chapter>,
}

/// The record an archive download is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, From)]
pub enum ArchiveOwner {
    Manga(MangaId),
    Chapter(ChapterId),
}

/// An original upload, as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    /// Name of the file as it was uploaded.
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Library {
    /// Open the library described by `config`: a local storage backend at
    /// `storage.root` and the catalog database at `database.path`.
    #[instrument(skip_all, fields(root = %config.storage.root.display()))]
    pub async fn open(config: &Config) -> Result<Self> {
        config.validate().or_raise(|| ErrorKind::Config)?;
        let backend = LocalBackend::new(LOCAL_BACKEND, &config.storage.root).or_raise(|| ErrorKind::Storage)?;
        let db = Database::connect(&config.database.path).await.or_raise(|| ErrorKind::Catalog)?;
        let library = Self::with_parts(Arc::new(backend), db, config.covers.clone(), config.limits);
        library.ensure_placeholder().await?;
        Ok(library)
    }

    /// Assemble a library from already-constructed parts.
    ///
    /// Unlike [`Library::open`] this doesn't touch storage; call
    /// [`Library::ensure_placeholder`] if the backend may be empty.
    pub fn with_parts(backend: BackendHandle, db: Database, covers: CoverConfig, limits: Limits) -> Self {
        let repo = Repository::from(&db);
        Self {
            backend,
            db,
            repo,
            covers,
            limits,
            files: Arc::new(RwLock::new(())),
        }
    }

    /// Close the catalog, waiting for in-flight queries.
    pub async fn close(&self) {
        self.db.close().await;
    }

    // =========================================================================
    // Read surface
    // =========================================================================

    /// A manga record with its chapters.
    pub async fn manga(&self, id: MangaId) -> Result<MangaDetails> {
        let manga = self.find_manga(id).await?;
        let chapters = self.repo.list_chapters(id).await.or_raise(|| ErrorKind::Catalog)?;
        Ok(MangaDetails { manga, chapters })
    }

    /// Chapters of a manga, ordered by chapter number.
    pub async fn chapters(&self, id: MangaId) -> Result<Vec<Chapter>> {
        self.find_manga(id).await?;
        self.repo.list_chapters(id).await.or_raise(|| ErrorKind::Catalog)
    }

    /// The original archive bytes of a manga or chapter upload.
    #[instrument(skip_all)]
    pub async fn archive(&self, owner: impl Into<ArchiveOwner>) -> Result<Download> {
        let owner = owner.into();
        tracing::debug!(?owner, "Fetching original archive");
        let source = match owner {
            ArchiveOwner::Manga(id) => self.find_manga(id).await?.source,
            ArchiveOwner::Chapter(id) => self.find_chapter(id).await?.source,
        };
        let bytes = self.backend.read(Path::new(&source.path)).await.or_raise(|| ErrorKind::Storage)?;
        Ok(Download {
            file_name: source.file_name,
            bytes,
        })
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn find_manga(&self, id: MangaId) -> Result<Manga> {
        self.repo
            .get_manga(id)
            .await
            .or_raise(|| ErrorKind::Catalog)?
            .ok_or_else(|| exn::Exn::from(ErrorKind::MangaNotFound(id)))
    }

    async fn find_chapter(&self, id: ChapterId) -> Result<Chapter> {
        self.repo
            .get_chapter(id)
            .await
            .or_raise(|| ErrorKind::Catalog)?
            .ok_or_else(|| exn::Exn::from(ErrorKind::ChapterNotFound(id)))
    }

    /// Write a content-addressed file unless it is already stored.
    async fn store(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let path = Path::new(path);
        if self.backend.exists(path).await.or_raise(|| ErrorKind::Storage)? {
            tracing::debug!(path = %path.display(), "Identical content already stored");
            return Ok(());
        }
        self.backend.write(path, bytes).await.or_raise(|| ErrorKind::Storage)
    }

    /// Delete a stored archive once no catalog record points at it any more.
    ///
    /// Best effort: the records are already gone, so a failure here only
    /// leaves an orphaned file behind. Never call it while holding `files`.
    async fn release_archive(&self, path: &str) {
        let _exclusive = self.files.write().await;
        match self.repo.archive_references(path).await {
            Ok(0) => self.remove(path).await,
            Ok(_) => tracing::debug!(path, "Archive still referenced; keeping it"),
            Err(e) => tracing::warn!(path, error = ?e, "Could not count archive references"),
        }
    }

    /// Delete a stored cover unless it is the shared placeholder or still in use.
    async fn release_cover(&self, path: &str) {
        if path == self.covers.placeholder {
            return;
        }
        let _exclusive = self.files.write().await;
        match self.repo.cover_references(path).await {
            Ok(0) => self.remove(path).await,
            Ok(_) => tracing::debug!(path, "Cover still referenced; keeping it"),
            Err(e) => tracing::warn!(path, error = ?e, "Could not count cover references"),
        }
    }

    async fn remove(&self, path: &str) {
        match self.backend.delete(Path::new(path)).await {
            Ok(()) => tracing::debug!(path, "Removed stored file"),
            Err(e) if e.is_not_found() => {},
            Err(e) => tracing::warn!(path, error = ?e, "Could not remove stored file"),
        }
    }
}

/// Run synchronous archive or image work on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.or_raise(|| ErrorKind::Task)?
}

fn open_archive(bytes: Vec<u8>, limits: Limits) -> Result<Archive> {
    Archive::open(bytes, limits).map_err(ErrorKind::archive)
}
