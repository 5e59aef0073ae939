//! Local filesystem storage backend.

use crate::error::ErrorKind;
use crate::{StorageBackend, error::Result, path::validate as validate_path};
use async_trait::async_trait;
use std::fs::create_dir_all as sync_create_dir;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Stores objects as plain files below a root directory.
///
/// # Examples
///
/// ```no_run
/// use koma_storage::backend::LocalBackend;
///
/// # fn example() -> koma_storage::error::Result<()> {
/// let backend = LocalBackend::new("uploads", "/var/lib/koma/uploads")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend.
    ///
    /// The root must be absolute. It is created if it doesn't exist yet.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Only happens once at startup; not worth an async constructor.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }
        Ok(Self { name: name.into(), root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)?)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::read(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        let Some(parent) = abs_path.parent().map(Path::to_path_buf) else {
            exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
        };
        fs::create_dir_all(&parent).await.map_err(|e| Self::map_io_error(e, path))?;
        // Each writer renames its own temporary file into place.
        let data = data.to_vec();
        let written = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut partial = tempfile::Builder::new().prefix(".").suffix(".partial").tempfile_in(&parent)?;
            partial.write_all(&data)?;
            partial.persist(&abs_path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| ErrorKind::BackendError(e.to_string()))?;
        written.map_err(|e| Self::map_io_error(e, path))?;
        tracing::trace!(backend = %self.name, path = %path.display(), "Wrote file");
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::remove_file(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }
}
