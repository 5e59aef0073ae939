//! Cover normalization and storage.
//!
//! Every cover is re-encoded to the same canvas and codec so that listings
//! look uniform whatever was uploaded. An image that can't be decoded is
//! kept verbatim instead (the cover is then marked degraded); a manga with
//! no usable image at all shares the configured placeholder, which the
//! library renders itself when storage doesn't have one.

use crate::Library;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ExtendedColorType, ImageEncoder, ImageFormat, Rgb, RgbImage};
use koma_archive::{Archive, content_type, extension, select_cover};
use koma_catalog::{CoverAsset, MangaId};
use koma_config::CoverConfig;
use std::io::Cursor;
use std::path::Path;
use tracing::instrument;

const NORMALIZED_CONTENT_TYPE: &str = "image/jpeg";
const PLACEHOLDER_FILL: Rgb<u8> = Rgb([214, 210, 204]);

/// Cover bytes ready to be served.
#[derive(Clone, PartialEq, Eq)]
pub struct CoverImage {
    pub content_type: String,
    pub bytes: Vec<u8>,
}
impl std::fmt::Debug for CoverImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoverImage")
            .field("content_type", &self.content_type)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Decode an image, fill the configured canvas (center crop) and re-encode
/// it as JPEG at the configured quality.
#[instrument(skip_all, fields(size = bytes.len()))]
pub fn normalize_cover(bytes: &[u8], settings: &CoverConfig) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(bytes).or_raise(|| ErrorKind::Conversion)?;
    // JPEG has no alpha channel.
    let canvas = decoded.resize_to_fill(settings.width, settings.height, FilterType::Lanczos3).to_rgb8();
    encode_jpeg(&canvas, settings.quality)
}

/// The built-in placeholder cover: a plain canvas of the configured size,
/// encoded in the format the placeholder's file name asks for (JPEG when it
/// names none that can be written).
pub fn render_placeholder(settings: &CoverConfig) -> Result<Vec<u8>> {
    let canvas = RgbImage::from_pixel(settings.width, settings.height, PLACEHOLDER_FILL);
    match ImageFormat::from_path(&settings.placeholder) {
        Ok(format) if format != ImageFormat::Jpeg && format.can_write() => {
            let mut buffer = Cursor::new(Vec::new());
            canvas.write_to(&mut buffer, format).or_raise(|| ErrorKind::Conversion)?;
            Ok(buffer.into_inner())
        },
        _ => encode_jpeg(&canvas, settings.quality),
    }
}

fn encode_jpeg(canvas: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, quality)
        .write_image(canvas.as_raw(), canvas.width(), canvas.height(), ExtendedColorType::Rgb8)
        .or_raise(|| ErrorKind::Conversion)?;
    Ok(encoded)
}

/// A cover decided on but not yet written to storage.
pub(crate) struct PreparedCover {
    pub asset: CoverAsset,
    /// `None` when the asset is the shared placeholder, which is never written.
    pub bytes: Option<Vec<u8>>,
}
impl PreparedCover {
    /// Normalize an image, falling back to its original bytes.
    ///
    /// `name` is the uploaded file name or archive entry path; its extension
    /// names the degraded file.
    pub fn from_image(name: &str, bytes: Vec<u8>, settings: &CoverConfig) -> Self {
        match normalize_cover(&bytes, settings) {
            Ok(normalized) => {
                let hash = blake3::hash(&normalized);
                Self {
                    asset: CoverAsset {
                        path: format!("covers/cover-{hash}.jpg"),
                        content_type: NORMALIZED_CONTENT_TYPE.to_string(),
                        degraded: false,
                    },
                    bytes: Some(normalized),
                }
            },
            Err(e) => {
                tracing::warn!(name, error = ?e, "Cover could not be normalized; storing the original bytes");
                let hash = blake3::hash(&bytes);
                let ext = extension(name).unwrap_or_else(|| "bin".to_string());
                Self {
                    asset: CoverAsset {
                        path: format!("covers/cover-{hash}.{ext}"),
                        content_type: content_type(name).to_string(),
                        degraded: true,
                    },
                    bytes: Some(bytes),
                }
            },
        }
    }

    /// The best cover candidate inside an archive, if there is one that can
    /// be read.
    pub fn from_archive(archive: &mut Archive, settings: &CoverConfig) -> Option<Self> {
        let path = select_cover(archive.entries())?.path.clone();
        match archive.read(&path) {
            Ok(bytes) => Some(Self::from_image(&path, bytes, settings)),
            Err(e) => {
                tracing::warn!(path = %path, error = ?e, "Cover candidate could not be read");
                None
            },
        }
    }

    pub fn placeholder(settings: &CoverConfig) -> Self {
        tracing::warn!(placeholder = %settings.placeholder, "No usable cover image; using the placeholder");
        Self {
            asset: CoverAsset {
                path: settings.placeholder.clone(),
                content_type: content_type(&settings.placeholder).to_string(),
                degraded: false,
            },
            bytes: None,
        }
    }
}

impl Library {
    /// Turn an explicit cover upload into a prepared cover, off the async
    /// runtime.
    pub(crate) async fn prepare_cover(&self, name: String, bytes: Vec<u8>) -> Result<PreparedCover> {
        let settings = self.covers.clone();
        crate::blocking(move || Ok(PreparedCover::from_image(&name, bytes, &settings))).await
    }

    /// Write the built-in placeholder unless storage already holds one.
    ///
    /// An existing placeholder is never replaced, so deployments can supply
    /// their own artwork.
    #[instrument(skip(self), fields(path = %self.covers.placeholder))]
    pub async fn ensure_placeholder(&self) -> Result<()> {
        let path = Path::new(&self.covers.placeholder);
        if self.backend.exists(path).await.or_raise(|| ErrorKind::Storage)? {
            return Ok(());
        }
        let settings = self.covers.clone();
        let bytes = crate::blocking(move || render_placeholder(&settings)).await?;
        self.backend.write(path, &bytes).await.or_raise(|| ErrorKind::Storage)?;
        tracing::info!("Wrote built-in placeholder cover");
        Ok(())
    }

    pub(crate) async fn store_cover(&self, cover: &PreparedCover) -> Result<()> {
        match &cover.bytes {
            Some(bytes) => self.store(&cover.asset.path, bytes).await,
            None => Ok(()),
        }
    }

    /// The cover of a manga.
    ///
    /// A stored cover that can no longer be read is replaced by the
    /// placeholder rather than failing the request. If the placeholder is
    /// gone too, the built-in one is served.
    #[instrument(skip(self))]
    pub async fn cover(&self, id: MangaId) -> Result<CoverImage> {
        let manga = self.find_manga(id).await?;
        match self.backend.read(Path::new(&manga.cover.path)).await {
            Ok(bytes) => {
                return Ok(CoverImage {
                    content_type: manga.cover.content_type,
                    bytes,
                });
            },
            Err(e) => tracing::warn!(path = %manga.cover.path, error = ?e, "Stored cover unreadable; using placeholder"),
        }
        let placeholder = &self.covers.placeholder;
        let bytes = match self.backend.read(Path::new(placeholder)).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %placeholder, error = ?e, "Placeholder cover unreadable; serving the built-in one");
                let settings = self.covers.clone();
                crate::blocking(move || render_placeholder(&settings))
                    .await
                    .or_raise(|| ErrorKind::CoverNotFound(id))?
            },
        };
        Ok(CoverImage {
            content_type: content_type(placeholder).to_string(),
            bytes,
        })
    }
}
