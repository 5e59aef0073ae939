//! Image classification by file extension.

use crate::reader::{Entry, extension};

const PAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];
const COVER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];

/// Which family of images an entry is being classified for.
///
/// Pages and covers intentionally accept different extensions: bitmaps are
/// good enough to be re-encoded into a cover, but are never served as pages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageSet {
    Page,
    Cover,
}

impl ImageSet {
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Page => PAGE_EXTENSIONS,
            Self::Cover => COVER_EXTENSIONS,
        }
    }

    /// Returns `true` if `path` names a file with an extension in this set.
    ///
    /// Paths ending in `/` are directories and never match.
    pub fn matches_path(self, path: &str) -> bool {
        if path.ends_with('/') {
            return false;
        }
        extension(path).is_some_and(|ext| self.extensions().contains(&ext.as_str()))
    }

    pub fn matches(self, entry: &Entry) -> bool {
        !entry.is_dir && self.matches_path(&entry.path)
    }
}

/// MIME type served for an image path.
pub fn content_type(path: &str) -> &'static str {
    match extension(path).as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}
