//! Stable page identifiers.
//!
//! A page is addressed by its 1-based position in the chapter's ordered
//! image list (`img-00001`, `img-00002`, ...) rather than by its entry name,
//! which may contain anything an archiver was willing to write.

use derive_more::Display;
use std::collections::BTreeMap;

/// Version of the identifier scheme. Persisted alongside every index.
pub const INDEX_VERSION: u32 = 1;

#[derive(Clone, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImageId(String);

impl ImageId {
    /// Identifier for a 1-based position. Positions wider than five digits
    /// keep all of their digits.
    ///
    /// ```
    /// use koma_archive::ImageId;
    ///
    /// assert_eq!(ImageId::at(1).as_str(), "img-00001");
    /// assert_eq!(ImageId::at(123456).as_str(), "img-123456");
    /// ```
    pub fn at(position: usize) -> Self {
        Self(format!("img-{position:05}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<ImageId> for String {
    fn from(id: ImageId) -> Self {
        id.0
    }
}

/// Ordered image list of a chapter plus the identifier map derived from it.
///
/// The map is always exactly "position to identifier" over the list; there
/// is no way to construct an index where the two disagree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChapterIndex {
    version: u32,
    images: Vec<String>,
    ids: BTreeMap<String, String>,
}

impl ChapterIndex {
    /// Build an index from an already-ordered image list.
    pub fn build(images: Vec<String>) -> Self {
        let ids = images
            .iter()
            .enumerate()
            .map(|(index, path)| (String::from(ImageId::at(index + 1)), path.clone()))
            .collect();
        Self {
            version: INDEX_VERSION,
            images,
            ids,
        }
    }

    /// Rehydrate a persisted index.
    ///
    /// The list is authoritative. A map that doesn't match it (stale
    /// version, hand-edited rows, partial writes) is discarded and derived
    /// again from the list.
    pub fn from_parts(version: u32, images: Vec<String>, ids: BTreeMap<String, String>) -> Self {
        let index = Self::build(images);
        if version != INDEX_VERSION || index.ids != ids {
            tracing::warn!(
                version,
                images = index.images.len(),
                ids = ids.len(),
                "Persisted identifier map disagrees with image list; rebuilding"
            );
        }
        index
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Image paths in page order.
    pub fn images(&self) -> &[String] {
        &self.images
    }

    pub fn ids(&self) -> &BTreeMap<String, String> {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Entry path for an identifier.
    pub fn resolve(&self, id: &str) -> Option<&str> {
        self.ids.get(id).map(String::as_str)
    }

    pub fn into_parts(self) -> (u32, Vec<String>, BTreeMap<String, String>) {
        (self.version, self.images, self.ids)
    }
}
