//! Serving individual pages.
//!
//! A page is requested with a token, normally one of the chapter's
//! `img-NNNNN` identifiers. Older links may carry the (percent-encoded)
//! entry path or just its file name instead, so those are accepted too. The
//! token is only ever compared against entries the archive actually lists; it
//! is never turned into a path of its own.

use crate::error::{ErrorKind, Result};
use crate::reindex::index_archive;
use crate::{Library, open_archive};
use exn::{OptionExt, ResultExt};
use koma_archive::{Archive, ChapterIndex, Entry, ImageSet, collect_images, content_type};
use koma_catalog::ChapterId;
use std::path::Path;
use tracing::instrument;

/// A single page image.
#[derive(Clone, PartialEq, Eq)]
pub struct Page {
    /// Entry path inside the chapter's archive.
    pub path: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}
impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("path", &self.path)
            .field("content_type", &self.content_type)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Find the archive entry a page token refers to.
///
/// Tried in order: the token as an identifier from `index`; the
/// percent-decoded token as an exact entry path; an entry whose path ends
/// with `/` followed by the decoded token. Only page images inside `folder`
/// (anywhere when `None`) are candidates for the latter two.
pub fn resolve_token(index: &ChapterIndex, entries: &[Entry], folder: Option<&str>, token: &str) -> Option<String> {
    if let Some(path) = index.resolve(token) {
        return Some(path.to_string());
    }
    let decoded = urlencoding::decode(token).ok()?;
    if decoded.is_empty() {
        return None;
    }
    let candidates = collect_images(entries, folder, ImageSet::Page);
    if let Some(exact) = candidates.iter().find(|path| **path == decoded) {
        return Some(exact.clone());
    }
    let suffix = format!("/{decoded}");
    candidates.into_iter().find(|path| path.ends_with(&suffix))
}

fn read_page(archive: &mut Archive, index: &ChapterIndex, folder: Option<&str>, token: &str) -> Result<Page> {
    let path = resolve_token(index, archive.entries(), folder, token)
        .ok_or_raise(|| ErrorKind::PageNotFound(token.to_string()))?;
    tracing::debug!(token, path = %path, "Resolved page token");
    let bytes = archive.read(&path).map_err(ErrorKind::archive)?;
    Ok(Page {
        content_type: content_type(&path).to_string(),
        path,
        bytes,
    })
}

impl Library {
    /// Read a single page out of a chapter's archive.
    ///
    /// A chapter that has never been indexed is indexed from the same read
    /// of the archive, and the index persisted for later requests.
    #[instrument(skip(self))]
    pub async fn page(&self, id: ChapterId, token: &str) -> Result<Page> {
        let chapter = self.find_chapter(id).await?;
        let bytes = self.backend.read(Path::new(&chapter.source.path)).await.or_raise(|| ErrorKind::Storage)?;
        let folder = chapter.source.folder;
        let persisted = chapter.index;
        let token = token.to_string();
        let limits = self.limits;
        let (page, rebuilt) = crate::blocking(move || {
            let mut archive = open_archive(bytes, limits)?;
            let (index, rebuilt) = match persisted {
                Some(index) => (index, false),
                None => (index_archive(&archive, folder.as_deref()), true),
            };
            let page = read_page(&mut archive, &index, folder.as_deref(), &token);
            Ok((page, rebuilt.then_some(index)))
        })
        .await?;
        if let Some(index) = rebuilt {
            self.persist_index(id, &index).await?;
        }
        page
    }
}
