//! ZIP-family container access.
//!
//! An [`Archive`] owns the complete byte buffer of an uploaded container and
//! the entry listing derived from its central directory. Dropping the
//! [`Archive`] releases everything; there is no file handle to leak.

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use std::io::{Cursor, Read};
use tracing::instrument;
use zip::ZipArchive;

// Generous enough for any real-world omnibus upload, small enough that a
// hostile central directory can't keep a worker busy for minutes.
const DEFAULT_MAX_ENTRIES: usize = 50_000;
const DEFAULT_MAX_UNCOMPRESSED_BYTES: u64 = 4 * 1024 * 1024 * 1024;
// Upper bound for the initial read buffer; the declared size is untrusted.
const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

/// Resource limits applied while opening and reading an archive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Limits {
    /// Maximum number of entries (files and directories) in the central directory.
    pub max_entries: usize,
    /// Maximum sum of the declared uncompressed sizes of all entries.
    pub max_uncompressed_bytes: u64,
}
impl Default for Limits {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_uncompressed_bytes: DEFAULT_MAX_UNCOMPRESSED_BYTES,
        }
    }
}

/// A single path record inside an archive.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Entry {
    /// Path exactly as recorded in the archive (directories keep their
    /// trailing slash).
    pub path: String,
    pub is_dir: bool,
    /// Declared uncompressed size in bytes.
    pub size: u64,
}
impl Entry {
    pub fn file(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
            size,
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
            size: 0,
        }
    }

    /// Last path component, without any trailing slash.
    ///
    /// ```
    /// use koma_archive::Entry;
    ///
    /// assert_eq!(Entry::dir("volume/12/").name(), "12");
    /// assert_eq!(Entry::file("volume/12/p01.jpg", 0).name(), "p01.jpg");
    /// ```
    pub fn name(&self) -> &str {
        let trimmed = self.path.trim_end_matches('/');
        trimmed.rsplit('/').next().unwrap_or(trimmed)
    }

    /// Lower-cased file extension, if the base name has one.
    pub fn extension(&self) -> Option<String> {
        extension(&self.path)
    }
}

/// Lower-cased extension of the last component of `path`.
///
/// Leading dots (hidden files such as `.jpg`) don't count as an extension
/// separator.
pub fn extension(path: &str) -> Option<String> {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rfind('.') {
        Some(0) | None => None,
        Some(dot) => Some(name[dot + 1..].to_lowercase()),
    }
}

/// An opened, parsed ZIP-family container.
#[derive(Debug)]
pub struct Archive {
    zip: ZipArchive<Cursor<Vec<u8>>>,
    entries: Vec<Entry>,
    limits: Limits,
}

impl Archive {
    /// Parse the central directory of an in-memory container.
    ///
    /// Individual entries that can't be described are logged and skipped;
    /// only a container that can't be parsed at all results in
    /// [`ErrorKind::Corrupt`]. The [`Limits`] are enforced here, before any
    /// entry is decompressed.
    #[instrument(skip(bytes), fields(size = bytes.len(), entries))]
    pub fn open(bytes: Vec<u8>, limits: Limits) -> Result<Self> {
        let mut zip = ZipArchive::new(Cursor::new(bytes)).or_raise(|| ErrorKind::Corrupt)?;
        if zip.len() > limits.max_entries {
            exn::bail!(ErrorKind::TooManyEntries(zip.len()));
        }
        let mut entries = Vec::with_capacity(zip.len());
        let mut total: u64 = 0;
        for index in 0..zip.len() {
            // Raw access only reads the header; nothing is decompressed.
            let entry = match zip.by_index_raw(index) {
                Ok(file) => Entry {
                    path: file.name().to_string(),
                    is_dir: file.is_dir(),
                    size: file.size(),
                },
                Err(e) => {
                    tracing::warn!(index, error = %e, "Skipping unreadable archive entry");
                    continue;
                },
            };
            if entry.path.is_empty() {
                continue;
            }
            total = total.saturating_add(entry.size);
            if total > limits.max_uncompressed_bytes {
                exn::bail!(ErrorKind::TooLarge(total));
            }
            entries.push(entry);
        }
        tracing::Span::current().record("entries", entries.len());
        Ok(Self { zip, entries, limits })
    }

    /// Every entry in central directory order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Returns `true` if a non-directory entry exists at exactly `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.entries.iter().any(|e| !e.is_dir && e.path == path)
    }

    /// Decompress a single entry.
    ///
    /// Returns [`ErrorKind::EntryNotFound`] for unknown paths and for
    /// directories. Never returns more bytes than the entry declares.
    #[instrument(skip(self))]
    pub fn read(&mut self, path: &str) -> Result<Vec<u8>> {
        if !self.contains(path) {
            exn::bail!(ErrorKind::EntryNotFound(path.to_string()));
        }
        let index = self.zip.index_for_name(path).ok_or_raise(|| ErrorKind::EntryNotFound(path.to_string()))?;
        let file = self.zip.by_index(index).or_raise(|| ErrorKind::UnreadableEntry(path.to_string()))?;
        let budget = file.size().min(self.limits.max_uncompressed_bytes);
        let mut buffer = Vec::with_capacity(usize::try_from(budget.min(MAX_PREALLOCATION)).unwrap_or(0));
        file.take(budget)
            .read_to_end(&mut buffer)
            .or_raise(|| ErrorKind::UnreadableEntry(path.to_string()))?;
        Ok(buffer)
    }

    /// Release the archive, handing back the container bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.zip.into_inner().into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::zip_with;
    use rstest::rstest;

    #[test]
    fn test_open_lists_entries_in_archive_order() {
        let bytes = zip_with(&[("b.jpg", b"b"), ("01/", b""), ("01/a.png", b"aa")]);
        let archive = Archive::open(bytes, Limits::default()).unwrap();
        assert_eq!(
            archive.entries(),
            &[Entry::file("b.jpg", 1), Entry::dir("01/"), Entry::file("01/a.png", 2)]
        );
    }

    #[test]
    fn test_open_rejects_garbage() {
        let err = Archive::open(b"definitely not a zip file".to_vec(), Limits::default()).unwrap_err();
        assert_eq!(*err, ErrorKind::Corrupt);
    }

    #[test]
    fn test_open_rejects_empty_input() {
        let err = Archive::open(Vec::new(), Limits::default()).unwrap_err();
        assert_eq!(*err, ErrorKind::Corrupt);
    }

    #[test]
    fn test_open_skips_entry_with_broken_local_header() {
        let mut bytes = zip_with(&[("a.jpg", b"a"), ("b.jpg", b"b"), ("c.jpg", b"c")]);
        let headers: Vec<usize> = bytes
            .windows(4)
            .enumerate()
            .filter(|(_, window)| *window == b"PK\x03\x04")
            .map(|(offset, _)| offset)
            .collect();
        assert_eq!(headers.len(), 3);
        // The central directory still lists b.jpg, but its data can't be located.
        bytes[headers[1]..headers[1] + 2].copy_from_slice(b"XX");

        let mut archive = Archive::open(bytes, Limits::default()).unwrap();
        assert_eq!(archive.entries(), &[Entry::file("a.jpg", 1), Entry::file("c.jpg", 1)]);
        assert_eq!(archive.read("c.jpg").unwrap(), b"c");
        let err = archive.read("b.jpg").unwrap_err();
        assert_eq!(*err, ErrorKind::EntryNotFound("b.jpg".to_string()));
    }

    #[test]
    fn test_entry_limit() {
        let bytes = zip_with(&[("a.jpg", b"a"), ("b.jpg", b"b"), ("c.jpg", b"c")]);
        let limits = Limits {
            max_entries: 2,
            ..Limits::default()
        };
        let err = Archive::open(bytes, limits).unwrap_err();
        assert_eq!(*err, ErrorKind::TooManyEntries(3));
    }

    #[test]
    fn test_size_limit() {
        let bytes = zip_with(&[("a.jpg", b"0123456789"), ("b.jpg", b"0123456789")]);
        let limits = Limits {
            max_uncompressed_bytes: 15,
            ..Limits::default()
        };
        let err = Archive::open(bytes, limits).unwrap_err();
        assert_eq!(*err, ErrorKind::TooLarge(20));
    }

    #[test]
    fn test_read_entry() {
        let bytes = zip_with(&[("01/p1.jpg", b"first page"), ("01/p2.jpg", b"second page")]);
        let mut archive = Archive::open(bytes, Limits::default()).unwrap();
        assert_eq!(archive.read("01/p2.jpg").unwrap(), b"second page");
        assert_eq!(archive.read("01/p1.jpg").unwrap(), b"first page");
    }

    #[test]
    fn test_read_unicode_entry() {
        let bytes = zip_with(&[("第1话/ページ 01.png", b"unicode")]);
        let mut archive = Archive::open(bytes, Limits::default()).unwrap();
        assert_eq!(archive.entries()[0].path, "第1话/ページ 01.png");
        assert_eq!(archive.read("第1话/ページ 01.png").unwrap(), b"unicode");
    }

    #[rstest]
    #[case("missing.jpg")]
    #[case("01/")]
    #[case("01")]
    fn test_read_missing_entry(#[case] path: &str) {
        let bytes = zip_with(&[("01/", b""), ("01/p1.jpg", b"x")]);
        let mut archive = Archive::open(bytes, Limits::default()).unwrap();
        let err = archive.read(path).unwrap_err();
        assert_eq!(*err, ErrorKind::EntryNotFound(path.to_string()));
    }

    #[rstest]
    #[case("a/b/page.JPG", Some("jpg"))]
    #[case("page.jpeg", Some("jpeg"))]
    #[case("archive.tar.gz", Some("gz"))]
    #[case("dir.d/README", None)]
    #[case(".hidden", None)]
    #[case("noext", None)]
    fn test_extension(#[case] path: &str, #[case] expected: Option<&str>) {
        assert_eq!(extension(path).as_deref(), expected);
    }

    #[rstest]
    #[case(Entry::dir("12/"), "12")]
    #[case(Entry::dir("vol/03/"), "03")]
    #[case(Entry::file("vol/03/p.png", 1), "p.png")]
    #[case(Entry::file("top.png", 1), "top.png")]
    fn test_entry_name(#[case] entry: Entry, #[case] expected: &str) {
        assert_eq!(entry.name(), expected);
    }

    #[test]
    fn test_into_inner_returns_original_bytes() {
        let bytes = zip_with(&[("a.jpg", b"a")]);
        let archive = Archive::open(bytes.clone(), Limits::default()).unwrap();
        assert_eq!(archive.into_inner(), bytes);
    }
}
