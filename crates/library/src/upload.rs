use crate::error::{ErrorKind, Result};
use koma_archive::extension;

/// Raw bytes handed over by the transport layer, with the name they were
/// uploaded under.
#[derive(Clone, PartialEq, Eq)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}
impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    /// Lower-cased extension of the uploaded file name.
    pub fn extension(&self) -> Option<String> {
        extension(&self.file_name)
    }
}
impl std::fmt::Debug for Upload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upload")
            .field("file_name", &self.file_name)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// What an archive upload is for. Decides which extensions are accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadKind {
    /// A whole manga, possibly holding many chapters.
    Manga,
    /// A single chapter added to an existing manga.
    Chapter,
}
impl UploadKind {
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            // RAR containers are accepted by name but only succeed when the
            // payload is actually a ZIP.
            Self::Manga => &["zip", "cbz", "rar", "cbr"],
            Self::Chapter => &["zip", "cbz"],
        }
    }

    /// The upload's extension, if this kind of upload accepts it.
    pub fn accept(self, upload: &Upload) -> Result<String> {
        match upload.extension() {
            Some(ext) if self.extensions().contains(&ext.as_str()) => Ok(ext),
            other => exn::bail!(ErrorKind::UnsupportedFormat(other.unwrap_or_default())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(UploadKind::Manga, "series.zip", Some("zip"))]
    #[case(UploadKind::Manga, "series.CBZ", Some("cbz"))]
    #[case(UploadKind::Manga, "series.rar", Some("rar"))]
    #[case(UploadKind::Manga, "series.cbr", Some("cbr"))]
    #[case(UploadKind::Manga, "series.7z", None)]
    #[case(UploadKind::Manga, "series", None)]
    #[case(UploadKind::Chapter, "ch1.zip", Some("zip"))]
    #[case(UploadKind::Chapter, "ch1.cbz", Some("cbz"))]
    #[case(UploadKind::Chapter, "ch1.rar", None)]
    #[case(UploadKind::Chapter, "ch1.cbr", None)]
    fn test_accept(#[case] kind: UploadKind, #[case] name: &str, #[case] expected: Option<&str>) {
        let upload = Upload::new(name, Vec::new());
        match expected {
            Some(ext) => assert_eq!(kind.accept(&upload).unwrap(), ext),
            None => assert!(matches!(&*kind.accept(&upload).unwrap_err(), ErrorKind::UnsupportedFormat(_))),
        }
    }

    #[test]
    fn test_debug_hides_payload() {
        let upload = Upload::new("a.zip", vec![0; 1024]);
        assert_eq!(format!("{upload:?}"), r#"Upload { file_name: "a.zip", bytes: 1024 }"#);
    }
}
