//! Chapter structure detection.
//!
//! Archives arrive with no agreed-upon layout. The only structure recognised
//! is a directory whose name is a plain non-negative integer, which becomes
//! a chapter with that number. Anything else collapses into a single
//! synthetic chapter 1 holding every page image in the archive.

use crate::classify::ImageSet;
use crate::natural::sort_natural;
use crate::reader::Entry;
use std::collections::HashMap;

/// A chapter inferred from an archive's directory structure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetectedChapter {
    pub number: u32,
    pub title: String,
    /// Directory inside the archive (with trailing slash), or `None` for the
    /// synthetic whole-archive chapter.
    pub folder: Option<String>,
    /// Page images in natural order.
    pub images: Vec<String>,
}

/// Two chapter directories that resolved to the same number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conflict {
    pub number: u32,
    /// Folder of the chapter that was kept (first in archive order).
    pub kept: String,
    /// Folder of the chapter that was dropped.
    pub dropped: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Detection {
    /// Chapters in ascending numeric order.
    pub chapters: Vec<DetectedChapter>,
    pub conflicts: Vec<Conflict>,
}

impl Detection {
    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }
}

pub fn chapter_title(number: u32) -> String {
    format!("Chapter {number}")
}

/// Chapter number of a directory entry, if its base name is a plain integer.
///
/// Only ASCII digits count; signs, whitespace and numbers that don't fit a
/// `u32` are rejected.
///
/// ```
/// use koma_archive::{Entry, chapter_number};
///
/// assert_eq!(chapter_number(&Entry::dir("012/")), Some(12));
/// assert_eq!(chapter_number(&Entry::dir("extras/")), None);
/// assert_eq!(chapter_number(&Entry::file("3", 0)), None);
/// ```
pub fn chapter_number(entry: &Entry) -> Option<u32> {
    if !entry.is_dir {
        return None;
    }
    let name = entry.name();
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

/// Every image in `set` below `folder` (or in the whole archive when
/// `folder` is `None`), in natural order.
pub fn collect_images(entries: &[Entry], folder: Option<&str>, set: ImageSet) -> Vec<String> {
    let mut images: Vec<String> = entries
        .iter()
        .filter(|entry| set.matches(entry))
        .filter(|entry| folder.is_none_or(|folder| is_below(&entry.path, folder)))
        .map(|entry| entry.path.clone())
        .collect();
    sort_natural(&mut images);
    images
}

fn is_below(path: &str, folder: &str) -> bool {
    let folder = folder.trim_end_matches('/');
    path.strip_prefix(folder).is_some_and(|rest| rest.starts_with('/'))
}

/// Infer the chapters contained in an archive listing.
pub fn detect(entries: &[Entry]) -> Detection {
    let folders: Vec<(u32, &Entry)> = entries
        .iter()
        .filter_map(|entry| chapter_number(entry).map(|number| (number, entry)))
        .collect();

    if folders.is_empty() {
        let images = collect_images(entries, None, ImageSet::Page);
        if images.is_empty() {
            return Detection::default();
        }
        return Detection {
            chapters: vec![DetectedChapter {
                number: 1,
                title: chapter_title(1),
                folder: None,
                images,
            }],
            conflicts: Vec::new(),
        };
    }

    let mut seen: HashMap<u32, String> = HashMap::new();
    let mut detection = Detection::default();
    for (number, folder) in folders {
        let images = collect_images(entries, Some(&folder.path), ImageSet::Page);
        if images.is_empty() {
            tracing::debug!(folder = %folder.path, "Ignoring chapter directory without images");
            continue;
        }
        if let Some(kept) = seen.get(&number) {
            tracing::warn!(number, kept = %kept, dropped = %folder.path, "Duplicate chapter number in archive");
            detection.conflicts.push(Conflict {
                number,
                kept: kept.clone(),
                dropped: folder.path.clone(),
            });
            continue;
        }
        seen.insert(number, folder.path.clone());
        detection.chapters.push(DetectedChapter {
            number,
            title: chapter_title(number),
            folder: Some(folder.path.clone()),
            images,
        });
    }
    // Numbers are unique by now.
    detection.chapters.sort_by_key(|chapter| chapter.number);
    detection
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn listing(paths: &[&str]) -> Vec<Entry> {
        paths
            .iter()
            .map(|path| {
                if path.ends_with('/') {
                    Entry::dir(*path)
                } else {
                    Entry::file(*path, 4)
                }
            })
            .collect()
    }

    #[test]
    fn test_numbered_directories_sort_numerically() {
        let entries = listing(&["10/", "10/a.jpg", "1/", "1/a.jpg", "2/", "2/a.jpg"]);
        let detection = detect(&entries);
        let numbers: Vec<u32> = detection.chapters.iter().map(|c| c.number).collect();
        assert_eq!(numbers, [1, 2, 10]);
        assert_eq!(detection.chapters[2].title, "Chapter 10");
        assert_eq!(detection.chapters[2].folder.as_deref(), Some("10/"));
        assert!(detection.conflicts.is_empty());
    }

    #[test]
    fn test_images_in_natural_order() {
        let entries = listing(&["1/", "1/p10.jpg", "1/p2.PNG", "1/notes.txt", "1/p1.webp", "1/scan.bmp"]);
        let detection = detect(&entries);
        assert_eq!(detection.chapters[0].images, ["1/p1.webp", "1/p2.PNG", "1/p10.jpg"]);
    }

    #[test]
    fn test_nested_images_belong_to_chapter() {
        let entries = listing(&["3/", "3/hd/p1.jpg", "3/p0.jpg", "30/", "30/p1.jpg"]);
        let detection = detect(&entries);
        assert_eq!(detection.chapters[0].number, 3);
        assert_eq!(detection.chapters[0].images, ["3/hd/p1.jpg", "3/p0.jpg"]);
        assert_eq!(detection.chapters[1].images, ["30/p1.jpg"]);
    }

    #[test]
    fn test_fallback_to_single_chapter() {
        let entries = listing(&["extras/", "extras/b.jpg", "a.png", "readme.txt"]);
        let detection = detect(&entries);
        assert_eq!(
            detection.chapters,
            [DetectedChapter {
                number: 1,
                title: "Chapter 1".to_string(),
                folder: None,
                images: vec!["a.png".to_string(), "extras/b.jpg".to_string()],
            }]
        );
    }

    #[test]
    fn test_directories_without_images_are_omitted() {
        let entries = listing(&["1/", "1/info.txt", "2/", "2/p.jpg"]);
        let detection = detect(&entries);
        assert_eq!(detection.chapters.len(), 1);
        assert_eq!(detection.chapters[0].number, 2);
    }

    #[rstest]
    #[case(&[])]
    #[case(&["readme.txt"])]
    #[case(&["1/", "1/readme.txt"])]
    fn test_no_images(#[case] paths: &[&str]) {
        assert!(detect(&listing(paths)).is_empty());
    }

    #[test]
    fn test_duplicate_numbers_first_seen_wins() {
        let entries = listing(&["01/", "01/a.jpg", "1/", "1/b.jpg"]);
        let detection = detect(&entries);
        assert_eq!(detection.chapters.len(), 1);
        assert_eq!(detection.chapters[0].images, ["01/a.jpg"]);
        assert_eq!(
            detection.conflicts,
            [Conflict {
                number: 1,
                kept: "01/".to_string(),
                dropped: "1/".to_string(),
            }]
        );
    }

    #[test]
    fn test_detection_is_deterministic() {
        let entries = listing(&["2/", "2/b.jpg", "2/a.jpg", "1/", "1/z.jpg"]);
        assert_eq!(detect(&entries), detect(&entries));
    }

    #[rstest]
    #[case(Entry::dir("0/"), Some(0))]
    #[case(Entry::dir("007/"), Some(7))]
    #[case(Entry::dir("volume/12/"), Some(12))]
    #[case(Entry::dir("12a/"), None)]
    #[case(Entry::dir("-1/"), None)]
    #[case(Entry::dir(" 1/"), None)]
    #[case(Entry::dir("99999999999/"), None)]
    #[case(Entry::dir("１/"), None)]
    #[case(Entry::file("12", 0), None)]
    fn test_chapter_number(#[case] entry: Entry, #[case] expected: Option<u32>) {
        assert_eq!(chapter_number(&entry), expected);
    }

    #[test]
    fn test_collect_images_respects_folder_boundary() {
        let entries = listing(&["1/a.jpg", "10/b.jpg", "1b.jpg"]);
        assert_eq!(collect_images(&entries, Some("1/"), ImageSet::Page), ["1/a.jpg"]);
        assert_eq!(collect_images(&entries, Some("1"), ImageSet::Page), ["1/a.jpg"]);
    }
}
