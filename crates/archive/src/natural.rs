//! Numeric-aware ordering of archive paths.
//!
//! `page2.jpg` sorts before `page10.jpg`. Digit runs are compared by
//! magnitude, everything else case-insensitively, and the raw string breaks
//! any remaining tie so the ordering is total.

use std::cmp::Ordering;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Run {
    /// Significant digits only; the length is compared first so magnitude
    /// wins over lexicographic order, for any number of digits.
    Number(usize, String),
    Text(String),
}

/// Precomputed sort key for a path.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct NaturalKey {
    runs: Vec<Run>,
    raw: String,
}

impl NaturalKey {
    pub fn new(raw: &str) -> Self {
        let mut runs = Vec::new();
        let mut chars = raw.char_indices().peekable();
        while let Some(&(start, first)) = chars.peek() {
            let numeric = first.is_ascii_digit();
            let mut end = raw.len();
            while let Some(&(index, c)) = chars.peek() {
                if c.is_ascii_digit() != numeric {
                    end = index;
                    break;
                }
                chars.next();
            }
            let run = &raw[start..end];
            runs.push(if numeric {
                let digits = run.trim_start_matches('0');
                Run::Number(digits.len(), digits.to_string())
            } else {
                Run::Text(run.to_lowercase())
            });
        }
        Self {
            runs,
            raw: raw.to_string(),
        }
    }
}

/// Compare two paths in natural order.
///
/// ```
/// use koma_archive::natural_cmp;
/// use std::cmp::Ordering;
///
/// assert_eq!(natural_cmp("page2.jpg", "page10.jpg"), Ordering::Less);
/// assert_eq!(natural_cmp("Cover.png", "cover.png"), Ordering::Less);
/// ```
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    NaturalKey::new(a).cmp(&NaturalKey::new(b))
}

/// Sort paths in place in natural order.
pub fn sort_natural(paths: &mut [String]) {
    paths.sort_by_cached_key(|path| NaturalKey::new(path));
}
