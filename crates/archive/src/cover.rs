//! Cover candidate ranking.

use crate::classify::ImageSet;
use crate::natural::NaturalKey;
use crate::reader::Entry;

/// Pick the entry that best represents the archive as a cover.
///
/// Candidates are images from [`ImageSet::Cover`]. Any path mentioning
/// "cover" (case-insensitive) ranks first; ties fall back to natural order,
/// so the result never depends on listing order.
pub fn select_cover(entries: &[Entry]) -> Option<&Entry> {
    entries
        .iter()
        .filter(|entry| ImageSet::Cover.matches(entry))
        .min_by_key(|entry| (!entry.path.to_lowercase().contains("cover"), NaturalKey::new(&entry.path)))
}
