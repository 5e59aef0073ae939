mod chapter;
mod index;
mod manga;

pub(crate) use self::chapter::{ChapterRow, ChapterValues};
pub(crate) use self::index::IndexColumns;
pub(crate) use self::manga::{MangaRow, MangaValues};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use time::UtcDateTime;

pub(crate) fn size_to_column(size: u64) -> Result<i64> {
    i64::try_from(size).or_raise(|| ErrorKind::InvalidData("file size"))
}

pub(crate) fn size_from_column(size: i64) -> Result<u64> {
    u64::try_from(size).or_raise(|| ErrorKind::InvalidData("file size"))
}

pub(crate) fn timestamp_from_column(timestamp: i64) -> Result<UtcDateTime> {
    UtcDateTime::from_unix_timestamp(timestamp).or_raise(|| ErrorKind::InvalidData("upload date"))
}
