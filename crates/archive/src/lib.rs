//! Reading uploaded comic archives.
//!
//! This crate holds the pure, synchronous half of ingestion: parse a
//! ZIP-family container, decide which entries are images, put them in a
//! stable order, infer chapters from the directory layout and assign every
//! page a positional identifier. Nothing here touches the filesystem or the
//! catalog; callers hand in bytes and get plain values back.
//!
//! # Example
//! ```no_run
//! use koma_archive::{Archive, Limits, detect};
//!
//! # fn run(bytes: Vec<u8>) -> koma_archive::error::Result<()> {
//! let archive = Archive::open(bytes, Limits::default())?;
//! for chapter in detect(archive.entries()).chapters {
//!     println!("{}: {} pages", chapter.title, chapter.images.len());
//! }
//! # Ok(())
//! # }
//! ```

mod classify;
mod cover;
mod detect;
pub mod error;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
mod index;
mod natural;
mod reader;

pub use crate::classify::{ImageSet, content_type};
pub use crate::cover::select_cover;
pub use crate::detect::{Conflict, DetectedChapter, Detection, chapter_number, chapter_title, collect_images, detect};
pub use crate::index::{ChapterIndex, INDEX_VERSION, ImageId};
pub use crate::natural::{NaturalKey, natural_cmp, sort_natural};
pub use crate::reader::{Archive, Entry, Limits, extension};
