//! In-memory ZIP builders for tests.
//!
//! Only compiled for this crate's own tests or with the `fixtures` feature.
//! Panics on failure; never use outside of tests.

use std::io::{Cursor, Write};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Build a stored (uncompressed) ZIP container in memory.
///
/// Names ending in `/` become directory entries and their contents are
/// ignored. Entries are written in the given order.
pub fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, contents) in entries {
        if name.ends_with('/') {
            writer
                .add_directory(name.trim_end_matches('/'), options)
                .expect("failed to add directory to fixture archive");
        } else {
            writer
                .start_file(*name, options)
                .expect("failed to start file in fixture archive");
            writer
                .write_all(contents)
                .expect("failed to write file to fixture archive");
        }
    }
    writer
        .finish()
        .expect("failed to finish fixture archive")
        .into_inner()
}

/// Like [`zip_with`], but every listed name gets the same placeholder body.
pub fn zip_of(names: &[&str]) -> Vec<u8> {
    let entries: Vec<(&str, &[u8])> = names.iter().map(|name| (*name, b"page".as_slice())).collect();
    zip_with(&entries)
}
