//! Where uploaded archives and cover images live.
//!
//! Everything above this crate addresses stored objects by a relative,
//! validated path (`files/<hash>.cbz`, `covers/cover-<hash>.jpg`). Which
//! backend actually holds the bytes is decided once, at startup.

pub mod backend;
pub mod error;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
