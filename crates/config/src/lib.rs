//! Layered configuration for koma.
//!
//! Values are resolved in order, later layers overriding earlier ones:
//!
//! 1. Built-in defaults (data locations from the platform's data directory).
//! 2. An optional configuration file; TOML, YAML or JSON chosen by extension.
//! 3. Environment variables prefixed with `KOMA_`. A double underscore
//!    separates nested keys, so `KOMA_COVERS__QUALITY=90` sets
//!    `covers.quality`.
//!
//! ```no_run
//! # fn main() -> koma_config::error::Result<()> {
//! let config = koma_config::Config::load(Some("koma.toml"))?;
//! println!("storing uploads in {}", config.storage.root.display());
//! # Ok(())
//! # }
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::instrument;

pub use koma_archive::Limits;

pub const ENV_PREFIX: &str = "KOMA_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub covers: CoverConfig,
    pub limits: Limits,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory that uploaded archives and covers are stored beneath.
    pub root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// Cover normalization settings. Every stored cover shares these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverConfig {
    pub width: u32,
    pub height: u32,
    /// JPEG quality, `1..=100`.
    pub quality: u8,
    /// Storage-relative path of the shared cover used when a manga has none.
    pub placeholder: String,
}
impl Default for CoverConfig {
    fn default() -> Self {
        Self {
            width: 300,
            height: 400,
            quality: 80,
            placeholder: "covers/default-cover.jpg".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let data = data_dir();
        Self {
            storage: StorageConfig { root: data.join("storage") },
            database: DatabaseConfig {
                path: data.join("catalog.sqlite"),
            },
            covers: CoverConfig::default(),
            limits: Limits::default(),
        }
    }
}

fn data_dir() -> PathBuf {
    match ProjectDirs::from("", "", "koma") {
        Some(dirs) => dirs.data_dir().to_path_buf(),
        // No home directory (containers, service accounts). Validation will
        // insist on an explicit absolute storage root.
        None => PathBuf::from("koma"),
    }
}

impl Config {
    /// Load and validate the configuration.
    #[instrument(skip_all)]
    pub fn load(file: Option<impl AsRef<Path>>) -> Result<Self> {
        let figment = Self::figment(file.as_ref().map(|path| path.as_ref()))?;
        Self::from_figment(figment)
    }

    /// The layered provider stack, for hosts that want to merge in layers of
    /// their own before extracting.
    pub fn figment(file: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = file {
            if !path.is_file() {
                exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
            }
            tracing::debug!(path = %path.display(), "Reading configuration file");
            let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
            figment = match extension.as_deref() {
                Some("toml") => figment.merge(Toml::file(path)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.storage.root.is_absolute() {
            exn::bail!(ErrorKind::Invalid(format!(
                "storage.root must be absolute, got {}",
                self.storage.root.display()
            )));
        }
        if self.covers.width == 0 || self.covers.height == 0 {
            exn::bail!(ErrorKind::Invalid(format!(
                "cover dimensions must be non-zero, got {}x{}",
                self.covers.width, self.covers.height
            )));
        }
        if !(1..=100).contains(&self.covers.quality) {
            exn::bail!(ErrorKind::Invalid(format!(
                "covers.quality must be within 1..=100, got {}",
                self.covers.quality
            )));
        }
        if self.covers.placeholder.is_empty() {
            exn::bail!(ErrorKind::Invalid("covers.placeholder must not be empty".to_string()));
        }
        Ok(())
    }
}
