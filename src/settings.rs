// src/settings.rs

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::constants::{DEFAULT_DIAGNOSTICS_CAPACITY, DEFAULT_GROUP, DEFAULT_RENDERER};

/// Why settings could not be loaded.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The file could not be read.
    #[error("Failed to read settings file '{path}': {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid settings TOML.
    #[error("Failed to parse settings: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Result alias for settings loading.
pub type SettingsResult<T> = Result<T, SettingsError>;

/// Application settings, read from `cvu.toml`. Every field is optional in the
/// file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "snake_case")]
pub struct Settings {
    /// Renderer used when no view layer names one.
    pub default_renderer: String,
    /// Render group used when a caller names none.
    pub default_group: String,
    /// Maximum number of entries kept in the diagnostic history.
    pub diagnostics_capacity: usize,
    /// Treat any broken catalog definition as fatal.
    pub strict_validation: bool,
    /// Directories of user definitions, layered over the defaults.
    pub catalog_dirs: Vec<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_renderer: DEFAULT_RENDERER.to_string(),
            default_group: DEFAULT_GROUP.to_string(),
            diagnostics_capacity: DEFAULT_DIAGNOSTICS_CAPACITY,
            strict_validation: false,
            catalog_dirs: Vec::new(),
        }
    }
}

impl Settings {
    /// Parses settings from TOML text.
    pub fn from_toml_str(text: &str) -> SettingsResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads settings from `path`.
    pub fn load(path: &Path) -> SettingsResult<Self> {
        let text = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_toml_str(&text)?;
        log::debug!("Loaded settings from '{}'", path.display());
        Ok(settings)
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.is_file() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}
