//! Asset placement configuration
//!
//! Stored as JSON, e.g.:
//!
//! ```json
//! { "assets_dir_suffix": "-assets", "fallback_base_dir": "/Users/me/Desktop" }
//! ```
//!
//! Every field is optional; missing fields take their defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Suffix appended to the document's file stem to name its assets directory.
pub const DEFAULT_ASSETS_DIR_SUFFIX: &str = "-assets";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Assets for `/work/poster.psd` go to `/work/poster<suffix>/`.
    pub assets_dir_suffix: String,

    /// Where assets of never-saved documents go. Without it such documents
    /// have no base path and placement fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_base_dir: Option<PathBuf>,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            assets_dir_suffix: DEFAULT_ASSETS_DIR_SUFFIX.to_string(),
            fallback_base_dir: None,
        }
    }
}

impl AssetsConfig {
    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    /// Load config from a JSON file, falling back to defaults if it doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No assets config found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Directory that component destinations are resolved against for a
    /// document stored at `document_file`.
    pub fn base_path_for(&self, document_file: &str) -> Option<PathBuf> {
        let path = Path::new(document_file);
        let stem = path.file_stem()?.to_string_lossy();
        let dir_name = format!("{}{}", stem, self.assets_dir_suffix);

        match path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            Some(parent) => Some(parent.join(dir_name)),
            None => self
                .fallback_base_dir
                .as_ref()
                .map(|fallback| fallback.join(dir_name)),
        }
    }
}
