//! Components: build targets derived from layer names
//!
//! A component describes one artifact that should exist for a layer. The name
//! analyzer produces them; the registry assigns them identifiers.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Identifier assigned to a component when it enters the registry.
///
/// Identifiers increase monotonically per registry and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(pub u64);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A build target parsed from a layer name.
///
/// Components are immutable once registered: a renamed layer gets fresh
/// components rather than edits to the old ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Display label (usually the name fragment the component was parsed from)
    pub name: String,

    /// Destination file name. `None` means no artifact should exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Destination directory, relative to the asset base path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,

    /// Extraction parameters shared between the analyzer and the render engine
    /// (scale, quality, extension...). Opaque to this crate.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl Component {
    /// Create a component that renders to `file`.
    pub fn new(name: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file: Some(file.into()),
            ..Self::default()
        }
    }

    /// Place the artifact under `folder`.
    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    /// Destination path relative to the asset base path.
    ///
    /// `folder/file` when a folder is set, `file` otherwise, and `None` when
    /// the component has no file.
    pub fn destination(&self) -> Option<PathBuf> {
        let file = self.file.as_deref()?;
        match self.folder.as_deref() {
            Some(folder) => Some(PathBuf::from(folder).join(file)),
            None => Some(PathBuf::from(file)),
        }
    }
}
