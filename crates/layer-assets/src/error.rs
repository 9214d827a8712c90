//! Error types for layer-assets

use std::path::PathBuf;

use crate::component::ComponentId;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unknown component: {0}")]
    UnknownComponent(ComponentId),

    #[error("Failed to parse assets config: {0}")]
    ConfigParse(String),

    #[error("No base path is set for asset placement")]
    NoBasePath,

    #[error("Destination escapes the asset base path: {0}")]
    PathOutsideBase(PathBuf),

    #[error("Failed to move {from} to {to}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
