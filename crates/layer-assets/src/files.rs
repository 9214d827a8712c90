//! Asset file operations
//!
//! [`AssetFiles`] is the boundary between asset bookkeeping and the
//! filesystem. [`FsAssetFiles`] implements it on top of `tokio::fs`, resolving
//! destinations against a per-document assets directory.

use std::path::{Component as PathComponent, Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::AssetsConfig;
use crate::error::{Error, Result};

/// Filesystem primitives used to place and remove assets.
#[async_trait]
pub trait AssetFiles: Send + Sync {
    /// Derive the asset base path from the document's backing file.
    async fn set_base_path(&self, document_file: &str) -> Result<()>;

    /// Move `source` to `relative_dest` under the base path.
    ///
    /// Returns the absolute destination.
    async fn move_file_into(&self, source: &Path, relative_dest: &Path) -> Result<PathBuf>;

    /// Delete `relative_path` under the base path. Missing files are not an error.
    async fn remove_file_within(&self, relative_path: &Path) -> Result<()>;

    /// Delete an absolute path, typically a render's temporary output.
    async fn remove_file_absolute(&self, path: &Path) -> Result<()>;
}

/// [`AssetFiles`] backed by the local filesystem.
#[derive(Debug)]
pub struct FsAssetFiles {
    config: AssetsConfig,
    base_path: RwLock<Option<PathBuf>>,
}

impl FsAssetFiles {
    pub fn new(config: AssetsConfig) -> Self {
        Self {
            config,
            base_path: RwLock::new(None),
        }
    }

    pub async fn base_path(&self) -> Option<PathBuf> {
        self.base_path.read().await.clone()
    }

    async fn resolve(&self, relative: &Path) -> Result<PathBuf> {
        if !is_contained(relative) {
            return Err(Error::PathOutsideBase(relative.to_path_buf()));
        }
        let base = self.base_path.read().await;
        let base = base.as_ref().ok_or(Error::NoBasePath)?;
        Ok(base.join(relative))
    }
}

#[async_trait]
impl AssetFiles for FsAssetFiles {
    async fn set_base_path(&self, document_file: &str) -> Result<()> {
        let base_path = self.config.base_path_for(document_file);
        match &base_path {
            Some(path) => info!(base_path = %path.display(), "Asset base path set"),
            None => warn!(document_file = %document_file, "Document has no asset base path"),
        }
        *self.base_path.write().await = base_path;
        Ok(())
    }

    async fn move_file_into(&self, source: &Path, relative_dest: &Path) -> Result<PathBuf> {
        let dest = self.resolve(relative_dest).await?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if let Err(rename_err) = tokio::fs::rename(source, &dest).await {
            // Temporary outputs often live on another device; fall back to copying
            debug!(from = %source.display(), to = %dest.display(), error = %rename_err, "Rename failed, copying");
            tokio::fs::copy(source, &dest)
                .await
                .map_err(|source_err| Error::Move {
                    from: source.to_path_buf(),
                    to: dest.clone(),
                    source: source_err,
                })?;
            if let Err(e) = tokio::fs::remove_file(source).await {
                warn!(path = %source.display(), error = %e, "Failed to remove copied temporary file");
            }
        }

        Ok(dest)
    }

    async fn remove_file_within(&self, relative_path: &Path) -> Result<()> {
        let path = self.resolve(relative_path).await?;
        self.remove_file_absolute(&path).await
    }

    async fn remove_file_absolute(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Remove {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }
}

/// True if `relative` stays inside whatever directory it is joined to.
fn is_contained(relative: &Path) -> bool {
    relative
        .components()
        .all(|component| matches!(component, PathComponent::Normal(_) | PathComponent::CurDir))
}
