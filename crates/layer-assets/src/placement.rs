//! Asset placement
//!
//! Decides what happens to a finished render's temporary output and to the
//! artifacts of removed components.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::component::Component;
use crate::error::Result;
use crate::files::AssetFiles;

/// What [`place`] did with a render's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Moved to this absolute path
    Placed(PathBuf),
    /// The component has no destination; the output was deleted
    Discarded,
}

/// Move `temp_path` to the component's destination, or delete it if the
/// component has none.
pub async fn place(
    files: &dyn AssetFiles,
    component: &Component,
    temp_path: &Path,
) -> Result<Placement> {
    match component.destination() {
        Some(dest) => {
            let placed = files.move_file_into(temp_path, &dest).await?;
            Ok(Placement::Placed(placed))
        }
        None => {
            discard(files, temp_path).await?;
            Ok(Placement::Discarded)
        }
    }
}

/// Delete a temporary output that will never be placed.
pub async fn discard(files: &dyn AssetFiles, temp_path: &Path) -> Result<()> {
    debug!(path = %temp_path.display(), "Discarding render output");
    files.remove_file_absolute(temp_path).await
}

/// Delete the artifact a removed component may have placed earlier.
///
/// Returns the relative path that was targeted, if the component had a destination.
pub async fn remove_artifact(
    files: &dyn AssetFiles,
    component: &Component,
) -> Result<Option<PathBuf>> {
    let Some(dest) = component.destination() else {
        return Ok(None);
    };
    files.remove_file_within(&dest).await?;
    Ok(Some(dest))
}
