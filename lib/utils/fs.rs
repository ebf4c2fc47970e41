use std::path::{Path, PathBuf};

use crate::EposctlResult;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Recursively copies the contents of `src` into `dst`, creating `dst` if needed.
///
/// Symbolic links are followed; environment directories only ever contain
/// regular files written by the renderer.
pub async fn copy_dir_all(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> EposctlResult<()> {
    let src = src.as_ref().to_path_buf();
    let dst = dst.as_ref().to_path_buf();

    tokio::task::spawn_blocking(move || copy_dir_blocking(&src, &dst)).await?
}

/// Removes a directory tree, treating an already-absent directory as success.
pub async fn remove_dir_all_if_exists(path: impl AsRef<Path>) -> EposctlResult<()> {
    match tokio::fs::remove_dir_all(path.as_ref()).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => Ok(other?),
    }
}

/// Collects the relative paths of all regular files under `root`, sorted.
///
/// Used to compare directory trees in tests and drift checks.
pub fn relative_file_paths(root: impl AsRef<Path>) -> EposctlResult<Vec<PathBuf>> {
    let root = root.as_ref();
    let mut paths = Vec::new();

    for entry in walkdir::WalkDir::new(root) {
        let entry = entry?;
        if entry.file_type().is_file() {
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_path_buf();
            paths.push(relative);
        }
    }

    paths.sort();
    Ok(paths)
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn copy_dir_blocking(src: &Path, dst: &Path) -> EposctlResult<()> {
    for entry in walkdir::WalkDir::new(src) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
