//! Backup and rollback of an environment directory.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info};

use crate::{utils, EposctlResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A recursive copy of an environment directory, taken before a mutating
/// operation touches it.
///
/// On success the caller discards the snapshot; on failure it restores the
/// directory to the copied state. Dropping the snapshot removes the backing
/// temporary directory either way.
#[derive(Debug)]
pub struct BackupSnapshot {
    /// The directory the snapshot was taken from, and restores into.
    source: PathBuf,

    /// Holds the copied tree; `None` once restored or discarded.
    backup: Option<TempDir>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl BackupSnapshot {
    /// Copies `source` into a fresh temporary directory.
    pub async fn take(source: impl AsRef<Path>) -> EposctlResult<Self> {
        let source = source.as_ref().to_path_buf();
        let backup = TempDir::new()?;

        utils::copy_dir_all(&source, backup.path()).await?;
        debug!(
            "Backed up {} into {}",
            source.display(),
            backup.path().display()
        );

        Ok(Self {
            source,
            backup: Some(backup),
        })
    }

    /// Puts the source directory back into its snapshotted state, replacing
    /// whatever the failed operation left behind. Calling this twice is a
    /// no-op.
    pub async fn restore(&mut self) -> EposctlResult<()> {
        let Some(backup) = self.backup.take() else {
            return Ok(());
        };

        info!("Restoring {} from backup", self.source.display());
        utils::remove_dir_all_if_exists(&self.source).await?;
        tokio::fs::create_dir_all(&self.source).await?;
        utils::copy_dir_all(backup.path(), &self.source).await?;

        Ok(())
    }

    /// Drops the backup without touching the source directory.
    pub fn discard(&mut self) {
        self.backup = None;
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed(directory: &Path, name: &str, contents: &str) -> EposctlResult<()> {
        tokio::fs::create_dir_all(directory).await?;
        tokio::fs::write(directory.join(name), contents).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_restore_undoes_mutations() -> EposctlResult<()> {
        let root = TempDir::new()?;
        let source = root.path().join("env");
        seed(&source, "config.yaml", "original").await?;

        let mut snapshot = BackupSnapshot::take(&source).await?;

        // Mutate the tree the way a failed update would.
        tokio::fs::write(source.join("config.yaml"), "broken").await?;
        tokio::fs::write(source.join("stray.txt"), "debris").await?;

        snapshot.restore().await?;

        let contents = tokio::fs::read_to_string(source.join("config.yaml")).await?;
        assert_eq!(contents, "original");
        assert!(!source.join("stray.txt").exists());

        // A second restore has nothing left to do.
        snapshot.restore().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_restore_recreates_a_removed_directory() -> EposctlResult<()> {
        let root = TempDir::new()?;
        let source = root.path().join("env");
        seed(&source, "config.yaml", "original").await?;

        let mut snapshot = BackupSnapshot::take(&source).await?;
        utils::remove_dir_all_if_exists(&source).await?;

        snapshot.restore().await?;

        let contents = tokio::fs::read_to_string(source.join("config.yaml")).await?;
        assert_eq!(contents, "original");
        Ok(())
    }

    #[tokio::test]
    async fn test_discard_leaves_mutations_in_place() -> EposctlResult<()> {
        let root = TempDir::new()?;
        let source = root.path().join("env");
        seed(&source, "config.yaml", "original").await?;

        let mut snapshot = BackupSnapshot::take(&source).await?;
        tokio::fs::write(source.join("config.yaml"), "updated").await?;
        snapshot.discard();
        snapshot.restore().await?;

        let contents = tokio::fs::read_to_string(source.join("config.yaml")).await?;
        assert_eq!(contents, "updated");
        Ok(())
    }
}
