//! Removal of environments.

use futures::future;
use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::{config::DELETE_CONCURRENCY, error::EposctlError, substrate::Substrate, EposctlResult};

use super::locks;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Removes an environment entirely: stack, volumes, record and
/// ingested-file history.
///
/// Deleting a name that no longer has a running stack still clears its
/// leftovers, so the operation can be retried safely.
pub async fn delete(substrate: &dyn Substrate, name: &str) -> EposctlResult<()> {
    let _guard = locks::lock_environment(name).await;

    info!("Deleting environment `{}`", name);
    substrate.delete(name).await?;
    info!("Environment `{}` deleted", name);

    Ok(())
}

/// Removes several environments concurrently.
///
/// Every name is attempted regardless of sibling failures; the first
/// error is returned once all deletions have finished. Each deletion
/// runs under its own deadline.
pub async fn delete_many(substrate: &dyn Substrate, names: &[String]) -> EposctlResult<()> {
    let semaphore = Semaphore::new(DELETE_CONCURRENCY);

    let mut tasks = Vec::new();
    for name in names {
        let semaphore = &semaphore;
        tasks.push(async move {
            let _permit = semaphore.acquire().await.map_err(EposctlError::custom)?;
            super::with_deadline(delete(substrate, name)).await
        });
    }

    let mut first_error = None;
    for (name, result) in names.iter().zip(future::join_all(tasks).await) {
        if let Err(error) = result {
            error!("Failed to delete `{}`: {}", name, error);
            first_error.get_or_insert(error);
        }
    }

    match first_error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
