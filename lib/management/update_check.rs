//! Advisory check for newer workload images.

use chrono::{DateTime, Utc};
use futures::future;
use getset::Getters;
use oci_spec::distribution::Reference;
use tokio::{sync::Semaphore, time};
use tracing::debug;

use crate::{
    config::{EnvironmentConfig, IMAGE_CHECK_CONCURRENCY, IMAGE_CHECK_TIMEOUT},
    oci::RegistryClient,
    substrate, EposctlResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// How a locally cached image compares to its registry counterpart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageStatus {
    /// The local digest matches the registry digest.
    UpToDate,

    /// The registry serves a different digest for the same reference.
    UpdateAvailable {
        /// Build time of the registry image, when its config reports one.
        created: Option<DateTime<Utc>>,
    },

    /// The image is not present in the local daemon at all.
    ImageMissing,
}

/// The comparison result for one workload's image.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ImageCheck {
    /// Workload id the image belongs to.
    workload: String,

    /// The image reference as configured.
    image: String,

    /// Comparison outcome.
    status: ImageStatus,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Compares the configured images of all enabled workloads against their
/// registries.
///
/// The check is advisory: a reference whose registry cannot be reached
/// within the per-image deadline is skipped rather than failing the
/// enclosing operation, so the result only ever contains conclusive
/// comparisons.
pub async fn check_image_updates(config: &EnvironmentConfig) -> Vec<ImageCheck> {
    let registry = RegistryClient::new();
    let semaphore = Semaphore::new(IMAGE_CHECK_CONCURRENCY);

    let mut tasks = Vec::new();
    for workload in config.enabled_workloads() {
        let Some(image) = config.get_images().get(workload) else {
            continue;
        };

        let registry = &registry;
        let semaphore = &semaphore;
        tasks.push(async move {
            let _permit = semaphore.acquire().await.ok()?;
            match time::timeout(IMAGE_CHECK_TIMEOUT, check_image(registry, image)).await {
                Ok(Ok(status)) => Some(ImageCheck {
                    workload: workload.to_string(),
                    image: image.to_string(),
                    status,
                }),
                Ok(Err(error)) => {
                    debug!("Skipping update check for `{}`: {}", image, error);
                    None
                }
                Err(_) => {
                    debug!("Update check for `{}` timed out", image);
                    None
                }
            }
        });
    }

    future::join_all(tasks).await.into_iter().flatten().collect()
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

async fn check_image(registry: &RegistryClient, image: &Reference) -> EposctlResult<ImageStatus> {
    let Some(local) = substrate::local_image_digest(image).await? else {
        return Ok(ImageStatus::ImageMissing);
    };

    let remote = registry.head_digest(image).await?;
    if local == remote {
        return Ok(ImageStatus::UpToDate);
    }

    let created = registry.image_created(image).await?;
    Ok(ImageStatus::UpdateAvailable { created })
}
