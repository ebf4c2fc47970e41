//! Rendering of substrate-specific deployment artifacts.
//!
//! Both renderers write into a freshly-made temporary directory owned by a
//! [`DeploymentBundle`]; the bundle is removed on drop, so artifacts survive
//! an operation only by being installed into an environment directory.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::{utils, EposctlResult};

mod docker;
mod expand;
mod helm;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use docker::*;
pub use expand::*;
pub use helm::*;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Service name of the API gateway in compose documents and manifests.
pub const SERVICE_GATEWAY: &str = "gateway";

/// Service name of the platform GUI.
pub const SERVICE_PLATFORM_GUI: &str = "platform-gui";

/// Service name of the backoffice UI.
pub const SERVICE_BACKOFFICE_GUI: &str = "backoffice-ui";

/// Service name of the backoffice service.
pub const SERVICE_BACKOFFICE_SERVICE: &str = "backoffice-service";

/// Service name of the converter service.
pub const SERVICE_CONVERTER_SERVICE: &str = "converter-service";

/// Service name of the converter routine.
pub const SERVICE_CONVERTER_ROUTINE: &str = "converter-routine";

/// Service name of the resources service.
pub const SERVICE_RESOURCES_SERVICE: &str = "resources-service";

/// Service name of the ingestor service.
pub const SERVICE_INGESTOR_SERVICE: &str = "ingestor-service";

/// Service name of the external access service.
pub const SERVICE_EXTERNAL_ACCESS_SERVICE: &str = "external-access-service";

/// Service name of the sharing service.
pub const SERVICE_SHARING_SERVICE: &str = "sharing-service";

/// Service name of the email sender service.
pub const SERVICE_EMAIL_SENDER_SERVICE: &str = "email-sender-service";

/// Service name of the RabbitMQ broker.
pub const SERVICE_RABBITMQ: &str = "rabbitmq";

/// Service name of the metadata database.
pub const SERVICE_METADATA_DATABASE: &str = "metadata-database";

/// Name of the volume backing the metadata database.
pub const VOLUME_METADATA_DATABASE: &str = "psqldata";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Rendered artifacts in a freshly-created temporary directory.
///
/// The directory is exclusively owned by the creating operation and removed
/// on all exit paths when the bundle is dropped.
#[derive(Debug)]
pub struct DeploymentBundle {
    dir: TempDir,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DeploymentBundle {
    /// Creates an empty bundle in a fresh temporary directory.
    pub fn new() -> EposctlResult<Self> {
        Ok(DeploymentBundle {
            dir: tempfile::tempdir()?,
        })
    }

    /// The directory holding the rendered artifacts.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The path of a named artifact inside the bundle.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Copies the bundle's contents into `destination`, creating it as needed.
    ///
    /// Used to install rendered artifacts into an environment directory; the
    /// bundle itself remains transient.
    pub async fn install_into(&self, destination: impl AsRef<Path>) -> EposctlResult<()> {
        let destination = destination.as_ref();
        tokio::fs::create_dir_all(destination).await?;
        utils::copy_dir_all(self.dir.path(), destination).await
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Maps a workload id from the configuration to its service name in
/// rendered artifacts.
pub fn service_name(workload: &str) -> Option<&'static str> {
    match workload {
        crate::config::WORKLOAD_PLATFORM_GUI => Some(SERVICE_PLATFORM_GUI),
        crate::config::WORKLOAD_GATEWAY => Some(SERVICE_GATEWAY),
        crate::config::WORKLOAD_BACKOFFICE_GUI => Some(SERVICE_BACKOFFICE_GUI),
        crate::config::WORKLOAD_BACKOFFICE_SERVICE => Some(SERVICE_BACKOFFICE_SERVICE),
        crate::config::WORKLOAD_CONVERTER_SERVICE => Some(SERVICE_CONVERTER_SERVICE),
        crate::config::WORKLOAD_CONVERTER_ROUTINE => Some(SERVICE_CONVERTER_ROUTINE),
        crate::config::WORKLOAD_RESOURCES_SERVICE => Some(SERVICE_RESOURCES_SERVICE),
        crate::config::WORKLOAD_INGESTOR_SERVICE => Some(SERVICE_INGESTOR_SERVICE),
        crate::config::WORKLOAD_EXTERNAL_ACCESS_SERVICE => Some(SERVICE_EXTERNAL_ACCESS_SERVICE),
        crate::config::WORKLOAD_SHARING_SERVICE => Some(SERVICE_SHARING_SERVICE),
        crate::config::WORKLOAD_EMAIL_SENDER_SERVICE => Some(SERVICE_EMAIL_SENDER_SERVICE),
        crate::config::WORKLOAD_RABBITMQ => Some(SERVICE_RABBITMQ),
        crate::config::WORKLOAD_METADATA_DATABASE => Some(SERVICE_METADATA_DATABASE),
        _ => None,
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bundle_install_copies_artifacts() -> anyhow::Result<()> {
        let bundle = DeploymentBundle::new()?;
        std::fs::write(bundle.file("docker-compose.yaml"), "services: {}\n")?;

        let destination = tempfile::tempdir()?;
        let target = destination.path().join("e1");
        bundle.install_into(&target).await?;

        assert!(target.join("docker-compose.yaml").exists());
        Ok(())
    }

    #[test]
    fn test_every_workload_maps_to_a_service_name() {
        for (workload, _) in crate::config::DEFAULT_IMAGE_REFS {
            assert!(service_name(workload).is_some(), "unmapped: {workload}");
        }
        assert!(service_name("unknown").is_none());
    }
}
