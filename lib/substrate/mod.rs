//! Runtime substrates an environment can live on.
//!
//! The lifecycle operations are polymorphic over the [`Substrate`] trait,
//! which models what a runtime must provide: render artifacts, bring a stack
//! up and down, derive its URLs, and account for the environments it hosts.
//! Two backends exist, local Docker Compose ([`DockerSubstrate`]) and
//! Kubernetes through Helm releases ([`K8sSubstrate`]).

use std::{
    fmt::{self, Display},
    path::PathBuf,
};

use async_trait::async_trait;
use getset::Getters;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::{
    config::{EnvUrls, EnvironmentConfig},
    error::EposctlError,
    render::DeploymentBundle,
    EposctlResult,
};

mod docker;
mod helm;
mod k8s;
mod kubectl;
mod process;
mod tunnel;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The runtime substrate an environment lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubstrateKind {
    /// Local Docker Compose.
    Docker,

    /// Kubernetes, driven through Helm releases.
    K8s,
}

/// A deployed environment as one substrate knows it.
///
/// Binds the environment's configuration to its substrate state: for Docker
/// the directory holding the rendered artifacts, for Kubernetes the
/// kube-context of the Helm release. Created by deploy, mutated by update,
/// destroyed by delete.
#[derive(Debug, Clone, PartialEq, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct Environment {
    /// Name of the environment, unique per substrate.
    pub(crate) name: String,

    /// The substrate the environment runs on.
    pub(crate) kind: SubstrateKind,

    /// The configuration the environment was deployed from.
    pub(crate) config: EnvironmentConfig,

    /// The user-facing URLs derived at deploy time.
    pub(crate) urls: EnvUrls,

    /// Directory holding the rendered artifacts. Docker only.
    #[builder(default)]
    pub(crate) directory: Option<PathBuf>,

    /// The kube-context hosting the release. Kubernetes only.
    #[builder(default)]
    pub(crate) context: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// The capability set a runtime substrate provides to the lifecycle
/// operations.
///
/// Registry-flavoured capabilities (`record`, `list`, `get`, ingested-file
/// tracking) are part of the set because their backing differs per
/// substrate: Docker keeps a local SQLite registry while Kubernetes treats
/// the Helm release store as authoritative.
#[async_trait]
pub trait Substrate: Send + Sync {
    /// The substrate variant, used in messages and typed errors.
    fn kind(&self) -> SubstrateKind;

    /// Substrate-specific pre-flight, run before anything is rendered.
    ///
    /// Docker moves occupied default ports onto free ephemeral ones;
    /// Kubernetes verifies that the requested kube-context exists.
    async fn preflight(&self, config: &mut EnvironmentConfig) -> EposctlResult<()>;

    /// Pulls the configured workload images ahead of start-up.
    async fn pull_images(&self, config: &EnvironmentConfig) -> EposctlResult<()>;

    /// Renders the deployment artifacts for this substrate into a fresh
    /// temporary bundle.
    async fn render_bundle(&self, config: &EnvironmentConfig) -> EposctlResult<DeploymentBundle>;

    /// Brings the stack up from a rendered bundle.
    ///
    /// `fresh` distinguishes a first install from the re-apply of an
    /// existing environment; Helm maps this onto install versus upgrade.
    async fn up(
        &self,
        config: &EnvironmentConfig,
        bundle: &DeploymentBundle,
        fresh: bool,
    ) -> EposctlResult<()>;

    /// Waits until the environment's entry point is addressable.
    async fn wait_ready(&self, config: &EnvironmentConfig) -> EposctlResult<()>;

    /// Takes the stack down. `volumes` additionally removes its persistent
    /// state.
    async fn down(&self, name: &str, volumes: bool) -> EposctlResult<()>;

    /// Derives the environment's user-facing URLs.
    async fn build_urls(&self, config: &EnvironmentConfig) -> EposctlResult<EnvUrls>;

    /// Binds a configuration and its derived URLs into the environment
    /// handle this substrate hands out.
    fn assemble(&self, config: EnvironmentConfig, urls: EnvUrls) -> Environment;

    /// Brings an installed environment back up from the state the substrate
    /// already holds, without re-rendering anything.
    async fn resume(&self, name: &str) -> EposctlResult<()>;

    /// Makes a deployed environment visible to [`list`](Substrate::list) and
    /// [`get`](Substrate::get).
    ///
    /// On Kubernetes the Helm release itself is the record, so this is a
    /// no-op there.
    async fn record(&self, environment: &Environment) -> EposctlResult<()>;

    /// Removes an environment's record without touching the running stack.
    /// Absence of the record is not an error.
    async fn erase_record(&self, name: &str) -> EposctlResult<()>;

    /// Lists the environments this substrate hosts.
    async fn list(&self) -> EposctlResult<Vec<Environment>>;

    /// Fetches one environment by name, failing with a distinguishable
    /// not-found error when it does not exist.
    async fn get(&self, name: &str) -> EposctlResult<Environment>;

    /// Removes an environment entirely: stack, persistent state, and
    /// record.
    async fn delete(&self, name: &str) -> EposctlResult<()>;

    /// Wipes the environment's metadata state and restarts the stateful
    /// workloads, leaving the rest of the stack in place.
    ///
    /// Only Docker provides this capability.
    async fn clean_state(&self, _environment: &Environment) -> EposctlResult<()> {
        Err(EposctlError::UnsupportedCapability {
            operation: "clean".to_string(),
            substrate: self.kind().to_string(),
        })
    }

    /// Records a TTL file as successfully ingested into the environment.
    ///
    /// Only Docker tracks ingested files; the default implementation drops
    /// the record.
    async fn record_ingested(&self, _name: &str, _path: &std::path::Path) -> EposctlResult<()> {
        Ok(())
    }

    /// Lists the TTL paths recorded as ingested into the environment.
    async fn ingested_files(&self, _name: &str) -> EposctlResult<Vec<PathBuf>> {
        Ok(Vec::new())
    }

    /// Forgets all ingested-file records of the environment.
    async fn clear_ingested(&self, _name: &str) -> EposctlResult<()> {
        Ok(())
    }

    /// Opens a tunnelled transport to the environment's ingest endpoint,
    /// when this substrate needs one. Docker talks to its published ports
    /// directly and returns `None`.
    async fn open_ingest_tunnel(
        &self,
        _environment: &Environment,
    ) -> EposctlResult<Option<PortForward>> {
        Ok(None)
    }
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SubstrateKind {
    /// Returns the well-known name of the substrate.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubstrateKind::Docker => "docker",
            SubstrateKind::K8s => "k8s",
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Display for SubstrateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use docker::*;
pub use helm::*;
pub use k8s::*;
pub use kubectl::*;
pub use process::*;
pub use tunnel::*;
