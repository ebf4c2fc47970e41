//! The Kubernetes substrate.
//!
//! An environment is one Helm release whose name and namespace both equal
//! the environment name. The release's user-supplied values embed the full
//! configuration document, which makes the Helm release store the registry
//! for this substrate; nothing is recorded locally.

use async_trait::async_trait;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::{
    config::{
        build_k8s_urls, EnvUrls, EnvironmentConfig, INGRESS_POLL_INTERVAL, INGRESS_READY_TIMEOUT,
    },
    error::EposctlError,
    render::{self, ingress_host, DeploymentBundle, HelmValues, INGRESS_NAME},
    utils::{CHART_SUBDIR, VALUES_FILENAME},
    EposctlResult,
};

use super::{
    helm::Helm, kubectl::Kubectl, tunnel::PortForward, Environment, Substrate, SubstrateKind,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The Kubernetes substrate backend.
pub struct K8sSubstrate {
    /// Name of the kube-context all operations run against.
    context: String,

    /// Wrapper around the `helm` binary.
    helm: Helm,

    /// Wrapper around the `kubectl` binary.
    kubectl: Kubectl,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl K8sSubstrate {
    /// Creates a backend scoped to the given kube-context.
    pub fn new(context: impl AsRef<str>) -> Self {
        let context = context.as_ref().to_string();
        Self {
            helm: Helm::new(&context),
            kubectl: Kubectl::new(&context),
            context,
        }
    }

    /// The kube-context this backend runs against.
    pub fn context(&self) -> &str {
        &self.context
    }

    /// The kubectl wrapper of this backend.
    pub fn kubectl(&self) -> &Kubectl {
        &self.kubectl
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl Substrate for K8sSubstrate {
    fn kind(&self) -> SubstrateKind {
        SubstrateKind::K8s
    }

    async fn preflight(&self, _config: &mut EnvironmentConfig) -> EposctlResult<()> {
        self.kubectl.ensure_context().await
    }

    async fn pull_images(&self, _config: &EnvironmentConfig) -> EposctlResult<()> {
        // The cluster pulls images itself when pods are scheduled.
        debug!("Image pull is delegated to the cluster");
        Ok(())
    }

    async fn render_bundle(&self, config: &EnvironmentConfig) -> EposctlResult<DeploymentBundle> {
        render::render_k8s(config).await
    }

    async fn up(
        &self,
        config: &EnvironmentConfig,
        bundle: &DeploymentBundle,
        fresh: bool,
    ) -> EposctlResult<()> {
        let name = config.get_name();
        self.helm
            .install(
                name,
                name,
                &bundle.file(CHART_SUBDIR),
                &bundle.file(VALUES_FILENAME),
                fresh,
            )
            .await
    }

    async fn wait_ready(&self, config: &EnvironmentConfig) -> EposctlResult<()> {
        // With an explicit domain the entry point is known up front; only
        // the default domain needs the ingress-published address.
        if !ingress_host(config).is_empty() {
            return Ok(());
        }

        info!("Waiting for the environment ingress to receive an address");
        let deadline = Instant::now() + INGRESS_READY_TIMEOUT;
        loop {
            if self
                .kubectl
                .ingress_address(config.get_name(), INGRESS_NAME)
                .await?
                .is_some()
            {
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(EposctlError::IngressNotReady(config.get_name().clone()));
            }

            sleep(INGRESS_POLL_INTERVAL).await;
        }
    }

    async fn down(&self, name: &str, volumes: bool) -> EposctlResult<()> {
        self.helm.uninstall(name, name).await?;

        if volumes {
            // Volume claims live in the namespace, so removing it wipes the
            // environment's persistent state.
            self.kubectl.delete_namespace(name).await?;
        }

        Ok(())
    }

    async fn build_urls(&self, config: &EnvironmentConfig) -> EposctlResult<EnvUrls> {
        let host = ingress_host(config);
        let host = if host.is_empty() {
            self.kubectl
                .ingress_address(config.get_name(), INGRESS_NAME)
                .await?
                .ok_or_else(|| EposctlError::IngressNotReady(config.get_name().clone()))?
        } else {
            host
        };

        Ok(build_k8s_urls(config, &host))
    }

    fn assemble(&self, config: EnvironmentConfig, urls: EnvUrls) -> Environment {
        Environment::builder()
            .name(config.get_name().clone())
            .kind(SubstrateKind::K8s)
            .config(config)
            .urls(urls)
            .context(Some(self.context.clone()))
            .build()
    }

    async fn resume(&self, name: &str) -> EposctlResult<()> {
        // An atomic upgrade rolls back to the previous release on its own,
        // so there is nothing to restart here.
        debug!("Release `{}` recovers through Helm's rollback", name);
        Ok(())
    }

    async fn record(&self, environment: &Environment) -> EposctlResult<()> {
        // The Helm release itself is the record.
        debug!(
            "Release `{}` is tracked by its managed-by label",
            environment.get_name()
        );
        Ok(())
    }

    async fn erase_record(&self, _name: &str) -> EposctlResult<()> {
        Ok(())
    }

    async fn list(&self) -> EposctlResult<Vec<Environment>> {
        let releases = self.helm.list_releases().await?;

        let mut environments = Vec::with_capacity(releases.len());
        for release in releases {
            match self.get(&release.name).await {
                Ok(environment) => environments.push(environment),
                Err(error) => warn!("Skipping release `{}`: {}", release.name, error),
            }
        }

        Ok(environments)
    }

    async fn get(&self, name: &str) -> EposctlResult<Environment> {
        let raw = match self.helm.get_values(name, name).await {
            Ok(raw) => raw,
            Err(EposctlError::CommandFailed { stderr, .. }) if stderr.contains("not found") => {
                return Err(EposctlError::EnvironmentNotFound(name.to_string()));
            }
            Err(error) => return Err(error),
        };

        let values: HelmValues = serde_yaml::from_str(&raw)?;
        let config = values.get_config().clone();
        let urls = self.build_urls(&config).await?;

        Ok(Environment::builder()
            .name(name.to_string())
            .kind(SubstrateKind::K8s)
            .config(config)
            .urls(urls)
            .context(Some(self.context.clone()))
            .build())
    }

    async fn delete(&self, name: &str) -> EposctlResult<()> {
        self.down(name, true).await
    }

    async fn open_ingest_tunnel(
        &self,
        environment: &Environment,
    ) -> EposctlResult<Option<PortForward>> {
        let forward = PortForward::open(&self.kubectl, environment.get_name()).await?;
        Ok(Some(forward))
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clean_is_not_a_k8s_capability() {
        let substrate = K8sSubstrate::new("ctx-a");

        let config = EnvironmentConfig::default_k8s("e2");
        let urls = build_k8s_urls(&config, "epos.example.org");
        let environment = Environment::builder()
            .name("e2".to_string())
            .kind(SubstrateKind::K8s)
            .config(config)
            .urls(urls)
            .context(Some("ctx-a".to_string()))
            .build();

        let error = substrate.clean_state(&environment).await.unwrap_err();
        match error {
            EposctlError::UnsupportedCapability {
                operation,
                substrate,
            } => {
                assert_eq!(operation, "clean");
                assert_eq!(substrate, "k8s");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
