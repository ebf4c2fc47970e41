//! Thin wrapper around the `helm` binary.
//!
//! There is no production-grade Helm client crate, so releases are driven
//! through the CLI the same way `docker` and `kubectl` are. Mutating
//! operations run with `--wait`, `--wait-for-jobs` and `--atomic` so a
//! failed rollout rolls itself back before the error reaches us.

use std::path::Path;

use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::{
    config::{HELM_TIMEOUT, MANAGED_BY_LABEL, MANAGED_BY_VALUE},
    error::EposctlError,
    EposctlResult,
};

use super::process::run_command;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Runs `helm` against one kube-context.
#[derive(Debug, Clone)]
pub struct Helm {
    /// Name of the kube-context every invocation is scoped to.
    context: String,
}

/// One entry of `helm list -o json`.
#[derive(Debug, Clone, Deserialize)]
pub struct HelmRelease {
    /// Name of the release.
    pub name: String,

    /// Namespace the release is installed in.
    pub namespace: String,

    /// Deployment status as helm reports it.
    #[serde(default)]
    pub status: String,

    /// Chart name and version.
    #[serde(default)]
    pub chart: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Helm {
    /// Creates a wrapper scoped to the given kube-context.
    pub fn new(context: impl AsRef<str>) -> Self {
        Self {
            context: context.as_ref().to_string(),
        }
    }

    /// Installs a release from a chart directory and values file, or
    /// upgrades it in place when `fresh` is false.
    ///
    /// Installs label the release as managed by this tool so that
    /// [`list_releases`](Helm::list_releases) can filter on it.
    pub async fn install(
        &self,
        release: &str,
        namespace: &str,
        chart_dir: &Path,
        values: &Path,
        fresh: bool,
    ) -> EposctlResult<()> {
        let mut command = self.command();
        command
            .arg(if fresh { "install" } else { "upgrade" })
            .arg(release)
            .arg(chart_dir)
            .arg("-n")
            .arg(namespace)
            .arg("--create-namespace")
            .arg("-f")
            .arg(values)
            .arg("--wait")
            .arg("--wait-for-jobs")
            .arg("--atomic")
            .arg("--timeout")
            .arg(format!("{}s", HELM_TIMEOUT.as_secs()));

        if fresh {
            command
                .arg("--labels")
                .arg(format!("{}={}", MANAGED_BY_LABEL, MANAGED_BY_VALUE));
        }

        run_command(command, false).await?;
        Ok(())
    }

    /// Uninstalls a release, tolerating its absence.
    pub async fn uninstall(&self, release: &str, namespace: &str) -> EposctlResult<()> {
        let mut command = self.command();
        command
            .arg("uninstall")
            .arg(release)
            .arg("-n")
            .arg(namespace)
            .arg("--wait");

        match run_command(command, true).await {
            Ok(_) => Ok(()),
            Err(EposctlError::CommandFailed { stderr, .. }) if stderr.contains("not found") => {
                debug!("Release `{}` not found, nothing to uninstall", release);
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    /// Lists the releases labelled as managed by this tool, across all
    /// namespaces.
    pub async fn list_releases(&self) -> EposctlResult<Vec<HelmRelease>> {
        let mut command = self.command();
        command
            .arg("list")
            .arg("--all-namespaces")
            .arg("--selector")
            .arg(format!("{}={}", MANAGED_BY_LABEL, MANAGED_BY_VALUE))
            .arg("-o")
            .arg("json");

        let stdout = run_command(command, true).await?;
        let trimmed = stdout.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        Ok(serde_json::from_str(trimmed)?)
    }

    /// Returns the user-supplied values of a release as a YAML document.
    pub async fn get_values(&self, release: &str, namespace: &str) -> EposctlResult<String> {
        let mut command = self.command();
        command
            .arg("get")
            .arg("values")
            .arg(release)
            .arg("-n")
            .arg(namespace)
            .arg("-o")
            .arg("yaml");

        run_command(command, true).await
    }

    /// Renders the chart templates locally and returns the manifest set.
    ///
    /// Template rendering never contacts a cluster, so this is an
    /// associated function rather than a context-scoped method.
    pub async fn template(
        release: &str,
        namespace: &str,
        chart_dir: &Path,
        values: &Path,
    ) -> EposctlResult<String> {
        let mut command = Command::new("helm");
        command
            .arg("template")
            .arg(release)
            .arg(chart_dir)
            .arg("-n")
            .arg(namespace)
            .arg("-f")
            .arg(values);

        run_command(command, true).await
    }

    fn command(&self) -> Command {
        let mut command = Command::new("helm");
        command.arg("--kube-context").arg(&self.context);
        command
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::super::process::render_command;
    use super::*;

    #[test]
    fn test_commands_are_scoped_to_the_context() {
        let helm = Helm::new("ctx-a");
        assert_eq!(
            render_command(&helm.command()),
            "helm --kube-context ctx-a"
        );
    }

    #[test]
    fn test_release_listing_parses_helm_json() -> EposctlResult<()> {
        let raw = r#"[
            {"name":"e2","namespace":"e2","revision":"1","updated":"2025-06-10",
             "status":"deployed","chart":"epos-1.0.0","app_version":"1.0.0"}
        ]"#;

        let releases: Vec<HelmRelease> = serde_json::from_str(raw)?;
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].name, "e2");
        assert_eq!(releases[0].namespace, "e2");
        assert_eq!(releases[0].status, "deployed");

        Ok(())
    }
}
