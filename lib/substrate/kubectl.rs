//! Thin wrapper around the `kubectl` binary.

use tokio::process::{Child, Command};

use crate::{error::EposctlError, EposctlResult};

use super::process::{run_command, start_command};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Runs `kubectl` against one kube-context.
#[derive(Debug, Clone)]
pub struct Kubectl {
    /// Name of the kube-context every invocation is scoped to.
    context: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Kubectl {
    /// Creates a wrapper scoped to the given kube-context.
    pub fn new(context: impl AsRef<str>) -> Self {
        Self {
            context: context.as_ref().to_string(),
        }
    }

    /// Verifies that the context is known to the local kubectl
    /// configuration.
    pub async fn ensure_context(&self) -> EposctlResult<()> {
        let mut command = Command::new("kubectl");
        command.arg("config").arg("get-contexts").arg("-o").arg("name");
        let stdout = run_command(command, true).await?;

        if stdout.lines().any(|line| line.trim() == self.context) {
            return Ok(());
        }

        Err(EposctlError::UnknownContext(self.context.clone()))
    }

    /// Returns the address assigned to an ingress, or `None` while the
    /// ingress controller has not published one yet.
    pub async fn ingress_address(
        &self,
        namespace: &str,
        ingress: &str,
    ) -> EposctlResult<Option<String>> {
        for field in ["ip", "hostname"] {
            let mut command = self.command();
            command
                .arg("get")
                .arg("ingress")
                .arg(ingress)
                .arg("-n")
                .arg(namespace)
                .arg("-o")
                .arg(format!(
                    "jsonpath={{.status.loadBalancer.ingress[0].{}}}",
                    field
                ));

            let stdout = run_command(command, true).await?;
            let address = stdout.trim();
            if !address.is_empty() {
                return Ok(Some(address.to_string()));
            }
        }

        Ok(None)
    }

    /// Deletes a namespace, tolerating its absence.
    pub async fn delete_namespace(&self, namespace: &str) -> EposctlResult<()> {
        let mut command = self.command();
        command
            .arg("delete")
            .arg("namespace")
            .arg(namespace)
            .arg("--ignore-not-found");
        run_command(command, false).await?;

        Ok(())
    }

    /// Spawns a `kubectl port-forward` towards a workload and returns the
    /// running child. The caller watches its stdout for readiness and owns
    /// its termination.
    pub fn port_forward(
        &self,
        namespace: &str,
        target: &str,
        local_port: u16,
        remote_port: u16,
    ) -> EposctlResult<Child> {
        let mut command = self.command();
        command
            .arg("port-forward")
            .arg("-n")
            .arg(namespace)
            .arg(target)
            .arg(format!("{}:{}", local_port, remote_port))
            .kill_on_drop(true);

        start_command(command)
    }

    fn command(&self) -> Command {
        let mut command = Command::new("kubectl");
        command.arg("--context").arg(&self.context);
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
        let kubectl = Kubectl::new("ctx-a");
        assert_eq!(render_command(&kubectl.command()), "kubectl --context ctx-a");
    }
}
