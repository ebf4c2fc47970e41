//! Loopback tunnel into a cluster-hosted environment.
//!
//! Ingestion prefers talking to the gateway through `kubectl port-forward`
//! rather than through the public ingress, so that bulk uploads do not
//! depend on ingress body-size limits. The tunnel is a child process whose
//! stdout announces readiness; it stays open until [`PortForward::close`]
//! is called.

use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};

use getset::CopyGetters;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Child,
    sync::oneshot,
    time,
};
use tracing::{debug, error};

use crate::{
    config::{GATEWAY_CONTAINER_PORT, PORT_FORWARD_READY_TIMEOUT},
    error::EposctlError,
    render::SERVICE_GATEWAY,
    EposctlResult,
};

use super::kubectl::Kubectl;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Line `kubectl port-forward` prints once the listener is bound.
const READY_MARKER: &str = "Forwarding from";

/// How long a closed tunnel gets to exit after SIGINT before it is killed.
const CLOSE_GRACE_PERIOD: time::Duration = time::Duration::from_secs(2);

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A running `kubectl port-forward` towards an environment's gateway.
#[derive(Debug, CopyGetters)]
pub struct PortForward {
    /// The forwarding child process.
    child: Child,

    /// Loopback port the tunnel listens on.
    #[getset(get_copy = "pub with_prefix")]
    local_port: u16,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl PortForward {
    /// Opens a tunnel from a free loopback port to the gateway workload in
    /// the given namespace and waits until `kubectl` reports that the
    /// listener is bound.
    pub async fn open(kubectl: &Kubectl, namespace: &str) -> EposctlResult<Self> {
        let local_port = free_local_port()?;
        let mut child = kubectl.port_forward(
            namespace,
            &format!("deployment/{}", SERVICE_GATEWAY),
            local_port,
            GATEWAY_CONTAINER_PORT,
        )?;

        let (ready_tx, ready_rx) = oneshot::channel();
        watch_for_readiness(&mut child, ready_tx);
        drain_stderr(&mut child);

        match time::timeout(PORT_FORWARD_READY_TIMEOUT, ready_rx).await {
            Ok(Ok(())) => {
                debug!("Port-forward to {} ready on 127.0.0.1:{}", namespace, local_port);
                Ok(Self { child, local_port })
            }
            Ok(Err(_)) => {
                terminate(&mut child).await?;
                Err(EposctlError::PortForwardFailed(
                    "kubectl exited before reporting readiness".to_string(),
                ))
            }
            Err(_) => {
                terminate(&mut child).await?;
                Err(EposctlError::PortForwardFailed(format!(
                    "no listener after {}s",
                    PORT_FORWARD_READY_TIMEOUT.as_secs()
                )))
            }
        }
    }

    /// Shuts the tunnel down, giving `kubectl` a grace period to exit on
    /// its own before killing it.
    pub async fn close(mut self) -> EposctlResult<()> {
        terminate(&mut self.child).await
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// Asks the OS for a free loopback port by binding port zero.
///
/// The listener is dropped before `kubectl` rebinds the port, which leaves
/// a small window for another process to claim it; an unlucky collision
/// surfaces as a failed port-forward rather than silent misrouting.
fn free_local_port() -> EposctlResult<u16> {
    let listener = TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))?;
    Ok(listener.local_addr()?.port())
}

/// Spawns a task that scans the child's stdout for the readiness marker
/// and keeps draining afterwards so the pipe never fills up.
fn watch_for_readiness(child: &mut Child, ready_tx: oneshot::Sender<()>) {
    let Some(stdout) = child.stdout.take() else {
        return;
    };

    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        let mut ready_tx = Some(ready_tx);
        while let Ok(Some(line)) = lines.next_line().await {
            debug!("port-forward: {}", line);
            if line.contains(READY_MARKER) {
                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(());
                }
            }
        }
    });
}

/// Spawns a task that surfaces the child's stderr in the log stream.
fn drain_stderr(child: &mut Child) {
    let Some(stderr) = child.stderr.take() else {
        return;
    };

    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            error!("port-forward: {}", line);
        }
    });
}

/// Stops the forwarding process, preferring an interrupt so `kubectl` can
/// tear the tunnel down cleanly.
async fn terminate(child: &mut Child) -> EposctlResult<()> {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        if signal::kill(Pid::from_raw(pid as i32), Signal::SIGINT).is_ok()
            && time::timeout(CLOSE_GRACE_PERIOD, child.wait()).await.is_ok()
        {
            return Ok(());
        }
    }

    child.kill().await?;
    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_local_port_returns_a_bindable_port() {
        let port = free_local_port().unwrap();
        assert_ne!(port, 0);

        // The port is free again once the probe listener is gone.
        TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)).unwrap();
    }
}
