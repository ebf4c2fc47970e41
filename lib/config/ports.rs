//! Port pre-flight for Docker environments.

use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};

use crate::EposctlResult;

use super::env_config::EnvironmentConfig;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A port that was found occupied during pre-flight and replaced with a
/// fresh ephemeral port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortReassignment {
    /// The role of the port in the stack.
    pub role: &'static str,
    /// The occupied default port.
    pub from: u16,
    /// The ephemeral port that replaced it.
    pub to: u16,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl EnvironmentConfig {
    /// Replaces occupied default ports with fresh ephemeral ports.
    ///
    /// Engaged only when every published port still carries its embedded
    /// default, meaning the user did not pick ports explicitly. Custom ports
    /// are honoured as-is and their conflicts surface at compose time.
    pub fn ensure_free_ports(&mut self) -> EposctlResult<Vec<PortReassignment>> {
        if !self.ports_are_default() {
            return Ok(Vec::new());
        }

        let mut reassigned = Vec::new();

        let gui = self.components.platform_gui.port;
        if let Some(port) = reassign_if_taken("gui", gui)? {
            self.components.platform_gui.port = port.to;
            reassigned.push(port);
        }

        let gateway = self.components.gateway.port;
        if let Some(port) = reassign_if_taken("api", gateway)? {
            self.components.gateway.port = port.to;
            reassigned.push(port);
        }

        if self.components.backoffice.enabled {
            let backoffice = self.components.backoffice.gui.port;
            if let Some(port) = reassign_if_taken("backoffice", backoffice)? {
                self.components.backoffice.gui.port = port.to;
                reassigned.push(port);
            }
        }

        Ok(reassigned)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// Probes a loopback bind on `port`; on conflict asks the OS for a fresh
/// ephemeral port and reports the swap.
fn reassign_if_taken(role: &'static str, port: u16) -> EposctlResult<Option<PortReassignment>> {
    if TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)).is_ok() {
        return Ok(None);
    }

    let listener = TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))?;
    let fresh = listener.local_addr()?.port();

    tracing::warn!(
        "Port {} is already in use, using new random free port {} for {}",
        port,
        fresh,
        role
    );

    Ok(Some(PortReassignment {
        role,
        from: port,
        to: fresh,
    }))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_GUI_PORT;

    #[test]
    fn test_occupied_default_port_is_reassigned() -> anyhow::Result<()> {
        // Hold the default GUI port so pre-flight must move off it. If the
        // port is already taken by another process the assertion still holds.
        let _guard = TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, DEFAULT_GUI_PORT));

        let mut config = EnvironmentConfig::default_docker("e1");
        let reassigned = config.ensure_free_ports()?;

        let gui_port = *config.get_components().get_platform_gui().get_port();
        assert_ne!(gui_port, DEFAULT_GUI_PORT);
        assert!(gui_port >= 1024);
        assert!(reassigned
            .iter()
            .any(|r| r.role == "gui" && r.from == DEFAULT_GUI_PORT && r.to == gui_port));

        Ok(())
    }

    #[test]
    fn test_custom_ports_are_honoured_as_is() -> anyhow::Result<()> {
        let listener = TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))?;
        let taken = listener.local_addr()?.port();

        let mut config = EnvironmentConfig::default_docker("e1");
        config.components.gateway.port = taken;

        let reassigned = config.ensure_free_ports()?;
        assert!(reassigned.is_empty());
        assert_eq!(*config.get_components().get_gateway().get_port(), taken);

        Ok(())
    }
}
