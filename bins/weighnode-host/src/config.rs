//! Host configuration: the node document plus a `[simulation]` section.

use anyhow::Context;
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::Path;
use weighnode_core::{IpInfo, NodeConfig};

/// Built-in configuration used when no file is given.
pub const DEFAULT_CONFIG: &str = include_str!("../weighnode.toml");

/// Knobs for the simulated Wi-Fi stack and load cell.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Association attempts that fail before one succeeds.
    pub disconnects: u32,

    /// Time the simulated driver takes to answer a connect request.
    pub link_delay_ms: u64,

    /// Never answer connect requests (exercises the bounded wait).
    pub stall: bool,

    /// Address handed out by the simulated DHCP server.
    pub lease_ip: Ipv4Addr,
    pub lease_netmask: Ipv4Addr,
    pub lease_gateway: Ipv4Addr,

    /// Raw counts reported by the simulated load cell.
    pub load: i32,

    /// Peak deviation added to successive conversions.
    pub jitter: i32,

    /// Time per simulated conversion.
    pub conversion_ms: u64,

    /// Simulate an absent or unpowered converter.
    pub sensor_missing: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            disconnects: 0,
            link_delay_ms: 50,
            stall: false,
            lease_ip: Ipv4Addr::new(192, 168, 4, 2),
            lease_netmask: Ipv4Addr::new(255, 255, 255, 0),
            lease_gateway: Ipv4Addr::new(192, 168, 4, 1),
            load: 48_211,
            jitter: 3,
            conversion_ms: 10,
            sensor_missing: false,
        }
    }
}

impl SimulationConfig {
    pub fn lease(&self) -> IpInfo {
        IpInfo::new(self.lease_ip, self.lease_netmask, self.lease_gateway)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SimulationSection {
    simulation: SimulationConfig,
}

/// Everything the host binary reads from its configuration file.
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub node: NodeConfig,
    pub simulation: SimulationConfig,
}

impl HostConfig {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let node = NodeConfig::from_toml_str(text)?;
        let section: SimulationSection =
            toml::from_str(text).context("Failed to parse [simulation]")?;
        Ok(Self {
            node,
            simulation: section.simulation,
        })
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("Invalid configuration in {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = HostConfig::from_toml_str(DEFAULT_CONFIG).unwrap();
        assert!(!config.node.network.ssid.is_empty());
        assert_ne!(config.node.server.http_port, 0);
    }

    #[test]
    fn test_simulation_section() {
        let config = HostConfig::from_toml_str(
            r#"
            [network]
            ssid = "lab"
            password = "secret-pass"

            [simulation]
            disconnects = 2
            sensor_missing = true
            "#,
        )
        .unwrap();

        assert_eq!(config.simulation.disconnects, 2);
        assert!(config.simulation.sensor_missing);
        assert_eq!(config.simulation.link_delay_ms, 50);
    }

    #[test]
    fn test_node_validation_applies() {
        assert!(HostConfig::from_toml_str("[simulation]\ndisconnects = 1\n").is_err());
    }
}
