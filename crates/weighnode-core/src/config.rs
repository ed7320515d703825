//! Node configuration.
//!
//! One document describes a node: Wi-Fi credentials and retry policy, the
//! optional static addressing override, sensor wiring, indicator behaviour,
//! payload shape and boot policy. It is parsed from TOML:
//! - Linux host: read from a file given on the command line
//! - ESP32: embedded into the firmware image at compile time
//!
//! Every section has defaults, so a minimal file only needs `[network] ssid`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::boot::BootPolicy;
use crate::encoder::{worst_case_len, PAYLOAD_CAPACITY};
use crate::hx711::Gain;
use crate::indicator::IndicatorPolicy;
use crate::model::IpInfo;

/// Longest SSID accepted by 802.11.
pub const MAX_SSID_LEN: usize = 32;

/// Longest WPA passphrase.
pub const MAX_PASSWORD_LEN: usize = 64;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read configuration from {path}: {source}")]
    ReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid TOML or does not match the schema.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// The document parsed but describes an unusable node.
    #[error("Invalid configuration: {0}")]
    InvalidData(String),
}

/// Complete node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub network: NetworkConfig,
    pub sensor: SensorConfig,
    pub indicator: IndicatorConfig,
    pub payload: PayloadConfig,
    pub server: ServerConfig,
    pub boot: BootPolicy,
}

impl NodeConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: NodeConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.network.validate()?;

        if self.sensor.average_times == 0 {
            return Err(ConfigError::InvalidData(
                "sensor.average_times must be at least 1".to_string(),
            ));
        }

        if let Some(id) = self.payload.bin_id.as_deref() {
            let needed = worst_case_len(Some(id))
                .map_err(|e| ConfigError::InvalidData(format!("payload.bin_id: {}", e)))?;
            if needed > PAYLOAD_CAPACITY {
                return Err(ConfigError::InvalidData(format!(
                    "payload.bin_id is too long: worst-case payload needs {} bytes, capacity is {}",
                    needed, PAYLOAD_CAPACITY
                )));
            }
        }

        Ok(())
    }
}

// ============================================================================
// Network
// ============================================================================

/// Weakest authentication mode the station will accept from an access point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFloor {
    Open,
    Wep,
    WpaPersonal,
    #[default]
    Wpa2Personal,
    WpaWpa2Personal,
    Wpa3Personal,
    Wpa2Wpa3Personal,
}

/// Station credentials and association policy.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Network name.
    pub ssid: String,

    /// Passphrase (empty for open networks).
    pub password: String,

    /// Weakest accepted authentication mode.
    pub auth_floor: AuthFloor,

    /// Reconnect attempts after a disconnect before giving up.
    pub max_retries: u32,

    /// Upper bound on the boot-time association wait; 0 waits indefinitely.
    pub connect_timeout_ms: u64,

    /// Static addressing override (DHCP is used when absent).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_ip: Option<StaticIpConfig>,

    /// Host name resolved once after association, as a DNS self-test.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolve_test: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ssid: String::new(),
            password: String::new(),
            auth_floor: AuthFloor::default(),
            max_retries: 5,
            connect_timeout_ms: 60_000,
            static_ip: None,
            resolve_test: None,
        }
    }
}

impl fmt::Debug for NetworkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkConfig")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .field("auth_floor", &self.auth_floor)
            .field("max_retries", &self.max_retries)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("static_ip", &self.static_ip)
            .field("resolve_test", &self.resolve_test)
            .finish()
    }
}

impl NetworkConfig {
    /// Bounded association wait, or `None` for an indefinite wait.
    pub fn connect_timeout(&self) -> Option<Duration> {
        match self.connect_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ssid.is_empty() {
            return Err(ConfigError::InvalidData(
                "network.ssid cannot be empty".to_string(),
            ));
        }
        if self.ssid.len() > MAX_SSID_LEN {
            return Err(ConfigError::InvalidData(format!(
                "network.ssid is longer than {} bytes",
                MAX_SSID_LEN
            )));
        }
        if self.password.len() > MAX_PASSWORD_LEN {
            return Err(ConfigError::InvalidData(format!(
                "network.password is longer than {} bytes",
                MAX_PASSWORD_LEN
            )));
        }
        if self.password.is_empty() && self.auth_floor != AuthFloor::Open {
            return Err(ConfigError::InvalidData(
                "network.password is empty; set network.auth_floor = \"open\" for open networks"
                    .to_string(),
            ));
        }
        if let Some(static_ip) = &self.static_ip {
            static_ip.validate()?;
        }
        Ok(())
    }
}

/// Static addressing applied when the station associates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticIpConfig {
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    #[serde(default)]
    pub dns: DnsConfig,
}

impl StaticIpConfig {
    /// Interface addressing described by this override.
    pub fn ip_info(&self) -> IpInfo {
        IpInfo::new(self.ip, self.netmask, self.gateway)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mask = u32::from(self.netmask);
        if mask == 0 || mask.leading_ones() + mask.trailing_zeros() != 32 {
            return Err(ConfigError::InvalidData(format!(
                "network.static_ip.netmask {} is not a contiguous mask",
                self.netmask
            )));
        }
        if u32::from(self.ip) & mask != u32::from(self.gateway) & mask {
            return Err(ConfigError::InvalidData(format!(
                "network.static_ip.gateway {} is outside {}/{}",
                self.gateway,
                self.ip,
                mask.count_ones()
            )));
        }
        Ok(())
    }
}

/// DNS servers installed together with a static address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum DnsConfig {
    /// Use the gateway as the main server, no backup.
    #[default]
    Auto,
    /// Explicit servers.
    Manual {
        main: Ipv4Addr,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        backup: Option<Ipv4Addr>,
    },
}

impl DnsConfig {
    /// Resolve to `(main, backup)` for the given gateway.
    pub fn servers(&self, gateway: Ipv4Addr) -> (Option<Ipv4Addr>, Option<Ipv4Addr>) {
        match self {
            DnsConfig::Auto => (Some(gateway), None),
            DnsConfig::Manual { main, backup } => (Some(*main), *backup),
        }
    }
}

// ============================================================================
// Hardware
// ============================================================================

/// Load-cell wiring and sampling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// GPIO connected to the HX711 DOUT line.
    pub dout_pin: i32,

    /// GPIO connected to the HX711 PD_SCK line.
    pub sck_pin: i32,

    /// Channel and gain programmed after each conversion.
    pub gain: Gain,

    /// Sub-reads averaged into one reading.
    pub average_times: u8,

    /// How long to wait for the converter to become ready.
    pub ready_timeout_ms: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            dout_pin: 19,
            sck_pin: 18,
            gain: Gain::A64,
            average_times: 10,
            ready_timeout_ms: 500,
        }
    }
}

impl SensorConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }
}

/// Activity indicator wiring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub pin: i32,
    pub policy: IndicatorPolicy,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            pin: 2,
            policy: IndicatorPolicy::default(),
        }
    }
}

// ============================================================================
// Service
// ============================================================================

/// Shape of the `/data` document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadConfig {
    /// Bin identifier emitted as `"id"` when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bin_id: Option<String>,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { http_port: 80 }
    }
}
