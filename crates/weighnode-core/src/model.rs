//! Weight node data model.
//!
//! Plain value types shared by the connection state machine, the sensor
//! read path and the platform adapters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// IPv4 interface addressing, as reported by the stack or applied statically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpInfo {
    /// Interface address.
    pub ip: Ipv4Addr,
    /// Subnet mask.
    pub netmask: Ipv4Addr,
    /// Default gateway.
    pub gateway: Ipv4Addr,
}

impl IpInfo {
    /// Create a new addressing record.
    pub fn new(ip: Ipv4Addr, netmask: Ipv4Addr, gateway: Ipv4Addr) -> Self {
        Self {
            ip,
            netmask,
            gateway,
        }
    }

    /// Prefix length of the netmask (e.g. 24 for 255.255.255.0).
    pub fn prefix_len(&self) -> u32 {
        u32::from(self.netmask).count_ones()
    }
}

impl fmt::Display for IpInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} gw {}",
            self.ip,
            self.prefix_len(),
            self.gateway
        )
    }
}

/// Station association lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Driver not started yet.
    Idle,
    /// Association (or re-association) in progress.
    Connecting,
    /// Associated with an IPv4 address.
    Connected(IpInfo),
    /// Retries exhausted.
    Failed,
    /// The bounded wait expired before any terminal event arrived.
    TimedOut,
}

impl ConnectionState {
    /// Whether no further events are processed in this state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connected(_) | ConnectionState::Failed | ConnectionState::TimedOut
        )
    }
}

/// One sample taken from the load cell.
///
/// A failed read is represented by [`SensorReading::SENTINEL`], whose value is
/// zero, so callers that only care about the number degrade gracefully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorReading {
    value: i32,
    valid: bool,
}

impl SensorReading {
    /// The "no reading" value.
    pub const SENTINEL: SensorReading = SensorReading {
        value: 0,
        valid: false,
    };

    /// A successful, averaged reading.
    pub fn new(value: i32) -> Self {
        Self { value, valid: true }
    }

    /// Raw averaged value (zero for the sentinel).
    pub fn value(&self) -> i32 {
        self.value
    }

    /// Whether the hardware actually produced this value.
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}
