//! Station connection state machine.
//!
//! [`ConnectionManager`] takes the node from power-on to a terminal
//! association outcome:
//!
//! 1. `StationStarted` issues the first connect attempt
//! 2. `StationConnected` applies the static address override, if any
//! 3. `StationDisconnected` retries up to `max_retries`, then gives up
//! 4. `GotIp` resets the retry counter and completes the connection
//!
//! The manager never talks to a network stack directly: it drives the
//! [`WifiControl`] and [`NetifControl`] seams, and is fed through the
//! [`EventBridge`](crate::events::EventBridge). Tests inject synthetic
//! events; the ESP32 and host binaries plug in real or simulated drivers.

use log::{debug, error, info, warn};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::{NetworkConfig, StaticIpConfig};
use crate::events::{EventBridge, NetworkEventHandler};
use crate::model::{ConnectionState, IpInfo};

/// A driver call failed.
#[derive(Debug, Clone, Error)]
#[error("{operation} failed: {message}")]
pub struct DriverError {
    operation: &'static str,
    message: String,
}

impl DriverError {
    pub fn new(operation: &'static str, message: impl fmt::Display) -> Self {
        Self {
            operation,
            message: message.to_string(),
        }
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }
}

/// Association control of the Wi-Fi driver.
pub trait WifiControl {
    /// Start an association attempt. Completion is reported through events.
    fn connect(&mut self) -> Result<(), DriverError>;
}

/// Which resolver slot a DNS server goes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsSlot {
    Main,
    Backup,
}

/// Address configuration of the station network interface.
pub trait NetifControl {
    /// Stop the DHCP client so a static address is not overwritten.
    fn stop_dhcp_client(&mut self) -> Result<(), DriverError>;

    /// Assign address, netmask and gateway.
    fn set_ip_info(&mut self, info: &IpInfo) -> Result<(), DriverError>;

    /// Install a DNS server.
    fn set_dns_server(&mut self, slot: DnsSlot, addr: Ipv4Addr) -> Result<(), DriverError>;
}

/// Terminal result of one connection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// Associated with an address.
    Connected(IpInfo),
    /// Gave up after `retries` reconnect attempts.
    Failed { retries: u32 },
    /// No terminal event arrived within the bounded wait.
    TimedOut,
}

/// Owns the association lifecycle, retry counter and static IP policy.
pub struct ConnectionManager<W, N> {
    ssid: String,
    max_retries: u32,
    static_ip: Option<StaticIpConfig>,
    wifi: W,
    netif: N,
    state: ConnectionState,
    retries: u32,
    connect_attempts: u32,
}

impl<W: WifiControl, N: NetifControl> ConnectionManager<W, N> {
    /// Create an idle manager for the given network.
    pub fn new(config: &NetworkConfig, wifi: W, netif: N) -> Self {
        Self {
            ssid: config.ssid.clone(),
            max_retries: config.max_retries,
            static_ip: config.static_ip.clone(),
            wifi,
            netif,
            state: ConnectionState::Idle,
            retries: 0,
            connect_attempts: 0,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Reconnect attempts since the last successful association.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Total connect calls issued to the driver.
    pub fn connect_count(&self) -> u32 {
        self.connect_attempts
    }

    pub fn wifi(&self) -> &W {
        &self.wifi
    }

    pub fn netif(&self) -> &N {
        &self.netif
    }

    /// Terminal outcome, if one has been reached.
    pub fn outcome(&self) -> Option<ConnectionOutcome> {
        match self.state {
            ConnectionState::Connected(info) => Some(ConnectionOutcome::Connected(info)),
            ConnectionState::Failed => Some(ConnectionOutcome::Failed {
                retries: self.retries,
            }),
            ConnectionState::TimedOut => Some(ConnectionOutcome::TimedOut),
            ConnectionState::Idle | ConnectionState::Connecting => None,
        }
    }

    /// Process events until a terminal outcome, then tear down.
    ///
    /// `subscription` is whatever keeps the event source registered (ESP
    /// event-loop subscriptions, a simulator handle). It is dropped before
    /// returning, together with the bridge, so no event can reach this
    /// manager afterwards.
    pub fn run_to_completion<S>(
        &mut self,
        bridge: EventBridge,
        subscription: S,
        timeout: Option<Duration>,
    ) -> ConnectionOutcome {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);

        while !self.state.is_terminal() {
            match bridge.next(deadline) {
                Some(event) => self.handle(event),
                None => {
                    match timeout {
                        Some(timeout) => warn!(
                            "No connection outcome for SSID '{}' within {:?}",
                            self.ssid, timeout
                        ),
                        None => warn!("Network event source closed before a connection outcome"),
                    }
                    self.state = ConnectionState::TimedOut;
                }
            }
        }

        let outcome = self.outcome().unwrap_or(ConnectionOutcome::TimedOut);

        match outcome {
            ConnectionOutcome::Connected(info) => {
                info!("Connected to SSID '{}' with {}", self.ssid, info)
            }
            ConnectionOutcome::Failed { retries } => warn!(
                "Failed to connect to SSID '{}' after {} retries",
                self.ssid, retries
            ),
            ConnectionOutcome::TimedOut => warn!("Connection to SSID '{}' timed out", self.ssid),
        }

        drop(subscription);
        drop(bridge);
        debug!("Network event handlers unregistered");

        outcome
    }

    fn issue_connect(&mut self) {
        self.connect_attempts += 1;
        if let Err(e) = self.wifi.connect() {
            error!("Connect request rejected by driver: {}", e);
        }
    }

    fn apply_static_ip(&mut self, static_ip: &StaticIpConfig) {
        if let Err(e) = self.netif.stop_dhcp_client() {
            error!("Failed to stop DHCP client: {}", e);
            return;
        }

        let info = static_ip.ip_info();
        if let Err(e) = self.netif.set_ip_info(&info) {
            error!("Failed to set static address {}: {}", info, e);
            return;
        }
        debug!("Applied static address {}", info);

        let (main, backup) = static_ip.dns.servers(info.gateway);
        for (slot, addr) in [(DnsSlot::Main, main), (DnsSlot::Backup, backup)] {
            let Some(addr) = addr.filter(|addr| is_usable_dns(*addr)) else {
                continue;
            };
            if let Err(e) = self.netif.set_dns_server(slot, addr) {
                error!("Failed to set {:?} DNS server {}: {}", slot, addr, e);
                return;
            }
            debug!("{:?} DNS server set to {}", slot, addr);
        }
    }

    fn ignore_if_finished(&self, what: &str) -> bool {
        if self.state.is_terminal() {
            debug!("Ignoring {} in terminal state {:?}", what, self.state);
            return true;
        }
        false
    }
}

impl<W: WifiControl, N: NetifControl> NetworkEventHandler for ConnectionManager<W, N> {
    fn on_station_started(&mut self) {
        if self.ignore_if_finished("station start") {
            return;
        }
        info!("Station started, connecting to SSID '{}'", self.ssid);
        self.state = ConnectionState::Connecting;
        self.issue_connect();
    }

    fn on_station_connected(&mut self) {
        if self.ignore_if_finished("station connect") {
            return;
        }
        debug!("Associated with SSID '{}'", self.ssid);
        if let Some(static_ip) = self.static_ip.clone() {
            self.apply_static_ip(&static_ip);
        }
    }

    fn on_station_disconnected(&mut self, reason: Option<u16>) {
        if self.ignore_if_finished("disconnect") {
            return;
        }
        info!("Connection to the access point failed (reason {:?})", reason);

        if self.retries < self.max_retries {
            self.retries += 1;
            self.state = ConnectionState::Connecting;
            info!(
                "Retrying connection to the access point ({}/{})",
                self.retries, self.max_retries
            );
            self.issue_connect();
        } else {
            self.state = ConnectionState::Failed;
        }
    }

    fn on_ip_assigned(&mut self, info: IpInfo) {
        if self.ignore_if_finished("address assignment") {
            return;
        }
        info!("Got address {}", info.ip);
        self.retries = 0;
        self.state = ConnectionState::Connected(info);
    }
}

fn is_usable_dns(addr: Ipv4Addr) -> bool {
    !addr.is_unspecified() && !addr.is_broadcast()
}

/// Resolve `host` once through the system resolver and log the result.
///
/// Used as a post-connection DNS self-test; failure is never fatal.
pub fn resolve_self_test(host: &str) -> Option<IpAddr> {
    match (host, 0).to_socket_addrs() {
        Ok(mut addrs) => match addrs.next() {
            Some(addr) => {
                match addr.ip() {
                    IpAddr::V4(ip) => info!("Resolved IPv4 address for {}: {}", host, ip),
                    IpAddr::V6(ip) => info!("Resolved IPv6 address for {}: {}", host, ip),
                }
                Some(addr.ip())
            }
            None => {
                error!("Resolver returned no addresses for {}", host);
                None
            }
        },
        Err(e) => {
            error!("Couldn't resolve {}: {}", host, e);
            None
        }
    }
}
