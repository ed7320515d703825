//! Simulated hardware for running the node on a desktop host.
//!
//! The station and network interface answer driver calls the way the ESP-IDF
//! stack does: asynchronously, by posting events from another thread.

use std::convert::Infallible;
use std::net::Ipv4Addr;
use std::thread;
use std::time::Duration;

use embedded_hal::digital::{ErrorType, OutputPin};
use tracing::{debug, info};
use weighnode_core::connection::DnsSlot;
use weighnode_core::{
    DriverError, EventSender, IpInfo, LoadCell, NetifControl, NetworkEvent, SensorError,
    WifiControl,
};

use crate::config::SimulationConfig;

/// 802.11 reason code reported for simulated failures (beacon timeout).
const SIMULATED_REASON: u16 = 200;

// ============================================================================
// Station
// ============================================================================

/// Wi-Fi station that fails a configured number of times, then associates.
pub struct SimStation {
    events: EventSender,
    failures_left: u32,
    link_delay: Duration,
    stall: bool,
    /// DHCP lease to announce; `None` when addressing is static.
    lease: Option<IpInfo>,
}

impl SimStation {
    pub fn new(events: EventSender, config: &SimulationConfig, dhcp: bool) -> Self {
        Self {
            events,
            failures_left: config.disconnects,
            link_delay: Duration::from_millis(config.link_delay_ms),
            stall: config.stall,
            lease: dhcp.then(|| config.lease()),
        }
    }

    /// Bring the driver up in station mode.
    pub fn start(&self) {
        info!("Simulated station starting");
        self.events.post(NetworkEvent::StationStarted);
    }
}

impl WifiControl for SimStation {
    fn connect(&mut self) -> Result<(), DriverError> {
        if self.stall {
            debug!("Simulated station ignores connect request");
            return Ok(());
        }

        let fail = self.failures_left > 0;
        if fail {
            self.failures_left -= 1;
        }

        let events = self.events.clone();
        let delay = self.link_delay;
        let lease = self.lease;
        thread::Builder::new()
            .name("sim-station".into())
            .spawn(move || {
                thread::sleep(delay);
                if fail {
                    events.post(NetworkEvent::StationDisconnected {
                        reason: Some(SIMULATED_REASON),
                    });
                    return;
                }
                events.post(NetworkEvent::StationConnected);
                if let Some(lease) = lease {
                    thread::sleep(delay);
                    events.post(NetworkEvent::GotIp(lease));
                }
            })
            .map_err(|e| DriverError::new("connect", e))?;

        Ok(())
    }
}

// ============================================================================
// Network interface
// ============================================================================

/// Station interface whose static configuration is echoed back as `GotIp`.
pub struct SimNetif {
    events: EventSender,
    dhcp_running: bool,
}

impl SimNetif {
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            dhcp_running: true,
        }
    }
}

impl NetifControl for SimNetif {
    fn stop_dhcp_client(&mut self) -> Result<(), DriverError> {
        if self.dhcp_running {
            debug!("Simulated DHCP client stopped");
            self.dhcp_running = false;
        }
        Ok(())
    }

    fn set_ip_info(&mut self, info: &IpInfo) -> Result<(), DriverError> {
        if self.dhcp_running {
            return Err(DriverError::new("set_ip_info", "DHCP client still running"));
        }
        debug!("Simulated interface address set to {}", info);
        self.events.post(NetworkEvent::GotIp(*info));
        Ok(())
    }

    fn set_dns_server(&mut self, slot: DnsSlot, addr: Ipv4Addr) -> Result<(), DriverError> {
        debug!("Simulated {:?} DNS server set to {}", slot, addr);
        Ok(())
    }
}

// ============================================================================
// Load cell
// ============================================================================

/// Load cell producing a steady load with a small deterministic wobble.
pub struct SimLoadCell {
    load: i32,
    jitter: i32,
    conversion: Duration,
    missing: bool,
    conversions: u64,
}

impl SimLoadCell {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            load: config.load,
            jitter: config.jitter.max(0),
            conversion: Duration::from_millis(config.conversion_ms),
            missing: config.sensor_missing,
            conversions: 0,
        }
    }

    fn convert(&mut self) -> i32 {
        thread::sleep(self.conversion);
        self.conversions += 1;
        let span = 2 * i64::from(self.jitter) + 1;
        let offset = (self.conversions as i64 % span) - i64::from(self.jitter);
        (i64::from(self.load) + offset).clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }
}

impl LoadCell for SimLoadCell {
    fn wait_ready(&mut self, timeout: Duration) -> Result<(), SensorError> {
        if self.missing {
            thread::sleep(timeout);
            return Err(SensorError::NotReady(timeout));
        }
        Ok(())
    }

    fn read_average(&mut self, times: u8) -> Result<i32, SensorError> {
        if times == 0 {
            return Err(SensorError::InvalidSampleCount(times));
        }
        let sum: i64 = (0..times).map(|_| i64::from(self.convert())).sum();
        Ok((sum / i64::from(times)) as i32)
    }
}

// ============================================================================
// Indicator
// ============================================================================

/// Indicator output that logs its level changes.
#[derive(Debug, Default)]
pub struct LogPin;

impl ErrorType for LogPin {
    type Error = Infallible;
}

impl OutputPin for LogPin {
    fn set_high(&mut self) -> Result<(), Infallible> {
        debug!("Indicator on");
        Ok(())
    }

    fn set_low(&mut self) -> Result<(), Infallible> {
        debug!("Indicator off");
        Ok(())
    }
}
