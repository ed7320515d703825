//! ESP32-specific components for the weight node.
//!
//! This crate adapts the ESP-IDF services to the seams of `weighnode-core`:
//! - Wi-Fi station control and event subscriptions ([`wifi`])
//! - Static addressing on the station interface ([`netif`])
//! - Route registration on `EspHttpServer` ([`http`])
//!
//! # Example
//!
//! ```ignore
//! let (bridge, events) = EventBridge::new();
//! let subscriptions = wifi::subscribe(&sysloop, events)?;
//! let wifi = wifi::create(modem, sysloop, nvs, &config.network)?;
//!
//! let mut manager = ConnectionManager::new(
//!     &config.network,
//!     Station::new(wifi.clone()),
//!     StaNetif::new(wifi.clone()),
//! );
//! wifi::start(&wifi)?;
//! let outcome = manager.run_to_completion(bridge, subscriptions, timeout);
//! ```

pub mod http;
pub mod netif;
pub mod wifi;

pub use netif::StaNetif;
pub use wifi::{SharedWifi, Station};
