//! # weighnode-core
//!
//! Core logic of the weight node.
//!
//! This crate provides:
//! - Data model types (ConnectionState, IpInfo, SensorReading)
//! - Node configuration (TOML) with validation
//! - Network event bridge and the station connection state machine
//! - HX711 load-cell driver and the serialized sensor sampler
//! - Capacity-checked JSON payload encoding
//! - Indicator driver and framework-agnostic HTTP endpoints
//!
//! This crate is intentionally runtime-agnostic and contains no async code,
//! making it usable on both Linux (tokio) and ESP32 (esp-idf) targets.

pub mod boot;
pub mod config;
pub mod connection;
pub mod encoder;
pub mod endpoints;
pub mod events;
pub mod hx711;
pub mod indicator;
pub mod model;
pub mod sampler;

pub use boot::{BootDecision, BootPolicy, TimeoutAction};
pub use config::{ConfigError, NetworkConfig, NodeConfig};
pub use connection::{ConnectionManager, ConnectionOutcome, DriverError, NetifControl, WifiControl};
pub use endpoints::{Endpoints, NodeService, Response};
pub use events::{EventBridge, EventSender, NetworkEvent, NetworkEventHandler};
pub use model::*;
pub use sampler::{LoadCell, Sampler, SensorError};
