//! Wi-Fi station for ESP32.
//!
//! The driver is configured once and started; association progress is then
//! reported through the system event loop and forwarded to an
//! [`EventSender`], where the connection state machine picks it up.

use anyhow::{anyhow, Context, Result};
use esp_idf_svc::{
    eventloop::{EspSubscription, EspSystemEventLoop, System},
    hal::{modem::Modem, peripheral},
    ipv4::Mask,
    netif::IpEvent,
    nvs::EspDefaultNvsPartition,
    wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi, WifiEvent},
};
use log::{debug, info};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, PoisonError};
use weighnode_core::config::AuthFloor;
use weighnode_core::{DriverError, EventSender, IpInfo, NetworkConfig, NetworkEvent, WifiControl};

/// Wi-Fi driver shared by the station control, the netif adapter and `main`.
pub type SharedWifi = Arc<Mutex<EspWifi<'static>>>;

/// Create the driver and apply the station configuration.
pub fn create(
    modem: impl peripheral::Peripheral<P = Modem> + 'static,
    sysloop: EspSystemEventLoop,
    nvs: EspDefaultNvsPartition,
    config: &NetworkConfig,
) -> Result<SharedWifi> {
    let mut wifi = EspWifi::new(modem, sysloop, Some(nvs)).context("Failed to create Wi-Fi driver")?;

    let client = ClientConfiguration {
        ssid: config
            .ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("SSID too long (max 32 bytes)"))?,
        password: config
            .password
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("Password too long (max 64 bytes)"))?,
        auth_method: auth_method(config.auth_floor),
        ..Default::default()
    };
    wifi.set_configuration(&Configuration::Client(client))
        .context("Failed to configure station")?;

    info!(
        "Station configured for '{}' (auth floor {:?})",
        config.ssid, config.auth_floor
    );

    Ok(Arc::new(Mutex::new(wifi)))
}

/// Start the driver; `StaStarted` follows on the event loop.
pub fn start(wifi: &SharedWifi) -> Result<()> {
    wifi.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .start()
        .context("Failed to start Wi-Fi")?;
    info!("Wi-Fi started in station mode");
    Ok(())
}

fn auth_method(floor: AuthFloor) -> AuthMethod {
    match floor {
        AuthFloor::Open => AuthMethod::None,
        AuthFloor::Wep => AuthMethod::WEP,
        AuthFloor::WpaPersonal => AuthMethod::WPA,
        AuthFloor::Wpa2Personal => AuthMethod::WPA2Personal,
        AuthFloor::WpaWpa2Personal => AuthMethod::WPAWPA2Personal,
        AuthFloor::Wpa3Personal => AuthMethod::WPA3Personal,
        AuthFloor::Wpa2Wpa3Personal => AuthMethod::WPA2WPA3Personal,
    }
}

// ============================================================================
// Station control
// ============================================================================

/// [`WifiControl`] over the shared ESP-IDF driver.
pub struct Station {
    wifi: SharedWifi,
}

impl Station {
    pub fn new(wifi: SharedWifi) -> Self {
        Self { wifi }
    }
}

impl WifiControl for Station {
    fn connect(&mut self) -> Result<(), DriverError> {
        self.wifi
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .connect()
            .map_err(|e| DriverError::new("esp_wifi_connect", e))
    }
}

// ============================================================================
// Event subscriptions
// ============================================================================

/// Keeps the Wi-Fi and IP event handlers registered; dropping it
/// unregisters both.
pub struct EventSubscriptions {
    _wifi: EspSubscription<'static, System>,
    _ip: EspSubscription<'static, System>,
}

/// Forward station and address events from the system event loop.
pub fn subscribe(sysloop: &EspSystemEventLoop, events: EventSender) -> Result<EventSubscriptions> {
    let wifi_events = events.clone();
    let wifi = sysloop
        .subscribe::<WifiEvent, _>(move |event| {
            let event = match event {
                WifiEvent::StaStarted => NetworkEvent::StationStarted,
                WifiEvent::StaConnected(_) => NetworkEvent::StationConnected,
                WifiEvent::StaDisconnected(disconnected) => NetworkEvent::StationDisconnected {
                    reason: Some(disconnected.reason()),
                },
                _ => return,
            };
            wifi_events.post(event);
        })
        .context("Failed to subscribe to Wi-Fi events")?;

    let ip = sysloop
        .subscribe::<IpEvent, _>(move |event| {
            if let IpEvent::DhcpIpAssigned(assignment) = event {
                let settings = &assignment.ip_settings;
                let info = IpInfo::new(
                    settings.ip,
                    netmask(settings.subnet.mask),
                    settings.subnet.gateway,
                );
                debug!("Address event: {}", info);
                events.post(NetworkEvent::GotIp(info));
            }
        })
        .context("Failed to subscribe to IP events")?;

    Ok(EventSubscriptions { _wifi: wifi, _ip: ip })
}

fn netmask(mask: Mask) -> Ipv4Addr {
    match mask.0 {
        0 => Ipv4Addr::UNSPECIFIED,
        bits => Ipv4Addr::from(u32::MAX << (32 - u32::from(bits.min(32)))),
    }
}
