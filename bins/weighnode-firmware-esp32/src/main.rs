//! Weight node firmware for ESP32.
//!
//! This binary requires the ESP32 Rust toolchain.
//!
//! Boot sequence: NVS, Wi-Fi bring-up until the connection state machine
//! reports an outcome, then the load cell, indicator and HTTP server. After
//! that the main task only keeps the drivers alive.

use anyhow::{bail, Context, Result};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::delay::{Ets, FreeRtos};
use esp_idf_svc::hal::gpio::{AnyIOPin, AnyOutputPin, PinDriver};
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;

use weighnode_core::connection::resolve_self_test;
use weighnode_core::hx711::Hx711;
use weighnode_core::indicator::Indicator;
use weighnode_core::{
    BootDecision, ConnectionManager, ConnectionOutcome, Endpoints, EventBridge, NodeConfig,
    Sampler,
};
use weighnode_esp32::{http, wifi, StaNetif, Station};

/// Node configuration, embedded at build time.
const NODE_CONFIG: &str = include_str!("../node.toml");

fn main() {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("Weight node starting...");

    if let Err(e) = run() {
        error!("Fatal: {:?}", e);
        error!("Restarting in 10 seconds...");
        std::thread::sleep(Duration::from_secs(10));
        restart();
    }
}

fn run() -> Result<()> {
    let config = NodeConfig::from_toml_str(NODE_CONFIG).context("Invalid embedded configuration")?;

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    // Wi-Fi keeps its calibration data in NVS.
    let nvs = EspDefaultNvsPartition::take().context("Failed to initialise NVS")?;

    // ------------------------------------------------------------------------
    // Network bring-up
    // ------------------------------------------------------------------------
    let network = &config.network;
    let (bridge, events) = EventBridge::new();
    let subscriptions = wifi::subscribe(&sysloop, events)?;
    let esp_wifi = wifi::create(peripherals.modem, sysloop.clone(), nvs, network)?;

    let mut manager = ConnectionManager::new(
        network,
        Station::new(esp_wifi.clone()),
        StaNetif::new(esp_wifi.clone()),
    );
    wifi::start(&esp_wifi)?;
    let outcome = manager.run_to_completion(bridge, subscriptions, network.connect_timeout());

    if let Some(host) = &network.resolve_test {
        resolve_self_test(host);
    }

    match config.boot.decide(&outcome) {
        BootDecision::Proceed => {}
        BootDecision::Abort => bail!("Network bring-up timed out"),
        BootDecision::Restart => {
            warn!("Network bring-up timed out, restarting");
            restart();
        }
    }

    // ------------------------------------------------------------------------
    // Sensor and indicator
    // ------------------------------------------------------------------------
    let sensor = &config.sensor;
    // SAFETY: pin numbers come from the validated configuration and no other
    // driver claims these GPIOs.
    let dout = PinDriver::input(unsafe { AnyIOPin::new(sensor.dout_pin) })?;
    let sck = PinDriver::output(unsafe { AnyOutputPin::new(sensor.sck_pin) })?;
    // Busy-wait delays: PD_SCK held high for more than 60 us powers the
    // converter down, so the clock pulses must not yield to the scheduler.
    let mut hx711 = Hx711::new(dout, sck, Ets, sensor.gain);
    if let Err(e) = hx711.init() {
        // Readings fall back to zero until the converter shows up.
        warn!("Load cell not initialised: {}", e);
    }

    let led = PinDriver::output(unsafe { AnyOutputPin::new(config.indicator.pin) })?;

    let endpoints = Endpoints::new(
        Sampler::new(hx711, sensor),
        Indicator::new(led, config.indicator.policy),
        config.payload.clone(),
    );

    // ------------------------------------------------------------------------
    // HTTP server
    // ------------------------------------------------------------------------
    let _server = http::start_server(config.server.http_port, Arc::new(endpoints))?;

    info!("Weight node ready!");
    if let ConnectionOutcome::Connected(info) = outcome {
        info!("   Status: curl http://{}/", info.ip);
        info!("   Weight: curl http://{}/data", info.ip);
    }

    // Keep the Wi-Fi driver and HTTP server alive.
    let _wifi = esp_wifi;
    loop {
        FreeRtos::delay_ms(1000);
    }
}

fn restart() -> ! {
    unsafe { esp_idf_svc::sys::esp_restart() }
}
