//! HTTP endpoint logic (framework-agnostic).
//!
//! These functions contain the behaviour of the two routes. Framework-specific
//! code (Axum on Linux, esp-idf-http on ESP32) wraps them with its own
//! request/response types.

use embedded_hal::digital::OutputPin;
use log::error;

use crate::config::PayloadConfig;
use crate::encoder::{encode, FALLBACK_BODY, PAYLOAD_CAPACITY};
use crate::indicator::Indicator;
use crate::sampler::{LoadCell, Sampler};

/// Path of the status route.
pub const STATUS_PATH: &str = "/";

/// Path of the data route.
pub const DATA_PATH: &str = "/data";

/// Fixed body of the status route.
pub const STATUS_BANNER: &str = "Webserver is working, send request to /data to get weight.\n";

pub const CONTENT_TYPE_TEXT: &str = "text/plain";
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// A complete response, ready to be written by any HTTP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Response {
    fn ok(content_type: &'static str, body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type,
            body: body.into(),
        }
    }
}

/// The node's HTTP surface.
pub trait NodeService: Send + Sync {
    /// `GET /`
    fn status(&self) -> Response;

    /// `GET /data`; blocks for one sensor cycle.
    fn data(&self) -> Response;
}

/// Endpoints backed by a sampler and an indicator.
pub struct Endpoints<C, P> {
    sampler: Sampler<C>,
    indicator: Indicator<P>,
    payload: PayloadConfig,
}

impl<C, P> Endpoints<C, P>
where
    C: LoadCell,
    P: OutputPin,
{
    pub fn new(sampler: Sampler<C>, indicator: Indicator<P>, payload: PayloadConfig) -> Self {
        Self {
            sampler,
            indicator,
            payload,
        }
    }

    fn data_body(&self) -> String {
        let reading = self.sampler.sample();
        match encode::<PAYLOAD_CAPACITY>(reading, self.payload.bin_id.as_deref()) {
            Ok(payload) => payload.as_str().to_string(),
            Err(e) => {
                error!("Failed to encode reading {}: {}", reading.value(), e);
                FALLBACK_BODY.to_string()
            }
        }
    }
}

impl<C, P> NodeService for Endpoints<C, P>
where
    C: LoadCell + Send,
    P: OutputPin + Send,
{
    fn status(&self) -> Response {
        Response::ok(CONTENT_TYPE_TEXT, STATUS_BANNER)
    }

    fn data(&self) -> Response {
        let body = self.data_body();
        self.indicator.signal();
        Response::ok(CONTENT_TYPE_JSON, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SensorConfig;
    use crate::indicator::IndicatorPolicy;
    use crate::sampler::SensorError;
    use embedded_hal::digital::{ErrorKind, ErrorType};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct FixedCell(Option<i32>);

    impl LoadCell for FixedCell {
        fn wait_ready(&mut self, timeout: Duration) -> Result<(), SensorError> {
            match self.0 {
                Some(_) => Ok(()),
                None => Err(SensorError::NotReady(timeout)),
            }
        }

        fn read_average(&mut self, _times: u8) -> Result<i32, SensorError> {
            Ok(self.0.unwrap_or_default())
        }
    }

    #[derive(Clone, Default)]
    struct CountingPin(Arc<AtomicUsize>);

    impl ErrorType for CountingPin {
        type Error = ErrorKind;
    }

    impl OutputPin for CountingPin {
        fn set_high(&mut self) -> Result<(), ErrorKind> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn set_low(&mut self) -> Result<(), ErrorKind> {
            Ok(())
        }
    }

    fn endpoints(
        cell: FixedCell,
        bin_id: Option<&str>,
    ) -> (Endpoints<FixedCell, CountingPin>, CountingPin) {
        let pin = CountingPin::default();
        let endpoints = Endpoints::new(
            Sampler::new(cell, &SensorConfig::default()),
            Indicator::new(pin.clone(), IndicatorPolicy::Blink { duration_ms: 0 }),
            PayloadConfig {
                bin_id: bin_id.map(String::from),
            },
        );
        (endpoints, pin)
    }

    #[test]
    fn test_status_is_constant() {
        let (healthy, _) = endpoints(FixedCell(Some(10)), None);
        let (broken, _) = endpoints(FixedCell(None), Some("bin-1"));

        let expected = Response {
            status: 200,
            content_type: "text/plain",
            body: STATUS_BANNER.to_string(),
        };
        assert_eq!(healthy.status(), expected);
        assert_eq!(broken.status(), expected);
    }

    #[test]
    fn test_data_reports_reading_and_signals() {
        let (endpoints, pin) = endpoints(FixedCell(Some(5120)), None);

        let response = endpoints.data();

        assert_eq!(response.status, 200);
        assert_eq!(response.content_type, "application/json");
        assert_eq!(response.body, r#"{"weight":5120}"#);
        assert_eq!(pin.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_data_with_bin_id() {
        let (endpoints, _) = endpoints(FixedCell(Some(-3)), Some("north-7"));
        assert_eq!(endpoints.data().body, r#"{"id":"north-7","weight":-3}"#);
    }

    #[test]
    fn test_data_on_sensor_timeout_is_still_ok() {
        let (endpoints, pin) = endpoints(FixedCell(None), None);

        let response = endpoints.data();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, r#"{"weight":0}"#);
        assert_eq!(pin.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_oversized_id_falls_back() {
        let long_id = "z".repeat(128);
        let (endpoints, _) = endpoints(FixedCell(Some(99)), Some(&long_id));

        let response = endpoints.data();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, FALLBACK_BODY);
    }
}
