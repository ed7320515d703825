//! One-shot sensor sampling.
//!
//! The load cell is a single physical channel with no support for concurrent
//! access, while HTTP workers may ask for a reading at the same time.
//! [`Sampler`] owns the channel behind a mutex: one caller at a time runs a
//! complete wait-then-average cycle.

use log::{debug, error};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

use crate::config::SensorConfig;
use crate::model::SensorReading;

/// Errors reported by a load-cell channel.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorError {
    /// The converter did not signal readiness in time (absent or unpowered).
    #[error("Sensor not ready within {0:?}")]
    NotReady(Duration),

    /// A GPIO operation failed.
    #[error("Sensor pin error: {0}")]
    Pin(String),

    /// Averaging over zero samples was requested.
    #[error("Invalid sample count: {0}")]
    InvalidSampleCount(u8),
}

/// A weight-sensor channel with a wait/read-average contract.
pub trait LoadCell {
    /// Block until a conversion is ready, or fail after `timeout`.
    fn wait_ready(&mut self, timeout: Duration) -> Result<(), SensorError>;

    /// Mean of `times` consecutive conversions.
    fn read_average(&mut self, times: u8) -> Result<i32, SensorError>;
}

/// Serialized access to one load cell.
pub struct Sampler<C> {
    cell: Mutex<C>,
    ready_timeout: Duration,
    average_times: u8,
}

impl<C: LoadCell> Sampler<C> {
    pub fn new(cell: C, config: &SensorConfig) -> Self {
        Self {
            cell: Mutex::new(cell),
            ready_timeout: config.ready_timeout(),
            average_times: config.average_times,
        }
    }

    /// Take one averaged reading.
    ///
    /// Never fails: timeouts and device errors are logged and reported as
    /// [`SensorReading::SENTINEL`].
    pub fn sample(&self) -> SensorReading {
        // A panic in another reader leaves the hardware in a usable state.
        let mut cell = self.cell.lock().unwrap_or_else(PoisonError::into_inner);

        if let Err(e) = cell.wait_ready(self.ready_timeout) {
            error!("Load cell not found: {}", e);
            return SensorReading::SENTINEL;
        }

        match cell.read_average(self.average_times) {
            Ok(value) => {
                debug!("Load cell reading: {}", value);
                SensorReading::new(value)
            }
            Err(e) => {
                error!("Load cell read failed: {}", e);
                SensorReading::SENTINEL
            }
        }
    }
}
