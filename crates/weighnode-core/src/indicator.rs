//! Activity indicator.
//!
//! A single digital output that shows "a request was just served", either by
//! blinking or by latching on.

use embedded_hal::digital::{OutputPin, PinState};
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// What the indicator does on each served request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum IndicatorPolicy {
    /// On, hold for `duration_ms`, off.
    Blink { duration_ms: u64 },
    /// Switch on and leave it on.
    Latch,
}

impl Default for IndicatorPolicy {
    fn default() -> Self {
        IndicatorPolicy::Blink { duration_ms: 100 }
    }
}

/// Indicator output shared by concurrent request handlers.
///
/// The pin is held for a whole blink so two blinks never interleave.
pub struct Indicator<P> {
    pin: Mutex<P>,
    policy: IndicatorPolicy,
}

impl<P: OutputPin> Indicator<P> {
    pub fn new(pin: P, policy: IndicatorPolicy) -> Self {
        Self {
            pin: Mutex::new(pin),
            policy,
        }
    }

    pub fn policy(&self) -> IndicatorPolicy {
        self.policy
    }

    /// Apply the configured policy.
    pub fn signal(&self) {
        match self.policy {
            IndicatorPolicy::Blink { duration_ms } => {
                self.blink(Duration::from_millis(duration_ms))
            }
            IndicatorPolicy::Latch => self.set(true),
        }
    }

    /// Drive the output to `on`.
    pub fn set(&self, on: bool) {
        let mut pin = self.pin.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = pin.set_state(PinState::from(on)) {
            warn!("Indicator write failed: {:?}", e);
        }
    }

    /// On, wait, off.
    pub fn blink(&self, duration: Duration) {
        let mut pin = self.pin.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = pin.set_high() {
            warn!("Indicator write failed: {:?}", e);
            return;
        }
        std::thread::sleep(duration);
        if let Err(e) = pin.set_low() {
            warn!("Indicator write failed: {:?}", e);
        }
    }
}
