//! Boot policy after the connection run.
//!
//! A failed association never stops the node: the local HTTP surface is more
//! useful than a node that refuses to start. Only a timed-out wait is left to
//! configuration.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::connection::ConnectionOutcome;

/// What to do when the bounded connection wait expires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutAction {
    /// Start the HTTP server without network reachability.
    #[default]
    Proceed,
    /// Stop booting.
    Abort,
    /// Restart the device and try again.
    Restart,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootPolicy {
    pub on_timeout: TimeoutAction,
}

/// Decision taken by the boot sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootDecision {
    Proceed,
    Abort,
    Restart,
}

impl BootPolicy {
    pub fn decide(&self, outcome: &ConnectionOutcome) -> BootDecision {
        match outcome {
            ConnectionOutcome::Connected(_) => BootDecision::Proceed,
            ConnectionOutcome::Failed { .. } => {
                warn!("Continuing without network connectivity");
                BootDecision::Proceed
            }
            ConnectionOutcome::TimedOut => match self.on_timeout {
                TimeoutAction::Proceed => {
                    warn!("Connection wait expired, continuing degraded");
                    BootDecision::Proceed
                }
                TimeoutAction::Abort => BootDecision::Abort,
                TimeoutAction::Restart => {
                    info!("Connection wait expired, restart requested");
                    BootDecision::Restart
                }
            },
        }
    }
}
