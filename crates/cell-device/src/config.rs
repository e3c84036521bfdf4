//! Device configuration

use std::time::Duration;

use cell_at::{TransportId, DEFAULT_AT_TIMEOUT};
use serde::{Deserialize, Serialize};

/// Device configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Transport used when an operation does not name one
    pub default_transport: TransportId,
    /// Default exchange timeout (ms) pushed to every AT handler
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Log every AT line sent and received
    #[serde(default)]
    pub modem_debug: bool,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_AT_TIMEOUT.as_millis() as u64
}

impl DeviceConfig {
    /// Configuration for a modem on `transport` with default settings
    pub fn new(transport: impl Into<TransportId>) -> Self {
        Self {
            default_transport: transport.into(),
            timeout_ms: default_timeout_ms(),
            modem_debug: false,
        }
    }

    /// Default exchange timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
