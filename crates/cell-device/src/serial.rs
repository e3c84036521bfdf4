//! Serial port connector

use std::time::Duration;

use cell_at::{AtError, Connector, Transport, TransportId};
use tracing::info;

/// Default baud rate for AT ports
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Opens transports as serial ports named by their [`TransportId`]
#[derive(Debug, Clone)]
pub struct SerialConnector {
    baud_rate: u32,
    read_timeout: Duration,
}

impl SerialConnector {
    /// Create a connector for the given baud rate
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            read_timeout: Duration::from_millis(100),
        }
    }

    /// Set how long a single read waits before yielding
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Configured baud rate
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

impl Default for SerialConnector {
    fn default() -> Self {
        Self::new(DEFAULT_BAUD_RATE)
    }
}

impl Connector for SerialConnector {
    fn connect(&self, id: &TransportId) -> Result<Box<dyn Transport>, AtError> {
        let port = serialport::new(id.as_str(), self.baud_rate)
            .timeout(self.read_timeout)
            .open()
            .map_err(|e| AtError::Connect {
                transport: id.to_string(),
                reason: e.to_string(),
            })?;

        info!("Opened {} at {} baud", id, self.baud_rate);
        Ok(Box::new(port))
    }
}
