//! Error types for the device coordinator

use cell_at::AtError;
use thiserror::Error;

/// Errors that can occur while setting up a device
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The device's own transport could not be opened
    #[error("default transport {0} is unavailable")]
    TransportUnavailable(String),

    /// AT exchange failed
    #[error("AT error: {0}")]
    At(#[from] AtError),
}
