//! Error types for AT command exchanges

use thiserror::Error;

/// Unified result code for device and protocol operations
///
/// `Ok(())` is the success code; every failure is one of the [`AtError`]
/// variants.
pub type AtResult<T> = Result<T, AtError>;

/// Errors surfaced by the AT engine and the operations built on it
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AtError {
    /// Caller-supplied argument rejected before touching the transport
    #[error("invalid parameter: {0}")]
    Parameter(String),

    /// Operation not implemented at this layer
    #[error("operation not supported")]
    Unsupported,

    /// Modem answered with a plain `ERROR`
    #[error("modem returned ERROR")]
    Device,

    /// Modem answered with `+CME ERROR: <n>`
    #[error("modem returned +CME ERROR: {0}")]
    Cme(i32),

    /// Modem answered with `+CMS ERROR: <n>`
    #[error("modem returned +CMS ERROR: {0}")]
    Cms(i32),

    /// No final result code within the exchange timeout
    #[error("no response within {0}ms")]
    Timeout(u64),

    /// Transport read/write failure
    #[error("transport I/O error: {0}")]
    Io(String),

    /// The handle was closed by a device shutdown
    #[error("AT handler is closed")]
    Closed,

    /// Transport could not be opened
    #[error("failed to open transport {transport}: {reason}")]
    Connect { transport: String, reason: String },
}

impl AtError {
    /// Whether this error was reported by the modem itself (as opposed to
    /// the transport or the caller)
    pub fn is_modem_error(&self) -> bool {
        matches!(self, AtError::Device | AtError::Cme(_) | AtError::Cms(_))
    }
}

impl From<std::io::Error> for AtError {
    fn from(e: std::io::Error) -> Self {
        AtError::Io(e.to_string())
    }
}
