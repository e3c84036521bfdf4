//! Transport identity and the connector seam
//!
//! A transport is the single byte stream (usually a serial port) that AT
//! traffic flows over. The engine never opens transports itself; a
//! [`Connector`] turns a [`TransportId`] into a live stream.

use std::fmt;
use std::io::{Read, Write};

use crate::error::AtError;

/// Opaque, comparable identity of a transport (e.g. `/dev/ttyUSB2`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct TransportId(String);

impl TransportId {
    /// Create a transport identity from a name or path
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the name this identity was created from
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransportId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for TransportId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// A byte stream carrying AT traffic
///
/// Reads are expected to return [`std::io::ErrorKind::TimedOut`] (or
/// `WouldBlock`) when no data arrives within the stream's own read timeout,
/// as serial ports do.
pub trait Transport: Read + Write + Send {}

impl<T: Read + Write + Send> Transport for T {}

/// Opens transports by identity
pub trait Connector: Send + Sync {
    /// Open the transport named by `id`
    fn connect(&self, id: &TransportId) -> Result<Box<dyn Transport>, AtError>;
}
