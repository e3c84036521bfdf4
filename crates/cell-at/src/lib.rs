//! Cellular AT Command Library
//!
//! This crate provides the protocol-level building blocks for driving a
//! cellular modem over a single textual command/response link:
//!
//! - **Engine**: [`AtHandler`] serializes command/response exchanges on one
//!   transport behind a per-handle lock ([`AtSession`])
//! - **Transport seam**: [`TransportId`] names a byte stream, a [`Connector`]
//!   opens it
//! - **SIM state**: decoding of `+CPIN:` replies into [`SimState`]
//! - **PSM timers**: 3GPP TS 24.008 GPRS Timer / GPRS Timer 3 information
//!   element encoding used by `AT+CPSMS`
//!
//! # Example
//!
//! ```rust
//! use cell_at::psm::{encode_active, encode_periodic};
//!
//! let periodic = encode_periodic(60);
//! let active = encode_active(90);
//!
//! assert_eq!(periodic.to_bit_string(), "01111110");
//! assert_eq!(active.to_bit_string(), "00100001");
//! ```

pub mod command;
pub mod error;
pub mod handler;
pub mod psm;
pub mod sim;
pub mod transport;

pub use error::{AtError, AtResult};
pub use handler::{AtHandler, AtSession, DEFAULT_AT_TIMEOUT};
pub use psm::{GprsTimer, TimerKind};
pub use sim::SimState;
pub use transport::{Connector, Transport, TransportId};
