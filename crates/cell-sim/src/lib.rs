//! Cellular Modem Simulation Library
//!
//! This crate provides a virtual modem for exercising AT drivers without
//! hardware. [`VirtualModem`] is a [`Connector`](cell_at::Connector): every
//! transport it opens is an in-memory link that answers AT commands from a
//! shared, scriptable modem model and records the command lines it receives.
//!
//! # Example
//!
//! ```rust
//! use cell_at::{Connector, TransportId};
//! use cell_sim::VirtualModem;
//!
//! let modem = VirtualModem::new();
//! modem.set_sim_code(Some("SIM PIN"));
//!
//! let tty = TransportId::new("sim0");
//! let _link = modem.connect(&tty).unwrap();
//! assert_eq!(modem.connect_count(&tty), 1);
//! assert_eq!(modem.live_links(), 1);
//! ```

pub mod modem;

pub use modem::{VirtualLink, VirtualModem, VirtualModemConfig};
