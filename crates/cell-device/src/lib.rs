//! Cellular Device Coordinator
//!
//! This crate owns everything a modem driver shares between its users:
//!
//! - **Handle pool**: at most one [`AtHandler`](cell_at::AtHandler) per
//!   transport, reference counted and closed when the last user releases it
//! - **Subsystem cache**: lazily created, reference counted network, SMS,
//!   power and information subsystems
//! - **Context registry**: independently created and destroyed data contexts,
//!   kept in creation order
//! - **Device-wide operations**: readiness probe, SIM state, PIN entry and
//!   power saving mode negotiation
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use cell_device::{CellularDevice, DeviceConfig, SerialConnector};
//!
//! let connector = Arc::new(SerialConnector::new(115_200));
//! let device = CellularDevice::new(DeviceConfig::new("/dev/ttyUSB2"), connector).unwrap();
//!
//! device.is_ready().unwrap();
//! let state = device.sim_state().unwrap();
//! println!("SIM is {}", state);
//!
//! let network = device.open_network(None);
//! // ... use the network subsystem ...
//! device.close_network();
//! ```

pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod pool;
pub mod serial;
pub mod slot;
pub mod subsystem;

pub use config::DeviceConfig;
pub use context::{ContextId, ContextRegistry};
pub use device::CellularDevice;
pub use error::DeviceError;
pub use pool::HandlePool;
pub use serial::SerialConnector;
pub use slot::SubsystemSlot;
pub use subsystem::{
    AtContext, AtInformation, AtNetwork, AtPower, AtSms, AtSubsystems, CellularContext,
    CellularInformation, CellularNetwork, CellularPower, CellularSms, Subsystem,
    SubsystemFactory,
};
