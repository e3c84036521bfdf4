//! Modem subsystems
//!
//! The device only manages subsystem lifetimes; what each subsystem does
//! over its AT handle is up to the implementation. A modem-specific driver
//! supplies its own implementations through a [`SubsystemFactory`]; the
//! default [`AtSubsystems`] factory builds the generic AT ones below.

use std::sync::Arc;

use cell_at::{command, AtHandler, AtResult};

use crate::context::ContextId;

/// Common behaviour of every subsystem: it is bound to one AT handle
pub trait Subsystem: Send + Sync {
    /// Handle this subsystem issues its commands through
    fn at_handler(&self) -> &Arc<AtHandler>;
}

/// Network registration
pub trait CellularNetwork: Subsystem {}

/// Short message service
pub trait CellularSms: Subsystem {}

/// Modem power control
pub trait CellularPower: Subsystem {}

/// Device identification
pub trait CellularInformation: Subsystem {
    /// Manufacturer identification (`AT+CGMI`)
    fn manufacturer(&self) -> AtResult<String>;

    /// Model identification (`AT+CGMM`)
    fn model(&self) -> AtResult<String>;

    /// Firmware revision (`AT+CGMR`)
    fn revision(&self) -> AtResult<String>;

    /// Product serial number, usually the IMEI (`AT+CGSN`)
    fn serial_number(&self) -> AtResult<String>;
}

/// A data context (PDP context) owned by the device
pub trait CellularContext: Subsystem {
    /// Registry identity of this context
    fn id(&self) -> ContextId;

    /// Access point name, if one was given
    fn apn(&self) -> Option<&str>;
}

/// Builds the concrete subsystems for a device
///
/// Every method has a default that builds the generic AT implementation;
/// override the ones a particular modem does differently.
pub trait SubsystemFactory: Send + Sync {
    /// Build the network subsystem
    fn network(&self, at: Arc<AtHandler>) -> Arc<dyn CellularNetwork> {
        Arc::new(AtNetwork::new(at))
    }

    /// Build the SMS subsystem
    fn sms(&self, at: Arc<AtHandler>) -> Arc<dyn CellularSms> {
        Arc::new(AtSms::new(at))
    }

    /// Build the power subsystem
    fn power(&self, at: Arc<AtHandler>) -> Arc<dyn CellularPower> {
        Arc::new(AtPower::new(at))
    }

    /// Build the information subsystem
    fn information(&self, at: Arc<AtHandler>) -> Arc<dyn CellularInformation> {
        Arc::new(AtInformation::new(at))
    }

    /// Build a data context
    fn context(
        &self,
        at: Arc<AtHandler>,
        id: ContextId,
        apn: Option<&str>,
    ) -> Arc<dyn CellularContext> {
        Arc::new(AtContext::new(at, id, apn))
    }
}

/// Factory for the generic AT subsystems
#[derive(Debug, Clone, Copy, Default)]
pub struct AtSubsystems;

impl SubsystemFactory for AtSubsystems {}

macro_rules! at_subsystem {
    ($(#[$doc:meta])* $name:ident, $role:ident) => {
        $(#[$doc])*
        #[derive(Debug)]
        pub struct $name {
            at: Arc<AtHandler>,
        }

        impl $name {
            /// Bind to an AT handle
            pub fn new(at: Arc<AtHandler>) -> Self {
                Self { at }
            }
        }

        impl Subsystem for $name {
            fn at_handler(&self) -> &Arc<AtHandler> {
                &self.at
            }
        }

        impl $role for $name {}
    };
}

at_subsystem!(
    /// Generic AT network registration
    AtNetwork,
    CellularNetwork
);
at_subsystem!(
    /// Generic AT short message service
    AtSms,
    CellularSms
);
at_subsystem!(
    /// Generic AT power control
    AtPower,
    CellularPower
);

/// Generic AT device identification
#[derive(Debug)]
pub struct AtInformation {
    at: Arc<AtHandler>,
}

impl AtInformation {
    /// Bind to an AT handle
    pub fn new(at: Arc<AtHandler>) -> Self {
        Self { at }
    }

    /// Run an identification command and return its single reply line
    fn query(&self, cmd: &str) -> AtResult<String> {
        let mut at = self.at.lock();
        at.cmd_start(cmd);
        at.cmd_stop();
        at.resp_start("");
        let value = at.read_string().unwrap_or_default();
        at.resp_stop();
        at.unlock_return_error().map(|()| value)
    }
}

impl Subsystem for AtInformation {
    fn at_handler(&self) -> &Arc<AtHandler> {
        &self.at
    }
}

impl CellularInformation for AtInformation {
    fn manufacturer(&self) -> AtResult<String> {
        self.query(command::CGMI)
    }

    fn model(&self) -> AtResult<String> {
        self.query(command::CGMM)
    }

    fn revision(&self) -> AtResult<String> {
        self.query(command::CGMR)
    }

    fn serial_number(&self) -> AtResult<String> {
        self.query(command::CGSN)
    }
}

/// Generic AT data context
#[derive(Debug)]
pub struct AtContext {
    at: Arc<AtHandler>,
    id: ContextId,
    apn: Option<String>,
}

impl AtContext {
    /// Bind a context to an AT handle
    pub fn new(at: Arc<AtHandler>, id: ContextId, apn: Option<&str>) -> Self {
        Self {
            at,
            id,
            apn: apn.map(str::to_string),
        }
    }
}

impl Subsystem for AtContext {
    fn at_handler(&self) -> &Arc<AtHandler> {
        &self.at
    }
}

impl CellularContext for AtContext {
    fn id(&self) -> ContextId {
        self.id
    }

    fn apn(&self) -> Option<&str> {
        self.apn.as_deref()
    }
}
