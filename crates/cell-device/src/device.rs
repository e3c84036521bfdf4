//! Device coordinator
//!
//! [`CellularDevice`] ties the handle pool, the subsystem cache and the
//! context registry together and implements the device-wide operations.
//!
//! The device state mutex guards pool/cache/registry bookkeeping and is never
//! held across an AT exchange; each [`AtHandler`] serializes the exchanges on
//! its own transport.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use cell_at::psm::PsmTimers;
use cell_at::{command, AtError, AtHandler, AtResult, Connector, SimState, TransportId};
use tracing::{debug, error, info, warn};

use crate::config::DeviceConfig;
use crate::context::{ContextId, ContextRegistry};
use crate::error::DeviceError;
use crate::pool::HandlePool;
use crate::slot::SubsystemSlot;
use crate::subsystem::{
    AtSubsystems, CellularContext, CellularInformation, CellularNetwork, CellularPower,
    CellularSms, SubsystemFactory,
};

/// Bookkeeping guarded by the device mutex
struct DeviceState {
    pool: HandlePool,
    at: Option<Arc<AtHandler>>,
    network: SubsystemSlot<dyn CellularNetwork>,
    sms: SubsystemSlot<dyn CellularSms>,
    power: SubsystemSlot<dyn CellularPower>,
    information: SubsystemSlot<dyn CellularInformation>,
    contexts: ContextRegistry,
    closed: bool,
}

/// A cellular modem driven over AT commands
pub struct CellularDevice<F: SubsystemFactory = AtSubsystems> {
    default_transport: TransportId,
    factory: F,
    state: Mutex<DeviceState>,
}

impl CellularDevice<AtSubsystems> {
    /// Open a device with the generic AT subsystems
    pub fn new(config: DeviceConfig, connector: Arc<dyn Connector>) -> Result<Self, DeviceError> {
        Self::with_factory(config, connector, AtSubsystems)
    }
}

impl<F: SubsystemFactory> CellularDevice<F> {
    /// Open a device whose subsystems are built by `factory`
    ///
    /// Fails if the default transport cannot be opened.
    pub fn with_factory(
        config: DeviceConfig,
        connector: Arc<dyn Connector>,
        factory: F,
    ) -> Result<Self, DeviceError> {
        let mut pool = HandlePool::new(connector, config.timeout(), config.modem_debug);
        let at = pool
            .acquire(&config.default_transport)
            .ok_or_else(|| DeviceError::TransportUnavailable(config.default_transport.to_string()))?;

        info!("Cellular device on {}", config.default_transport);

        Ok(Self {
            default_transport: config.default_transport,
            factory,
            state: Mutex::new(DeviceState {
                pool,
                at: Some(at),
                network: SubsystemSlot::new("network"),
                sms: SubsystemSlot::new("sms"),
                power: SubsystemSlot::new("power"),
                information: SubsystemSlot::new("information"),
                contexts: ContextRegistry::new(),
                closed: false,
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve<'a>(&'a self, transport: Option<&'a TransportId>) -> &'a TransportId {
        transport.unwrap_or(&self.default_transport)
    }

    /// Transport used when an operation does not name one
    pub fn default_transport(&self) -> &TransportId {
        &self.default_transport
    }

    /// Factory building this device's subsystems
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// The device's own AT handle; `None` after [`shutdown`](Self::shutdown)
    pub fn at_handler(&self) -> Option<Arc<AtHandler>> {
        self.state().at.clone()
    }

    fn handle(&self) -> AtResult<Arc<AtHandler>> {
        self.at_handler().ok_or(AtError::Closed)
    }

    // ------------------------------------------------------------------
    // Device-wide operations
    // ------------------------------------------------------------------

    /// Check that the modem answers AT commands
    ///
    /// `AT` is sent twice: after data mode the first one may only bring the
    /// modem back to command mode, so its result is discarded.
    pub fn is_ready(&self) -> AtResult<()> {
        let handle = self.handle()?;
        let mut at = handle.lock();
        at.cmd_start(command::AT);
        at.cmd_stop_read_resp();

        at.clear_error();
        at.cmd_start(command::AT);
        at.cmd_stop_read_resp();

        at.unlock_return_error()
    }

    /// Not supported by the generic AT device
    pub fn set_ready_cb(&self, _callback: Box<dyn Fn() + Send + Sync>) -> AtResult<()> {
        Err(AtError::Unsupported)
    }

    /// Query the SIM unlock state
    ///
    /// An error means the state could not be determined; a successful
    /// exchange whose reply is missing or unrecognized yields
    /// [`SimState::Unknown`].
    pub fn sim_state(&self) -> AtResult<SimState> {
        let handle = self.handle()?;
        let mut at = handle.lock();
        at.flush();
        at.cmd_start(command::CPIN_QUERY);
        at.cmd_stop();
        at.resp_start(command::CPIN_RESPONSE);
        let state = SimState::from_reply(at.read_string().as_deref());
        at.resp_stop();
        let result = at.unlock_return_error();

        match state {
            SimState::Ready => info!("SIM is ready"),
            SimState::PinNeeded => info!("SIM PIN required"),
            SimState::PukNeeded => error!("SIM PUK required"),
            SimState::Unknown => warn!("SIM state unknown"),
        }

        result.map(|()| state)
    }

    /// Unlock the SIM with `pin`
    ///
    /// Succeeds without sending anything if the SIM is already ready, since
    /// the modem rejects a PIN for an unlocked SIM.
    pub fn set_pin(&self, pin: Option<&str>) -> AtResult<()> {
        if let Ok(SimState::Ready) = self.sim_state() {
            return Ok(());
        }

        let pin = pin
            .filter(|pin| !pin.is_empty())
            .ok_or_else(|| AtError::Parameter("SIM PIN required".into()))?;

        let handle = self.handle()?;
        let mut at = handle.lock();
        at.cmd_start(command::CPIN_SET);
        at.write_string(pin);
        at.cmd_stop_read_resp();
        at.unlock_return_error()
    }

    /// Request power saving mode with the given periodic TAU and active time
    ///
    /// Both zero disables PSM. The network may grant shorter timers than
    /// requested. A rejected request is logged but not escalated; the
    /// modem's error is still returned.
    pub fn set_power_save_mode(&self, periodic_seconds: u32, active_seconds: u32) -> AtResult<()> {
        let handle = self.handle()?;
        let mut at = handle.lock();

        match PsmTimers::new(periodic_seconds, active_seconds) {
            None => {
                at.cmd_start(command::CPSMS_SET);
                at.write_int(0);
                at.cmd_stop_read_resp();
            }
            Some(timers) => {
                let periodic = timers.periodic.to_bit_string();
                let active = timers.active.to_bit_string();
                debug!(
                    "PSM periodic {}s -> {}, active {}s -> {}",
                    periodic_seconds, periodic, active_seconds, active
                );

                // Same timers for GPRS and for LTE
                at.cmd_start(command::CPSMS_SET);
                at.write_int(1);
                at.write_string(&periodic);
                at.write_string(&active);
                at.write_string(&periodic);
                at.write_string(&active);
                at.cmd_stop_read_resp();

                if at.last_error().is_err() {
                    warn!("Power save mode not enabled!");
                }
            }
        }

        at.unlock_return_error()
    }

    /// Set the default exchange timeout of every handle, current and future
    pub fn set_timeout(&self, timeout: Duration) {
        self.state().pool.set_timeout(timeout);
    }

    /// Default exchange timeout
    pub fn timeout(&self) -> Duration {
        self.state().pool.default_timeout()
    }

    /// Enable or disable AT line logging on every handle, current and future
    pub fn set_debug(&self, on: bool) {
        self.state().pool.set_debug(on);
    }

    /// Whether AT line logging is enabled
    pub fn modem_debug(&self) -> bool {
        self.state().pool.debug()
    }

    /// Log the modem model
    pub fn init_module(&self) -> AtResult<()> {
        if let Some(information) = self.open_information(None) {
            match information.model() {
                Ok(model) => info!("Model {}", model),
                Err(e) => debug!("Model not available: {}", e),
            }
            self.close_information();
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Subsystems
    // ------------------------------------------------------------------

    /// Open the network subsystem, creating it on `transport` (or the
    /// default transport) if it does not exist yet
    pub fn open_network(&self, transport: Option<&TransportId>) -> Option<Arc<dyn CellularNetwork>> {
        let transport = self.resolve(transport);
        let mut state = self.state();
        if state.closed {
            return None;
        }
        let DeviceState { pool, network, .. } = &mut *state;
        network.open(pool, transport, |at| self.factory.network(at))
    }

    /// Release one user of the network subsystem
    pub fn close_network(&self) {
        let mut state = self.state();
        let DeviceState { pool, network, .. } = &mut *state;
        network.close(pool);
    }

    /// Open the SMS subsystem
    pub fn open_sms(&self, transport: Option<&TransportId>) -> Option<Arc<dyn CellularSms>> {
        let transport = self.resolve(transport);
        let mut state = self.state();
        if state.closed {
            return None;
        }
        let DeviceState { pool, sms, .. } = &mut *state;
        sms.open(pool, transport, |at| self.factory.sms(at))
    }

    /// Release one user of the SMS subsystem
    pub fn close_sms(&self) {
        let mut state = self.state();
        let DeviceState { pool, sms, .. } = &mut *state;
        sms.close(pool);
    }

    /// Open the power subsystem
    pub fn open_power(&self, transport: Option<&TransportId>) -> Option<Arc<dyn CellularPower>> {
        let transport = self.resolve(transport);
        let mut state = self.state();
        if state.closed {
            return None;
        }
        let DeviceState { pool, power, .. } = &mut *state;
        power.open(pool, transport, |at| self.factory.power(at))
    }

    /// Release one user of the power subsystem
    pub fn close_power(&self) {
        let mut state = self.state();
        let DeviceState { pool, power, .. } = &mut *state;
        power.close(pool);
    }

    /// Open the information subsystem
    pub fn open_information(
        &self,
        transport: Option<&TransportId>,
    ) -> Option<Arc<dyn CellularInformation>> {
        let transport = self.resolve(transport);
        let mut state = self.state();
        if state.closed {
            return None;
        }
        let DeviceState {
            pool, information, ..
        } = &mut *state;
        information.open(pool, transport, |at| self.factory.information(at))
    }

    /// Release one user of the information subsystem
    pub fn close_information(&self) {
        let mut state = self.state();
        let DeviceState {
            pool, information, ..
        } = &mut *state;
        information.close(pool);
    }

    // ------------------------------------------------------------------
    // Contexts
    // ------------------------------------------------------------------

    /// Create a data context for `apn` on `transport` (or the default
    /// transport) and append it to the context list
    pub fn create_context(
        &self,
        transport: Option<&TransportId>,
        apn: Option<&str>,
    ) -> Option<ContextId> {
        let transport = self.resolve(transport);
        let mut state = self.state();
        if state.closed {
            return None;
        }
        let DeviceState { pool, contexts, .. } = &mut *state;
        contexts.create(pool, transport, |at, id| self.factory.context(at, id, apn))
    }

    /// Destroy a data context; unknown ids are ignored
    pub fn delete_context(&self, id: ContextId) {
        let mut state = self.state();
        let DeviceState { pool, contexts, .. } = &mut *state;
        contexts.destroy(pool, id);
    }

    /// Look up a data context
    pub fn context(&self, id: ContextId) -> Option<Arc<dyn CellularContext>> {
        self.state().contexts.get(id)
    }

    /// Data contexts in creation order
    pub fn context_list(&self) -> Vec<ContextId> {
        self.state().contexts.list()
    }

    // ------------------------------------------------------------------
    // Diagnostics and teardown
    // ------------------------------------------------------------------

    /// Number of live AT handles
    pub fn handle_count(&self) -> usize {
        self.state().pool.len()
    }

    /// Number of users holding the handle for `transport`
    pub fn handle_refs(&self, transport: &TransportId) -> usize {
        self.state().pool.ref_count(transport)
    }

    /// Close every subsystem and context and drop every handle
    ///
    /// Safe to call more than once and regardless of how many users forgot
    /// to close what they opened. Device-wide operations fail with
    /// [`AtError::Closed`] afterwards. Called automatically on drop.
    pub fn shutdown(&self) {
        let mut state = self.state();
        if state.closed {
            return;
        }

        let DeviceState {
            pool,
            at,
            network,
            sms,
            power,
            information,
            contexts,
            closed,
        } = &mut *state;

        network.force_close(pool);
        sms.force_close(pool);
        power.force_close(pool);
        information.force_close(pool);
        contexts.clear(pool);
        if let Some(at) = at.take() {
            pool.release(&at);
        }
        pool.clear();
        *closed = true;

        info!("Cellular device on {} shut down", self.default_transport);
    }
}

impl<F: SubsystemFactory> Drop for CellularDevice<F> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<F: SubsystemFactory> std::fmt::Debug for CellularDevice<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("CellularDevice")
            .field("default_transport", &self.default_transport)
            .field("pool", &state.pool)
            .field("network", &state.network)
            .field("sms", &state.sms)
            .field("power", &state.power)
            .field("information", &state.information)
            .field("contexts", &state.contexts)
            .finish()
    }
}
