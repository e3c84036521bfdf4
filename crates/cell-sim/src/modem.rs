//! Virtual modem
//!
//! Understands the handful of commands the device layer sends:
//!
//! - `AT` - readiness probe (can be armed to fail once, as after data mode)
//! - `AT+CPIN?` / `AT+CPIN="<pin>"` - SIM state and unlock
//! - `AT+CPSMS=...` - power saving mode settings
//! - `AT+CGMI`, `AT+CGMM`, `AT+CGMR`, `AT+CGSN` - identification
//!
//! Anything else is answered with `ERROR`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{self, ErrorKind, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use cell_at::{command, AtError, Connector, Transport, TransportId};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// How long an idle read waits before reporting a timeout
const IDLE_READ: Duration = Duration::from_millis(1);

/// `+CME ERROR` codes used by the model
const CME_NOT_ALLOWED: i32 = 3;
const CME_INCORRECT_PASSWORD: i32 = 16;

/// Configuration for creating a virtual modem
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VirtualModemConfig {
    /// `+CPIN:` code reported by the SIM; `None` omits the information line
    pub sim_code: Option<String>,
    /// PIN that unlocks the SIM
    pub pin: String,
    /// Whether `AT+CPSMS` is accepted
    pub psm_supported: bool,
    /// Manufacturer reported by `AT+CGMI`
    pub manufacturer: String,
    /// Model reported by `AT+CGMM`
    pub model: String,
    /// Revision reported by `AT+CGMR`
    pub revision: String,
    /// Serial number reported by `AT+CGSN`
    pub imei: String,
}

impl Default for VirtualModemConfig {
    fn default() -> Self {
        Self {
            sim_code: Some("READY".to_string()),
            pin: "1234".to_string(),
            psm_supported: true,
            manufacturer: "Virtual".to_string(),
            model: "VM-1".to_string(),
            revision: "1.0.0".to_string(),
            imei: "490154203237518".to_string(),
        }
    }
}

/// Modem model shared by all links
#[derive(Debug, Default)]
struct ModemState {
    config: VirtualModemConfig,
    responsive: bool,
    stale_probe: bool,
    psm_setting: Option<String>,
    commands: Vec<(TransportId, String)>,
    connects: HashMap<TransportId, usize>,
    unreachable: HashSet<TransportId>,
    live_links: usize,
}

impl ModemState {
    /// Answer one command line with the lines the modem would send
    fn respond(&mut self, line: &str) -> Vec<String> {
        if !self.responsive {
            return Vec::new();
        }

        let ok = || command::OK.to_string();
        let cme = |code: i32| format!("{} {}", command::CME_ERROR, code);

        match line {
            command::AT => {
                if self.stale_probe {
                    self.stale_probe = false;
                    vec![command::ERROR.to_string()]
                } else {
                    vec![ok()]
                }
            }
            command::CPIN_QUERY => match &self.config.sim_code {
                Some(code) => vec![format!("{} {}", command::CPIN_RESPONSE, code), ok()],
                None => vec![ok()],
            },
            command::CGMI => vec![self.config.manufacturer.clone(), ok()],
            command::CGMM => vec![self.config.model.clone(), ok()],
            command::CGMR => vec![self.config.revision.clone(), ok()],
            command::CGSN => vec![self.config.imei.clone(), ok()],
            _ => {
                if let Some(pin) = line.strip_prefix(command::CPIN_SET) {
                    let pin = pin.trim_matches('"');
                    let locked = self.config.sim_code.as_deref() == Some("SIM PIN");
                    if !locked {
                        vec![cme(CME_NOT_ALLOWED)]
                    } else if pin == self.config.pin {
                        self.config.sim_code = Some("READY".to_string());
                        vec![ok()]
                    } else {
                        vec![cme(CME_INCORRECT_PASSWORD)]
                    }
                } else if let Some(params) = line.strip_prefix(command::CPSMS_SET) {
                    if self.config.psm_supported {
                        self.psm_setting = Some(params.to_string());
                        vec![ok()]
                    } else {
                        vec![command::ERROR.to_string()]
                    }
                } else {
                    vec![command::ERROR.to_string()]
                }
            }
        }
    }
}

/// A scriptable virtual modem
///
/// Clones share the same modem model.
#[derive(Debug, Clone)]
pub struct VirtualModem {
    state: Arc<Mutex<ModemState>>,
}

impl VirtualModem {
    /// Create a responsive modem with a ready SIM
    pub fn new() -> Self {
        Self::from_config(VirtualModemConfig::default())
    }

    /// Create a modem from configuration
    pub fn from_config(config: VirtualModemConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(ModemState {
                config,
                responsive: true,
                ..Default::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, ModemState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the `+CPIN:` code; `None` makes the modem omit the information line
    pub fn set_sim_code(&self, code: Option<&str>) {
        self.state().config.sim_code = code.map(str::to_string);
    }

    /// Set the PIN that unlocks the SIM
    pub fn set_pin(&self, pin: &str) {
        self.state().config.pin = pin.to_string();
    }

    /// Accept or reject `AT+CPSMS`
    pub fn set_psm_supported(&self, supported: bool) {
        self.state().config.psm_supported = supported;
    }

    /// Stop answering altogether (or resume)
    pub fn set_responsive(&self, responsive: bool) {
        self.state().responsive = responsive;
    }

    /// Make the next `AT` fail, as the first probe after data mode does
    pub fn arm_stale_probe(&self) {
        self.state().stale_probe = true;
    }

    /// Make connecting to `transport` fail (or succeed again)
    pub fn set_unreachable(&self, transport: &TransportId, unreachable: bool) {
        let mut state = self.state();
        if unreachable {
            state.unreachable.insert(transport.clone());
        } else {
            state.unreachable.remove(transport);
        }
    }

    /// Every command line received, in order
    pub fn commands(&self) -> Vec<String> {
        self.state()
            .commands
            .iter()
            .map(|(_, line)| line.clone())
            .collect()
    }

    /// Command lines received on one transport, in order
    pub fn commands_on(&self, transport: &TransportId) -> Vec<String> {
        self.state()
            .commands
            .iter()
            .filter(|(id, _)| id == transport)
            .map(|(_, line)| line.clone())
            .collect()
    }

    /// Forget recorded command lines
    pub fn clear_commands(&self) {
        self.state().commands.clear();
    }

    /// Parameters of the last accepted `AT+CPSMS`
    pub fn psm_setting(&self) -> Option<String> {
        self.state().psm_setting.clone()
    }

    /// Current `+CPIN:` code
    pub fn sim_code(&self) -> Option<String> {
        self.state().config.sim_code.clone()
    }

    /// How many times `transport` has been opened
    pub fn connect_count(&self, transport: &TransportId) -> usize {
        self.state().connects.get(transport).copied().unwrap_or(0)
    }

    /// Number of links not yet dropped
    pub fn live_links(&self) -> usize {
        self.state().live_links
    }
}

impl Default for VirtualModem {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for VirtualModem {
    fn connect(&self, id: &TransportId) -> Result<Box<dyn Transport>, AtError> {
        let mut state = self.state();
        if state.unreachable.contains(id) {
            return Err(AtError::Connect {
                transport: id.to_string(),
                reason: "unreachable".to_string(),
            });
        }

        *state.connects.entry(id.clone()).or_insert(0) += 1;
        state.live_links += 1;
        debug!("Virtual link to {} opened", id);

        Ok(Box::new(VirtualLink {
            id: id.clone(),
            state: self.state.clone(),
            line: Vec::new(),
            output: VecDeque::new(),
        }))
    }
}

/// One open transport to a [`VirtualModem`]
pub struct VirtualLink {
    id: TransportId,
    state: Arc<Mutex<ModemState>>,
    line: Vec<u8>,
    output: VecDeque<u8>,
}

impl VirtualLink {
    fn handle_line(&mut self) {
        let line = String::from_utf8_lossy(&self.line).trim().to_string();
        self.line.clear();
        if line.is_empty() {
            return;
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.commands.push((self.id.clone(), line.clone()));
        let replies = state.respond(&line);
        drop(state);

        trace!("{} <- {:?} -> {:?}", self.id, line, replies);
        for reply in replies {
            self.output.extend(b"\r\n");
            self.output.extend(reply.as_bytes());
            self.output.extend(b"\r\n");
        }
    }
}

impl Read for VirtualLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.output.is_empty() {
            thread::sleep(IDLE_READ);
            return Err(io::Error::new(ErrorKind::TimedOut, "no data"));
        }

        let n = buf.len().min(self.output.len());
        for (slot, byte) in buf.iter_mut().zip(self.output.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for VirtualLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &byte in buf {
            match byte {
                b'\r' => self.handle_line(),
                b'\n' => {}
                _ => self.line.push(byte),
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for VirtualLink {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.live_links = state.live_links.saturating_sub(1);
        debug!("Virtual link to {} closed", self.id);
    }
}

impl std::fmt::Debug for VirtualLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualLink")
            .field("id", &self.id)
            .field("pending_output", &self.output.len())
            .finish()
    }
}
