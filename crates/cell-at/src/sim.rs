//! SIM state decoding
//!
//! `AT+CPIN?` answers with `+CPIN: <code>`. Only the three codes that
//! matter for unlocking are told apart; anything else is `Unknown`.

use std::fmt;

use tracing::{error, warn};

/// Unlock status of the inserted SIM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SimState {
    /// SIM is unlocked and usable
    Ready,
    /// SIM waits for the PIN
    PinNeeded,
    /// SIM is blocked and waits for the PUK
    PukNeeded,
    /// State could not be determined
    ///
    /// Covers both an unrecognized reply and a missing one (SIM not powered
    /// yet, or `+CPIN` unsupported); the modem gives no reliable way to tell
    /// them apart.
    #[default]
    Unknown,
}

impl SimState {
    /// Decode the first token of a `+CPIN:` information line
    ///
    /// `None` means no information line could be read.
    pub fn from_reply(reply: Option<&str>) -> Self {
        let Some(code) = reply else {
            warn!("SIM not readable");
            return SimState::Unknown;
        };

        if code.starts_with("READY") {
            SimState::Ready
        } else if code.starts_with("SIM PIN") {
            SimState::PinNeeded
        } else if code.starts_with("SIM PUK") {
            SimState::PukNeeded
        } else {
            error!("Unknown SIM state {}", code);
            SimState::Unknown
        }
    }

    /// Returns a human-readable name for the state
    pub fn name(&self) -> &'static str {
        match self {
            SimState::Ready => "ready",
            SimState::PinNeeded => "PIN needed",
            SimState::PukNeeded => "PUK needed",
            SimState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SimState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
