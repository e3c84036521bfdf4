//! Persisted tool settings

use std::path::PathBuf;

use anyhow::Context;
use cell_device::serial::DEFAULT_BAUD_RATE;
use serde::{Deserialize, Serialize};

/// Settings saved between runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// Serial port of the modem's AT interface
    pub port: String,
    /// Baud rate
    #[serde(default = "default_baud")]
    pub baud_rate: u32,
    /// Default AT exchange timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Log every AT line
    #[serde(default)]
    pub modem_debug: bool,
}

fn default_baud() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_timeout_ms() -> u64 {
    1000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB2".to_string(),
            baud_rate: default_baud(),
            timeout_ms: default_timeout_ms(),
            modem_debug: false,
        }
    }
}

impl Settings {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".config").join("cellctl"))
    }

    /// Get the settings file path
    fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from disk, falling back to defaults
    pub fn load() -> Self {
        Self::settings_path()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save settings to disk
    pub fn save(&self) -> anyhow::Result<PathBuf> {
        let path = Self::settings_path().context("could not determine settings path")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(self).context("failed to serialize settings")?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_settings_use_defaults() {
        let settings: Settings = serde_json::from_str(r#"{ "port": "/dev/ttyACM0" }"#).unwrap();
        assert_eq!(settings.port, "/dev/ttyACM0");
        assert_eq!(settings.baud_rate, 115_200);
        assert_eq!(settings.timeout_ms, 1000);
        assert!(!settings.modem_debug);
    }

    #[test]
    fn test_round_trip() {
        let settings = Settings {
            modem_debug: true,
            ..Default::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert_eq!(serde_json::from_str::<Settings>(&json).unwrap(), settings);
    }
}
