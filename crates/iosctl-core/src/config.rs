//! Persistent configuration for iosctl.
//!
//! Stores user settings in `~/.iosctl/config.json`. Every field has a default,
//! so a missing or partial file is fine.
//!
//! # Example
//!
//! ```no_run
//! use iosctl_core::config::IosctlConfig;
//!
//! let config = IosctlConfig::load();
//! println!("timeout: {:?}", config.command_timeout());
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const CONFIG_DIR: &str = ".iosctl";
const CONFIG_FILENAME: &str = "config.json";

/// Persistent iosctl configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IosctlConfig {
    /// Per-process timeout for external tool invocations, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Interpreter used to launch `pymobiledevice3`.
    #[serde(default = "default_python")]
    pub python: String,

    /// Sleep between lookups in `wait_for_element_by_text`, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl Default for IosctlConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_timeout_secs(),
            python: default_python(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Directory holding the config file (`~/.iosctl`).
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
}

/// Path of the config file (`~/.iosctl/config.json`).
pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILENAME)
}

impl IosctlConfig {
    /// Load config from `~/.iosctl/config.json`.
    ///
    /// Returns [`Default`] if the file does not exist or cannot be parsed.
    pub fn load() -> Self {
        std::fs::read_to_string(config_path())
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save config to `~/.iosctl/config.json`, creating the directory.
    pub fn save(&self) -> std::io::Result<()> {
        let dir = config_dir();
        std::fs::create_dir_all(&dir)?;
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(config_path(), json)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = IosctlConfig::default();
        assert_eq!(config.command_timeout(), Duration::from_secs(30));
        assert_eq!(config.python, "python3");
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn deserialize_empty_json() {
        let loaded: IosctlConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(loaded, IosctlConfig::default());
    }

    #[test]
    fn deserialize_partial_json() {
        let loaded: IosctlConfig =
            serde_json::from_str(r#"{"command_timeout_secs": 5}"#).unwrap();
        assert_eq!(loaded.command_timeout_secs, 5);
        assert_eq!(loaded.python, "python3");
    }

    #[test]
    fn roundtrip_serialization() {
        let config = IosctlConfig {
            command_timeout_secs: 12,
            python: "/opt/venv/bin/python".to_string(),
            poll_interval_ms: 250,
        };
        let json = serde_json::to_string(&config).unwrap();
        let loaded: IosctlConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn load_does_not_panic() {
        // The real config file may or may not exist.
        let _ = IosctlConfig::load();
    }
}
