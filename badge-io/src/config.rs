//! Configuration for the badge-io daemon
//!
//! Loads configuration from a TOML file. Every section and field has a
//! default, so a partial file (or none at all) is valid.

use crate::error::{Error, Result};
use crate::link::LinkOptions;
use crate::protocol::DevicePreset;
use crate::pump::PumpSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub connection: ConnectionConfig,
    pub pump: PumpSettings,
    pub logging: LoggingConfig,
}

/// Serial link configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Serial port path (e.g. "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Baud rate; the device preset's rate when unset
    pub baud: Option<u32>,
    /// Which badge is attached
    pub device: DevicePreset,
    /// Retry timeout in milliseconds; 500 (5000 under a debugger) when unset
    pub sweep_interval_ms: Option<u64>,
    /// Talk to an in-process simulated badge instead of the serial port
    pub simulate: bool,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log filter (trace, debug, info, warn, error); RUST_LOG wins
    pub level: String,
}

impl ConnectionConfig {
    pub fn baud(&self) -> u32 {
        self.baud.unwrap_or_else(|| self.device.baud())
    }

    pub fn link_options(&self) -> LinkOptions {
        LinkOptions {
            sweep_interval: self.sweep_interval_ms.map(Duration::from_millis),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud: None,
            device: DevicePreset::default(),
            sweep_interval_ms: None,
            simulate: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use badge_io::config::AppConfig;
    ///
    /// let config = AppConfig::from_file("badge.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Reject values that parse but cannot work
    pub fn validate(&self) -> Result<()> {
        if self.pump.frame_rate == 0 {
            return Err(Error::Config("pump.frame_rate must be at least 1".into()));
        }
        if self.connection.baud == Some(0) {
            return Err(Error::Config("connection.baud must be non-zero".into()));
        }
        if self.connection.sweep_interval_ms == Some(0) {
            return Err(Error::Config(
                "connection.sweep_interval_ms must be non-zero".into(),
            ));
        }
        if !self.connection.simulate && self.connection.port.is_empty() {
            return Err(Error::Config("connection.port is empty".into()));
        }
        Ok(())
    }
}
