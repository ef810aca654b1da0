//! Configuration loading
//!
//! Reads link settings from `fxchain.toml` (or `--config <path>`), falling
//! back to the device defaults when no file exists.

pub mod loader;

pub use loader::{load_config, parse_config, DEFAULT_CONFIG_FILE};

use fxchain_hal::LinkConfig;
use serde::Deserialize;

/// Serial port the device enumerates as on Linux
pub const DEFAULT_PORT: &str = "/dev/ttyACM0";

/// Whole configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub link: LinkSection,
}

/// `[link]` table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LinkSection {
    /// Serial device path or name
    pub port: String,
    /// Line settings (baudrate, read_timeout_ms, data_bits, parity, stop_bits)
    #[serde(flatten)]
    pub settings: LinkConfig,
}

impl Default for LinkSection {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.into(),
            settings: LinkConfig::default(),
        }
    }
}

impl AppConfig {
    /// Apply command-line overrides on top of file values
    pub fn with_overrides(mut self, port: Option<&str>, baudrate: Option<u32>) -> Self {
        if let Some(port) = port {
            self.link.port = port.into();
        }
        if let Some(baudrate) = baudrate {
            self.link.settings = self.link.settings.with_baudrate(baudrate);
        }
        self
    }
}
