use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_DESTINATION: &str = "org.bluez";
pub const DEFAULT_ADAPTER_PATH: &str = "/org/bluez/hci0";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Bus names and timing for one adapter session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BusConfig {
    pub destination: String,
    pub adapter_path: String,
    /// How long discovery runs before the object tree is read
    pub settle_ms: u64,
    pub call_timeout_ms: u64,
    pub interfaces: InterfaceNames,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct InterfaceNames {
    pub adapter: String,
    pub device: String,
    pub properties: String,
    pub object_manager: String,
    pub object_manager_path: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            destination: DEFAULT_DESTINATION.to_string(),
            adapter_path: DEFAULT_ADAPTER_PATH.to_string(),
            settle_ms: 5000,
            call_timeout_ms: 30_000,
            interfaces: InterfaceNames::default(),
        }
    }
}

impl Default for InterfaceNames {
    fn default() -> Self {
        Self {
            adapter: "org.bluez.Adapter1".to_string(),
            device: "org.bluez.Device1".to_string(),
            properties: "org.freedesktop.DBus.Properties".to_string(),
            object_manager: "org.freedesktop.DBus.ObjectManager".to_string(),
            object_manager_path: "/".to_string(),
        }
    }
}

impl BusConfig {
    /// Loads a TOML config file, falling back to defaults when it does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Replaces empty destination or adapter path with the BlueZ defaults.
    pub fn with_bus(mut self, destination: &str, adapter_path: &str) -> Self {
        self.destination = if destination.is_empty() {
            DEFAULT_DESTINATION.to_string()
        } else {
            destination.to_string()
        };
        self.adapter_path = if adapter_path.is_empty() {
            DEFAULT_ADAPTER_PATH.to_string()
        } else {
            adapter_path.to_string()
        };
        self
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BusConfig::default();
        assert_eq!(config.destination, "org.bluez");
        assert_eq!(config.adapter_path, "/org/bluez/hci0");
        assert_eq!(config.settle(), Duration::from_secs(5));
        assert_eq!(config.interfaces.device, "org.bluez.Device1");
    }

    #[test]
    fn test_partial_toml() {
        let config = BusConfig::from_toml(
            r#"
            adapter_path = "/org/bluez/hci1"
            settle_ms = 250

            [interfaces]
            device = "org.example.Device"
            "#,
        )
        .unwrap();

        assert_eq!(config.destination, DEFAULT_DESTINATION);
        assert_eq!(config.adapter_path, "/org/bluez/hci1");
        assert_eq!(config.settle(), Duration::from_millis(250));
        assert_eq!(config.interfaces.device, "org.example.Device");
        assert_eq!(config.interfaces.adapter, "org.bluez.Adapter1");
    }

    #[test]
    fn test_malformed_toml() {
        assert!(BusConfig::from_toml("settle_ms = \"soon\"").is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = BusConfig::load("/nonexistent/bluetui/config.toml").unwrap();
        assert_eq!(config, BusConfig::default());
    }

    #[test]
    fn test_with_bus_falls_back_on_empty() {
        let config = BusConfig::default().with_bus("", "");
        assert_eq!(config.destination, DEFAULT_DESTINATION);
        assert_eq!(config.adapter_path, DEFAULT_ADAPTER_PATH);

        let config = BusConfig::default().with_bus("org.test", "/org/test/hci9");
        assert_eq!(config.destination, "org.test");
        assert_eq!(config.adapter_path, "/org/test/hci9");
    }
}
