/*!
 * Bluetooth Adapter Session
 * Discovery, pairing and connection of BlueZ devices over one bus connection
 */

use serde::Serialize;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BusConfig;
use crate::device::{Device, UNKNOWN_NAME};
use crate::error::{is_already_paired, Error, Result};
use crate::transport::{BusConnection, CallError, PropertyValue, RemoteObject, TransportFactory};

/// Properties of the local controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdapterInfo {
    pub address: String,
    pub name: String,
    pub powered: bool,
}

/// One adapter, its bus connection and the devices seen by the last discovery.
///
/// A session is driven from a single task; it is not internally synchronized.
pub struct AdapterSession {
    config: BusConfig,
    conn: Option<Box<dyn BusConnection>>,
    devices: HashMap<String, Device>,
}

impl AdapterSession {
    /// Opens a session on `destination` and adapter `path`.
    ///
    /// Empty values fall back to `org.bluez` and `/org/bluez/hci0`.
    pub fn new(destination: &str, path: &str, factory: impl TransportFactory) -> Result<Self> {
        Self::with_config(BusConfig::default().with_bus(destination, path), factory)
    }

    pub fn with_config(config: BusConfig, factory: impl TransportFactory) -> Result<Self> {
        let destination = config.destination.clone();
        let adapter_path = config.adapter_path.clone();
        let config = config.with_bus(&destination, &adapter_path);

        let conn = factory(&config)?;
        info!("Adapter session open on {} {}", config.destination, config.adapter_path);

        Ok(Self {
            config,
            conn: Some(conn),
            devices: HashMap::new(),
        })
    }

    pub fn destination(&self) -> &str {
        &self.config.destination
    }

    pub fn path(&self) -> &str {
        &self.config.adapter_path
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    fn conn(&self) -> Result<&dyn BusConnection> {
        self.conn.as_deref().ok_or(Error::Closed)
    }

    fn adapter(&self) -> Result<Box<dyn RemoteObject>> {
        Ok(self.conn()?.resolve(&self.config.destination, &self.config.adapter_path))
    }

    /// Scans for devices and replaces the cache with what BlueZ reports.
    ///
    /// Discovery runs for the configured settle window, which `cancel` can cut
    /// short. Stopping discovery is attempted whatever happened before it; a
    /// failure there is added to the returned error but keeps the new cache.
    pub async fn discover(&mut self, cancel: &CancellationToken) -> Result<()> {
        let adapter = self.adapter()?;
        let manager = self
            .conn()?
            .resolve(&self.config.destination, &self.config.interfaces.object_manager_path);
        let adapter_iface = self.config.interfaces.adapter.clone();

        info!("Starting discovery on {}", self.config.adapter_path);
        adapter
            .invoke(&adapter_iface, "StartDiscovery", &[])
            .await
            .map_err(|e| Error::protocol("start discovery", adapter.path(), e))?;

        let settled = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(self.config.settle()) => Ok(()),
        };

        let outcome = match settled {
            Ok(()) => self.read_devices(manager.as_ref()).await.map(|devices| {
                info!("Discovered {} device(s)", devices.len());
                self.devices = devices;
            }),
            Err(e) => {
                info!("Discovery cancelled");
                Err(e)
            }
        };

        let stopped = adapter
            .invoke(&adapter_iface, "StopDiscovery", &[])
            .await
            .map_err(|e| {
                warn!("Failed to stop discovery: {}", e);
                Error::protocol("stop discovery", adapter.path(), e)
            })
            .err();

        match Error::join(outcome.err(), stopped) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Re-reads the object tree without scanning, e.g. after pairing changed
    /// a device's flags.
    pub async fn refresh(&mut self) -> Result<()> {
        let manager = self
            .conn()?
            .resolve(&self.config.destination, &self.config.interfaces.object_manager_path);
        self.devices = self.read_devices(manager.as_ref()).await?;
        Ok(())
    }

    /// Builds a fresh address-keyed cache from the object manager.
    async fn read_devices(&self, manager: &dyn RemoteObject) -> Result<HashMap<String, Device>> {
        let objects = manager
            .managed_objects()
            .await
            .map_err(|e| Error::protocol("enumerate devices", self.config.destination.clone(), e))?;

        let mut devices = HashMap::new();
        for (path, interfaces) in &objects {
            let Some(props) = interfaces.get(&self.config.interfaces.device) else {
                continue;
            };
            match Device::from_properties(path, props) {
                Some(device) => {
                    devices.insert(device.address().to_string(), device);
                }
                None => debug!("Skipping {}: no Address property", path),
            }
        }

        Ok(devices)
    }

    /// Devices from the last discovery, in no particular order.
    pub fn devices(&self) -> Result<Vec<Device>> {
        self.conn()?;
        if self.devices.is_empty() {
            return Err(Error::NotFound("no devices found".to_string()));
        }
        Ok(self.devices.values().cloned().collect())
    }

    pub fn device(&self, address: &str) -> Option<&Device> {
        self.devices.get(address)
    }

    /// Resolves a cached address to its bus object.
    fn target(&self, address: &str) -> Result<Box<dyn RemoteObject>> {
        if address.is_empty() {
            return Err(Error::Precondition("a device address is required"));
        }
        let conn = self.conn()?;
        let device = self
            .devices
            .get(address)
            .ok_or_else(|| Error::NotFound(format!("device {} has not been discovered", address)))?;

        debug!("Resolved {} to {}", address, device.path());
        Ok(conn.resolve(&self.config.destination, device.path()))
    }

    pub async fn pair(&self, address: &str) -> Result<()> {
        let device = self.target(address)?;
        match device.invoke(&self.config.interfaces.device, "Pair", &[]).await {
            Ok(()) => {
                info!("Paired successfully with {}", address);
                Ok(())
            }
            Err(e) if is_already_paired(&e) => {
                info!("{} already paired, skipping pairing", address);
                Ok(())
            }
            Err(e) => Err(Error::protocol("pair", address, e)),
        }
    }

    pub async fn trust(&self, address: &str) -> Result<()> {
        let device = self.target(address)?;
        device
            .set_property(&self.config.interfaces.device, "Trusted", PropertyValue::Bool(true))
            .await
            .map_err(|e| Error::protocol("trust", address, e))?;

        info!("Marked {} as trusted", address);
        Ok(())
    }

    pub async fn connect(&self, address: &str) -> Result<()> {
        let device = self.target(address)?;
        device
            .invoke(&self.config.interfaces.device, "Connect", &[])
            .await
            .map_err(|e| Error::protocol("connect", address, e))?;

        info!("Connected to {}", address);
        Ok(())
    }

    pub async fn disconnect(&self, address: &str) -> Result<()> {
        let device = self.target(address)?;
        device
            .invoke(&self.config.interfaces.device, "Disconnect", &[])
            .await
            .map_err(|e| Error::protocol("disconnect", address, e))?;

        info!("Disconnected from {}", address);
        Ok(())
    }

    /// Reads the controller's address, alias and power state.
    pub async fn adapter_info(&self) -> Result<AdapterInfo> {
        let adapter = self.adapter()?;
        let iface = &self.config.interfaces.adapter;

        let address = adapter
            .get_property(iface, "Address")
            .await
            .and_then(|value| match value {
                PropertyValue::Str(address) => Ok(address),
                other => Err(CallError::new(format!("unexpected Address value {:?}", other))),
            })
            .map_err(|e| Error::protocol("read adapter address", adapter.path(), e))?;

        let name = match adapter.get_property(iface, "Alias").await {
            Ok(PropertyValue::Str(name)) => name,
            _ => UNKNOWN_NAME.to_string(),
        };
        let powered = matches!(adapter.get_property(iface, "Powered").await, Ok(PropertyValue::Bool(true)));

        Ok(AdapterInfo { address, name, powered })
    }

    /// Releases the bus connection. The session rejects every call afterwards.
    pub fn close(&mut self) -> Result<()> {
        let mut conn = self.conn.take().ok_or(Error::Closed)?;
        self.devices.clear();
        conn.close()?;
        info!("Adapter session closed");
        Ok(())
    }
}
