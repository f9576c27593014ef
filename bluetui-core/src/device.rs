/*!
 * Discovered Bluetooth Device
 * Immutable snapshot of one peer as reported by BlueZ
 */

use serde::Serialize;

use crate::transport::{PropertyMap, PropertyValue};

/// Placeholder shown when the remote object carries no `Name` property.
pub const UNKNOWN_NAME: &str = "<unknown>";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    name: String,
    address: String,
    path: String,
    paired: bool,
    trusted: bool,
    connected: bool,
}

impl Device {
    pub fn new(name: impl Into<String>, address: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            path: path.into(),
            paired: false,
            trusted: false,
            connected: false,
        }
    }

    /// Builds a device from the property map of a `Device1` interface.
    ///
    /// Returns `None` when `Address` is missing, since the address is the
    /// only key the session can cache the device under.
    pub fn from_properties(path: &str, props: &PropertyMap) -> Option<Self> {
        let address = props.get("Address").and_then(PropertyValue::as_str)?;
        let name = props
            .get("Name")
            .and_then(PropertyValue::as_str)
            .unwrap_or(UNKNOWN_NAME);
        let flag = |key: &str| props.get(key).and_then(PropertyValue::as_bool).unwrap_or(false);

        Some(Self {
            name: name.to_string(),
            address: address.to_string(),
            path: path.to_string(),
            paired: flag("Paired"),
            trusted: flag("Trusted"),
            connected: flag("Connected"),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Bus object path used for every remote call on this device.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_paired(&self) -> bool {
        self.paired
    }

    pub fn is_trusted(&self) -> bool {
        self.trusted
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}
