/*!
 * bluetui core
 * BlueZ adapter session over D-Bus with a swappable transport
 * Onyx Digital Intelligence Development LLC
 */

pub mod adapter;
pub mod config;
pub mod device;
pub mod error;
pub mod transport;

pub use adapter::{AdapterInfo, AdapterSession};
pub use config::{BusConfig, ConfigError, InterfaceNames};
pub use device::{Device, UNKNOWN_NAME};
pub use error::{is_already_paired, Error, ErrorKind, Result};
pub use tokio_util::sync::CancellationToken;
pub use transport::{
    BusConnection, CallError, DbusConnection, ManagedObjects, MockConnection, PropertyMap, PropertyValue,
    RemoteObject, TransportError, TransportFactory,
};
