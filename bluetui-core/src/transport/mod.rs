//! Transport seam between the adapter session and the system bus
//!
//! The session only ever sees [`BusConnection`] and [`RemoteObject`]. Bus
//! variant types stay inside the implementations:
//!
//! - [`system::DbusConnection`] - the D-Bus system bus through `dbus-tokio`
//! - [`mock::MockConnection`] - deterministic in-memory bus for tests

pub mod mock;
pub mod system;

pub use self::system::DbusConnection;
pub use self::mock::{Invocation, MockConnection};

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::config::BusConfig;

/// Property name to value, for one interface of one object.
pub type PropertyMap = HashMap<String, PropertyValue>;
/// Interface name to its properties, for one object.
pub type InterfaceMap = HashMap<String, PropertyMap>;
/// Object path to interfaces, as returned by the object manager.
pub type ManagedObjects = HashMap<String, InterfaceMap>;

/// The property and argument values the core works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Bool(bool),
    Str(String),
    Int(i64),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Str(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Str(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

/// A failed remote call.
///
/// `name` is the bus error name (`org.bluez.Error.*`) when the transport
/// reports one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallError {
    pub name: Option<String>,
    pub message: String,
}

impl CallError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            name: None,
            message: message.into(),
        }
    }

    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            message: message.into(),
        }
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, self.message.is_empty()) {
            (Some(name), true) => write!(f, "{}", name),
            _ => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for CallError {}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("failed to connect to system bus: {0}")]
    Connect(String),
    #[error("failed to close bus connection: {0}")]
    Close(String),
}

/// A handle to one addressable bus object.
#[async_trait]
pub trait RemoteObject: Send + Sync {
    fn path(&self) -> &str;

    /// Calls `interface.method` with positional arguments and waits for the reply.
    async fn invoke(&self, interface: &str, method: &str, args: &[PropertyValue]) -> Result<(), CallError>;

    async fn get_property(&self, interface: &str, name: &str) -> Result<PropertyValue, CallError>;

    async fn set_property(&self, interface: &str, name: &str, value: PropertyValue) -> Result<(), CallError>;

    /// Every object below this one, with its interfaces and properties.
    async fn managed_objects(&self) -> Result<ManagedObjects, CallError>;
}

/// An open bus connection owned by a single session.
pub trait BusConnection: Send + Sync {
    /// Never fails; a bad destination or path surfaces on the first call.
    fn resolve(&self, destination: &str, path: &str) -> Box<dyn RemoteObject>;

    fn close(&mut self) -> Result<(), TransportError>;
}

/// Builds the connection a session runs on.
pub trait TransportFactory: FnOnce(&BusConfig) -> Result<Box<dyn BusConnection>, TransportError> {}

impl<F> TransportFactory for F where F: FnOnce(&BusConfig) -> Result<Box<dyn BusConnection>, TransportError> {}
