/*!
 * D-Bus System Bus Transport
 * Non-blocking BlueZ calls over dbus-tokio
 */

use async_trait::async_trait;
use dbus::arg::{AppendAll, ArgType, IterAppend, PropMap, RefArg, Variant};
use dbus::nonblock::{Proxy, SyncConnection};
use dbus::strings::{BusName, Interface, Member, Path};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::{BusConnection, CallError, ManagedObjects, PropertyMap, PropertyValue, RemoteObject, TransportError};
use crate::config::{BusConfig, InterfaceNames};

const INVALID_ARGS: &str = "org.freedesktop.DBus.Error.InvalidArgs";

type ManagedObjectsReply = (HashMap<Path<'static>, HashMap<String, PropMap>>,);

pub struct DbusConnection {
    conn: Arc<SyncConnection>,
    resource: Option<JoinHandle<()>>,
    timeout: Duration,
    interfaces: InterfaceNames,
}

impl DbusConnection {
    /// Opens a connection to the system bus.
    ///
    /// Must run inside a tokio runtime: the connection's I/O is driven by a
    /// spawned task that lives until [`BusConnection::close`].
    pub fn connect(config: &BusConfig) -> Result<Box<dyn BusConnection>, TransportError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::Connect(format!("no async runtime: {}", e)))?;

        let (resource, conn) =
            dbus_tokio::connection::new_system_sync().map_err(|e| TransportError::Connect(e.to_string()))?;

        let handle = runtime.spawn(async move {
            let err = resource.await;
            tracing::error!("Lost connection to D-Bus: {}", err);
        });

        tracing::debug!("Connected to system bus");

        Ok(Box::new(Self {
            conn,
            resource: Some(handle),
            timeout: config.call_timeout(),
            interfaces: config.interfaces.clone(),
        }))
    }
}

impl BusConnection for DbusConnection {
    fn resolve(&self, destination: &str, path: &str) -> Box<dyn RemoteObject> {
        let proxy = match (BusName::new(destination.to_string()), Path::new(path.to_string())) {
            (Ok(dest), Ok(object_path)) => Ok(Proxy::new(dest, object_path, self.timeout, self.conn.clone())),
            (Err(e), _) | (_, Err(e)) => Err(CallError::named(INVALID_ARGS, e)),
        };

        Box::new(DbusObject {
            path: path.to_string(),
            proxy,
            interfaces: self.interfaces.clone(),
        })
    }

    fn close(&mut self) -> Result<(), TransportError> {
        match self.resource.take() {
            Some(handle) => {
                handle.abort();
                tracing::debug!("Closed system bus connection");
                Ok(())
            }
            None => Err(TransportError::Close("connection already closed".to_string())),
        }
    }
}

struct DbusObject {
    path: String,
    proxy: Result<Proxy<'static, Arc<SyncConnection>>, CallError>,
    interfaces: InterfaceNames,
}

impl DbusObject {
    fn proxy(&self) -> Result<&Proxy<'static, Arc<SyncConnection>>, CallError> {
        self.proxy.as_ref().map_err(Clone::clone)
    }
}

#[async_trait]
impl RemoteObject for DbusObject {
    fn path(&self) -> &str {
        &self.path
    }

    async fn invoke(&self, interface: &str, method: &str, args: &[PropertyValue]) -> Result<(), CallError> {
        let proxy = self.proxy()?;
        tracing::debug!("{} {}.{}", self.path, interface, method);
        let interface = interface_name(interface)?;
        let method = Member::new(method.to_string()).map_err(|e| CallError::named(INVALID_ARGS, e))?;

        proxy
            .method_call::<(), _, _, _>(interface, method, Args(args.to_vec()))
            .await
            .map_err(call_error)
    }

    async fn get_property(&self, interface: &str, name: &str) -> Result<PropertyValue, CallError> {
        let proxy = self.proxy()?;
        tracing::debug!("{} {}.Get {}", self.path, self.interfaces.properties, name);
        let properties = interface_name(&self.interfaces.properties)?;
        let (value,): (Variant<Box<dyn RefArg + 'static>>,) = proxy
            .method_call(properties, "Get", (interface, name))
            .await
            .map_err(call_error)?;

        property_value(&*value.0)
            .ok_or_else(|| CallError::named(INVALID_ARGS, format!("unsupported type for property {}", name)))
    }

    async fn set_property(&self, interface: &str, name: &str, value: PropertyValue) -> Result<(), CallError> {
        let proxy = self.proxy()?;
        tracing::debug!("{} {}.Set {}", self.path, self.interfaces.properties, name);
        let properties = interface_name(&self.interfaces.properties)?;
        let reply = match value {
            PropertyValue::Bool(b) => proxy.method_call(properties, "Set", (interface, name, Variant(b))),
            PropertyValue::Str(s) => proxy.method_call(properties, "Set", (interface, name, Variant(s))),
            PropertyValue::Int(i) => proxy.method_call(properties, "Set", (interface, name, Variant(i))),
        };
        reply.await.map_err(call_error)
    }

    async fn managed_objects(&self) -> Result<ManagedObjects, CallError> {
        let proxy = self.proxy()?;
        tracing::debug!("{} {}.GetManagedObjects", self.path, self.interfaces.object_manager);
        let object_manager = interface_name(&self.interfaces.object_manager)?;
        let (objects,): ManagedObjectsReply = proxy
            .method_call(object_manager, "GetManagedObjects", ())
            .await
            .map_err(call_error)?;

        Ok(objects
            .into_iter()
            .map(|(path, interfaces)| {
                let interfaces = interfaces
                    .into_iter()
                    .map(|(name, props)| (name, property_map(&props)))
                    .collect();
                (path.to_string(), interfaces)
            })
            .collect())
    }
}

/// Positional call arguments appended one by one.
struct Args(Vec<PropertyValue>);

impl AppendAll for Args {
    fn append(&self, ia: &mut IterAppend) {
        for value in &self.0 {
            match value {
                PropertyValue::Bool(b) => ia.append(*b),
                PropertyValue::Str(s) => ia.append(s.as_str()),
                PropertyValue::Int(i) => ia.append(*i),
            }
        }
    }
}

/// Checks an interface name up front; the dbus string conversions panic on
/// malformed names and these come from user config.
fn interface_name(name: &str) -> Result<Interface<'static>, CallError> {
    Interface::new(name.to_string()).map_err(|e| CallError::named(INVALID_ARGS, e))
}

fn call_error(err: dbus::Error) -> CallError {
    CallError {
        name: err.name().map(str::to_string),
        message: err.message().unwrap_or_default().to_string(),
    }
}

fn property_map(props: &PropMap) -> PropertyMap {
    props
        .iter()
        .filter_map(|(key, value)| property_value(&*value.0).map(|v| (key.clone(), v)))
        .collect()
}

/// Converts the property types the core understands; everything else is dropped.
fn property_value(value: &dyn RefArg) -> Option<PropertyValue> {
    match value.arg_type() {
        ArgType::Boolean => value.as_u64().map(|v| PropertyValue::Bool(v != 0)),
        ArgType::String | ArgType::ObjectPath => value.as_str().map(|s| PropertyValue::Str(s.to_string())),
        ArgType::Byte | ArgType::Int16 | ArgType::UInt16 | ArgType::Int32 | ArgType::UInt32 | ArgType::Int64 => {
            value.as_i64().map(PropertyValue::Int)
        }
        ArgType::Variant => value
            .as_iter()
            .and_then(|mut inner| inner.next().and_then(property_value)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_value_conversion() {
        assert_eq!(property_value(&true), Some(PropertyValue::Bool(true)));
        assert_eq!(property_value(&"AA:BB".to_string()), Some(PropertyValue::from("AA:BB")));
        assert_eq!(property_value(&-42i16), Some(PropertyValue::Int(-42)));
        assert_eq!(property_value(&7u32), Some(PropertyValue::Int(7)));
        assert_eq!(property_value(&vec!["uuid".to_string()]), None);
    }

    #[test]
    fn test_malformed_interface_name_is_call_error() {
        let err = interface_name("not an interface").unwrap_err();
        assert_eq!(err.name.as_deref(), Some(INVALID_ARGS));

        assert!(interface_name("org.freedesktop.DBus.Properties").is_ok());
        assert!(interface_name("").is_err());
    }

    #[test]
    fn test_property_map_drops_unsupported() {
        let mut props = PropMap::new();
        props.insert("Address".to_string(), Variant(Box::new("AA:BB".to_string())));
        props.insert("UUIDs".to_string(), Variant(Box::new(vec!["0000110b".to_string()])));

        let map = property_map(&props);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("Address"), Some(&PropertyValue::from("AA:BB")));
    }
}
