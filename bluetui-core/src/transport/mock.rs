//! In-memory bus for exercising adapter sessions without BlueZ
//!
//! A [`MockConnection`] is a cheap handle onto shared state: keep one clone in
//! the test, hand [`MockConnection::factory`] to the session, and assert on
//! [`MockConnection::history`] afterwards. Unconfigured calls succeed.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{
    BusConnection, CallError, InterfaceMap, ManagedObjects, PropertyMap, PropertyValue, RemoteObject,
    TransportError, TransportFactory,
};
use crate::config::{BusConfig, InterfaceNames};

/// One recorded remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub destination: String,
    pub path: String,
    /// Fully qualified `interface.method`
    pub method: String,
    pub args: Vec<PropertyValue>,
}

#[derive(Debug, Default)]
struct MockState {
    objects: ManagedObjects,
    properties: HashMap<(String, String, String), PropertyValue>,
    path_failures: HashMap<String, CallError>,
    method_failures: HashMap<(String, String), CallError>,
    history: Vec<Invocation>,
    closes: usize,
    close_failure: Option<String>,
}

impl MockState {
    fn record(&mut self, destination: &str, path: &str, method: String, args: Vec<PropertyValue>) -> Result<(), CallError> {
        let failure = self
            .method_failures
            .get(&(path.to_string(), method.clone()))
            .or_else(|| self.path_failures.get(path))
            .cloned();

        self.history.push(Invocation {
            destination: destination.to_string(),
            path: path.to_string(),
            method,
            args,
        });

        failure.map_or(Ok(()), Err)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
    interfaces: InterfaceNames,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A factory that hands this connection's shared state to a session.
    ///
    /// The connection takes the session's interface names, so property and
    /// object manager calls are recorded under the configured names.
    pub fn factory(&self) -> impl TransportFactory {
        let mut conn = self.clone();
        move |config: &BusConfig| -> Result<Box<dyn BusConnection>, TransportError> {
            conn.interfaces = config.interfaces.clone();
            Ok(Box::new(conn))
        }
    }

    /// A factory that fails as if no system bus were reachable.
    pub fn unavailable() -> impl TransportFactory {
        |_config: &BusConfig| -> Result<Box<dyn BusConnection>, TransportError> {
            Err(TransportError::Connect("no bus available".to_string()))
        }
    }

    /// Replaces everything the object manager will report.
    pub fn set_objects(&self, objects: ManagedObjects) {
        self.lock().objects = objects;
    }

    pub fn insert_object(&self, path: &str, interfaces: InterfaceMap) {
        self.lock().objects.insert(path.to_string(), interfaces);
    }

    /// Adds an object exposing only `interface` with the given properties.
    pub fn insert_interface(&self, path: &str, interface: &str, props: PropertyMap) {
        self.lock()
            .objects
            .entry(path.to_string())
            .or_default()
            .insert(interface.to_string(), props);
    }

    pub fn set_property(&self, path: &str, interface: &str, name: &str, value: PropertyValue) {
        self.lock()
            .properties
            .insert((path.to_string(), interface.to_string(), name.to_string()), value);
    }

    /// Fails every call made on `path`.
    pub fn fail_path(&self, path: &str, error: CallError) {
        self.lock().path_failures.insert(path.to_string(), error);
    }

    /// Fails calls of one fully qualified `interface.method` on `path`.
    pub fn fail_method(&self, path: &str, method: &str, error: CallError) {
        self.lock()
            .method_failures
            .insert((path.to_string(), method.to_string()), error);
    }

    pub fn fail_close(&self, message: &str) {
        self.lock().close_failure = Some(message.to_string());
    }

    pub fn history(&self) -> Vec<Invocation> {
        self.lock().history.clone()
    }

    /// Recorded `interface.method` names, in call order.
    pub fn methods(&self) -> Vec<String> {
        self.lock().history.iter().map(|call| call.method.clone()).collect()
    }

    pub fn calls_on(&self, path: &str) -> Vec<Invocation> {
        self.lock()
            .history
            .iter()
            .filter(|call| call.path == path)
            .cloned()
            .collect()
    }

    pub fn clear_history(&self) {
        self.lock().history.clear();
    }

    pub fn close_count(&self) -> usize {
        self.lock().closes
    }
}

impl BusConnection for MockConnection {
    fn resolve(&self, destination: &str, path: &str) -> Box<dyn RemoteObject> {
        Box::new(MockObject {
            destination: destination.to_string(),
            path: path.to_string(),
            conn: self.clone(),
            interfaces: self.interfaces.clone(),
        })
    }

    fn close(&mut self) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.closes += 1;
        match &state.close_failure {
            Some(message) => Err(TransportError::Close(message.clone())),
            None => Ok(()),
        }
    }
}

struct MockObject {
    destination: String,
    path: String,
    conn: MockConnection,
    interfaces: InterfaceNames,
}

impl MockObject {
    fn record(&self, method: String, args: Vec<PropertyValue>) -> Result<(), CallError> {
        self.conn.lock().record(&self.destination, &self.path, method, args)
    }
}

#[async_trait]
impl RemoteObject for MockObject {
    fn path(&self) -> &str {
        &self.path
    }

    async fn invoke(&self, interface: &str, method: &str, args: &[PropertyValue]) -> Result<(), CallError> {
        self.record(format!("{}.{}", interface, method), args.to_vec())
    }

    async fn get_property(&self, interface: &str, name: &str) -> Result<PropertyValue, CallError> {
        self.record(
            format!("{}.Get", self.interfaces.properties),
            vec![interface.into(), name.into()],
        )?;

        self.conn
            .lock()
            .properties
            .get(&(self.path.clone(), interface.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| {
                CallError::named(
                    "org.freedesktop.DBus.Error.InvalidArgs",
                    format!("No such property '{}'", name),
                )
            })
    }

    async fn set_property(&self, interface: &str, name: &str, value: PropertyValue) -> Result<(), CallError> {
        self.record(
            format!("{}.Set", self.interfaces.properties),
            vec![interface.into(), name.into(), value.clone()],
        )?;

        self.conn
            .lock()
            .properties
            .insert((self.path.clone(), interface.to_string(), name.to_string()), value);
        Ok(())
    }

    async fn managed_objects(&self) -> Result<ManagedObjects, CallError> {
        self.record(format!("{}.GetManagedObjects", self.interfaces.object_manager), Vec::new())?;
        Ok(self.conn.lock().objects.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_calls_succeed_and_are_recorded() {
        let conn = MockConnection::new();
        let object = conn.resolve("org.bluez", "/org/bluez/hci0");

        object.invoke("org.bluez.Adapter1", "StartDiscovery", &[]).await.unwrap();
        assert!(object.managed_objects().await.unwrap().is_empty());

        assert_eq!(
            conn.methods(),
            vec![
                "org.bluez.Adapter1.StartDiscovery".to_string(),
                "org.freedesktop.DBus.ObjectManager.GetManagedObjects".to_string(),
            ]
        );
        assert_eq!(conn.history()[0].destination, "org.bluez");
    }

    #[tokio::test]
    async fn test_method_failure_takes_precedence_over_path_failure() {
        let conn = MockConnection::new();
        conn.fail_path("/dev_1", CallError::new("path down"));
        conn.fail_method("/dev_1", "org.bluez.Device1.Pair", CallError::new("Already Exists"));

        let object = conn.resolve("org.bluez", "/dev_1");
        let err = object.invoke("org.bluez.Device1", "Pair", &[]).await.unwrap_err();
        assert_eq!(err.message, "Already Exists");

        let err = object.invoke("org.bluez.Device1", "Connect", &[]).await.unwrap_err();
        assert_eq!(err.message, "path down");

        let other = conn.resolve("org.bluez", "/dev_2");
        assert!(other.invoke("org.bluez.Device1", "Connect", &[]).await.is_ok());
        assert_eq!(conn.history().len(), 3);
    }

    #[tokio::test]
    async fn test_properties_round_trip() {
        let conn = MockConnection::new();
        let object = conn.resolve("org.bluez", "/dev_1");

        assert!(object.get_property("org.bluez.Device1", "Trusted").await.is_err());
        object
            .set_property("org.bluez.Device1", "Trusted", PropertyValue::Bool(true))
            .await
            .unwrap();
        assert_eq!(
            object.get_property("org.bluez.Device1", "Trusted").await.unwrap(),
            PropertyValue::Bool(true)
        );
    }

    #[tokio::test]
    async fn test_insert_object_with_several_interfaces() {
        let conn = MockConnection::new();
        let mut device = PropertyMap::new();
        device.insert("Address".to_string(), PropertyValue::from("AA:AA"));
        let mut interfaces = InterfaceMap::new();
        interfaces.insert("org.bluez.Device1".to_string(), device);
        interfaces.insert("org.bluez.MediaControl1".to_string(), PropertyMap::new());
        conn.insert_object("/dev_1", interfaces);

        let objects = conn.resolve("org.bluez", "/").managed_objects().await.unwrap();
        assert_eq!(objects["/dev_1"].len(), 2);
    }

    #[tokio::test]
    async fn test_factory_adopts_configured_interface_names() {
        let mock = MockConnection::new();
        let mut config = BusConfig::default();
        config.interfaces.properties = "org.example.Properties".to_string();
        config.interfaces.object_manager = "org.example.ObjectManager".to_string();

        let conn = (mock.factory())(&config).unwrap();
        let object = conn.resolve("org.bluez", "/dev_1");
        object
            .set_property("org.bluez.Device1", "Trusted", PropertyValue::Bool(true))
            .await
            .unwrap();
        object.managed_objects().await.unwrap();

        assert_eq!(
            mock.methods(),
            vec![
                "org.example.Properties.Set".to_string(),
                "org.example.ObjectManager.GetManagedObjects".to_string(),
            ]
        );
    }

    #[test]
    fn test_close_is_counted() {
        let mut conn = MockConnection::new();
        let handle = conn.clone();
        conn.close().unwrap();
        handle.fail_close("busy");
        assert!(matches!(conn.close(), Err(TransportError::Close(_))));
        assert_eq!(handle.close_count(), 2);
    }
}
