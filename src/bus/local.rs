//! In-process bus built on a tokio broadcast channel.
//!
//! [`LocalBus`] plays the part of the bus daemon: it hands out unique
//! connection names, keeps the well-known name table, and fans every
//! emitted frame out to all connections. Each [`LocalConnection`] runs its
//! own dispatch loop on the current tokio runtime, filters frames by
//! destination and match rule, and calls the registered handlers.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{BusConnection, SignalHandler};
use crate::domain::names::{
    is_unique_name, validate_bus_name, validate_interface, validate_member, validate_object_path,
};
use crate::domain::{EventFrame, MatchRule, ReceivedSignal, SubscriptionId};
use crate::error::BusError;

/// A frame in flight, stamped with the sender's unique name.
#[derive(Debug)]
struct Envelope {
    sender: String,
    frame: EventFrame,
}

#[derive(Debug)]
struct BusShared {
    guid: Uuid,
    sender: broadcast::Sender<Arc<Envelope>>,
    /// Well-known name -> owning unique name.
    names: Mutex<HashMap<String, String>>,
    next_connection: AtomicU64,
}

impl BusShared {
    fn names(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.names.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn names_owned_by(&self, unique_name: &str) -> Vec<String> {
        self.names()
            .iter()
            .filter(|(_, owner)| owner.as_str() == unique_name)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// In-process message bus.
///
/// Cloning is cheap; clones share the same bus.
#[derive(Debug, Clone)]
pub struct LocalBus {
    shared: Arc<BusShared>,
}

impl LocalBus {
    /// Creates a bus whose fan-out channel holds `capacity` frames.
    ///
    /// Connections that fall further behind than `capacity` frames skip
    /// the oldest ones and log a warning.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        let guid = Uuid::new_v4();
        tracing::debug!(%guid, capacity, "local bus created");
        Self {
            shared: Arc::new(BusShared {
                guid,
                sender,
                names: Mutex::new(HashMap::new()),
                next_connection: AtomicU64::new(1),
            }),
        }
    }

    /// Returns the bus identifier.
    #[must_use]
    pub fn guid(&self) -> Uuid {
        self.shared.guid
    }

    /// Opens a new connection and starts its dispatch loop.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NoRuntime`] if called outside a tokio runtime.
    pub fn connect(&self) -> Result<Arc<LocalConnection>, BusError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| BusError::NoRuntime)?;
        let serial = self.shared.next_connection.fetch_add(1, Ordering::Relaxed);
        let unique_name = format!(":1.{serial}");
        let receiver = self.shared.sender.subscribe();

        let connection = Arc::new(LocalConnection {
            unique_name,
            bus: Arc::clone(&self.shared),
            registrations: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            closed: AtomicBool::new(false),
            task: Mutex::new(None),
        });
        let task = runtime.spawn(run_dispatch_loop(receiver, Arc::downgrade(&connection)));
        *connection.task() = Some(task);

        tracing::debug!(name = %connection.unique_name, "local bus connection opened");
        Ok(connection)
    }

    /// Returns the unique name owning `name`, if any.
    ///
    /// Unique names own themselves.
    #[must_use]
    pub fn name_owner(&self, name: &str) -> Option<String> {
        if is_unique_name(name) {
            return Some(name.to_string());
        }
        self.shared.names().get(name).cloned()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

struct Registration {
    rule: MatchRule,
    handler: Arc<dyn SignalHandler>,
}

/// One participant on a [`LocalBus`].
///
/// Closing (explicitly or by dropping the last `Arc`) stops the dispatch
/// loop, drops all registrations and releases owned names.
pub struct LocalConnection {
    unique_name: String,
    bus: Arc<BusShared>,
    registrations: Mutex<HashMap<SubscriptionId, Registration>>,
    next_id: AtomicU32,
    closed: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for LocalConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalConnection")
            .field("unique_name", &self.unique_name)
            .field("closed", &self.is_closed())
            .field("registrations", &self.registrations().len())
            .finish_non_exhaustive()
    }
}

impl LocalConnection {
    fn registrations(&self) -> MutexGuard<'_, HashMap<SubscriptionId, Registration>> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open(&self) -> Result<(), BusError> {
        if self.is_closed() {
            Err(BusError::Closed)
        } else {
            Ok(())
        }
    }

    /// Returns `true` once [`LocalConnection::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns the number of live registrations.
    #[must_use]
    pub fn registration_count(&self) -> usize {
        self.registrations().len()
    }

    /// Claims a well-known name for this connection.
    ///
    /// Requesting a name this connection already owns succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidName`] for unique or malformed names,
    /// [`BusError::NameTaken`] if another connection owns it, and
    /// [`BusError::Closed`] after close.
    pub fn request_name(&self, name: &str) -> Result<(), BusError> {
        self.ensure_open()?;
        validate_bus_name(name)?;
        if is_unique_name(name) {
            return Err(BusError::InvalidName {
                kind: "well-known name",
                name: name.to_string(),
            });
        }
        let mut names = self.bus.names();
        match names.get(name) {
            Some(owner) if *owner != self.unique_name => Err(BusError::NameTaken(name.to_string())),
            Some(_) => Ok(()),
            None => {
                names.insert(name.to_string(), self.unique_name.clone());
                tracing::debug!(name, owner = %self.unique_name, "name acquired");
                Ok(())
            }
        }
    }

    /// Releases a well-known name. Returns `true` if this connection owned it.
    pub fn release_name(&self, name: &str) -> bool {
        let mut names = self.bus.names();
        if names.get(name).is_some_and(|owner| *owner == self.unique_name) {
            names.remove(name);
            true
        } else {
            false
        }
    }

    /// Closes the connection. Safe to call more than once.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(task) = self.task().take() {
            task.abort();
        }
        let dropped = {
            let mut registrations = self.registrations();
            let count = registrations.len();
            registrations.clear();
            count
        };
        self.bus
            .names()
            .retain(|_, owner| *owner != self.unique_name);
        tracing::debug!(name = %self.unique_name, dropped, "local bus connection closed");
    }

    fn accepts_destination(&self, destination: Option<&str>) -> bool {
        match destination {
            None => true,
            Some(name) if is_unique_name(name) => name == self.unique_name,
            Some(name) => self
                .bus
                .names()
                .get(name)
                .is_some_and(|owner| *owner == self.unique_name),
        }
    }

    fn deliver(&self, envelope: &Envelope) {
        if self.is_closed() || !self.accepts_destination(envelope.frame.bus_endpoint.as_deref()) {
            return;
        }
        let sender_names = self.bus.names_owned_by(&envelope.sender);
        let signal = ReceivedSignal::from_frame(envelope.sender.as_str(), &envelope.frame);

        let handlers: Vec<Arc<dyn SignalHandler>> = self
            .registrations()
            .values()
            .filter(|r| r.rule.matches(&signal, &sender_names))
            .map(|r| Arc::clone(&r.handler))
            .collect();

        for handler in handlers {
            handler.dispatch(self, &signal);
        }
    }
}

impl BusConnection for LocalConnection {
    fn subscribe_pattern(
        &self,
        rule: &MatchRule,
        handler: Arc<dyn SignalHandler>,
    ) -> Result<SubscriptionId, BusError> {
        self.ensure_open()?;
        validate_member(&rule.signal_name)?;
        if let Some(sender) = &rule.sender {
            validate_bus_name(sender)?;
        }
        if let Some(interface) = &rule.interface {
            validate_interface(interface)?;
        }
        if let Some(path) = &rule.object_path {
            validate_object_path(path)?;
        }

        let raw = self.next_id.fetch_add(1, Ordering::Relaxed);
        let id = SubscriptionId::from_raw(raw)
            .ok_or_else(|| BusError::Rejected("subscription ids exhausted".to_string()))?;
        self.registrations().insert(
            id,
            Registration {
                rule: rule.clone(),
                handler,
            },
        );
        tracing::debug!(name = %self.unique_name, %id, %rule, "match rule added");
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if self.registrations().remove(&id).is_some() {
            tracing::debug!(name = %self.unique_name, %id, "match rule removed");
        } else if !self.is_closed() {
            tracing::warn!(name = %self.unique_name, %id, "unsubscribe for unknown subscription id");
        }
    }

    fn emit_signal(&self, frame: &EventFrame) -> Result<(), BusError> {
        self.ensure_open()?;
        validate_object_path(&frame.object_path)?;
        validate_interface(&frame.interface)?;
        validate_member(&frame.signal_name)?;
        if let Some(destination) = &frame.bus_endpoint {
            validate_bus_name(destination)?;
        }

        let receivers = self
            .bus
            .sender
            .send(Arc::new(Envelope {
                sender: self.unique_name.clone(),
                frame: frame.clone(),
            }))
            .unwrap_or(0);
        tracing::debug!(
            name = %self.unique_name,
            signal = %frame.signal_name,
            receivers,
            "signal emitted"
        );
        Ok(())
    }

    fn unique_name(&self) -> Option<&str> {
        Some(&self.unique_name)
    }
}

impl Drop for LocalConnection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Receives frames from the bus and hands them to the connection until
/// the connection goes away or the bus shuts down.
async fn run_dispatch_loop(
    mut frames: broadcast::Receiver<Arc<Envelope>>,
    connection: Weak<LocalConnection>,
) {
    loop {
        match frames.recv().await {
            Ok(envelope) => {
                let Some(connection) = connection.upgrade() else {
                    break;
                };
                connection.deliver(&envelope);
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(lagged = n, "local bus connection lagged behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    tracing::debug!("local bus dispatch loop stopped");
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::bus::handler_fn;
    use crate::domain::Payload;

    const IFACE: &str = "com.example.Iface";
    const PATH: &str = "/com/example/obj";

    fn rule(sender: Option<&str>, signal_name: &str) -> MatchRule {
        MatchRule {
            sender: sender.map(str::to_string),
            interface: Some(IFACE.to_string()),
            object_path: Some(PATH.to_string()),
            signal_name: signal_name.to_string(),
        }
    }

    fn frame(destination: Option<&str>, signal_name: &str) -> EventFrame {
        EventFrame {
            bus_endpoint: destination.map(str::to_string),
            interface: IFACE.to_string(),
            object_path: PATH.to_string(),
            signal_name: signal_name.to_string(),
            payload: Some(Payload::new(serde_json::json!({"n": 1}))),
        }
    }

    fn collector() -> (
        Arc<dyn SignalHandler>,
        mpsc::UnboundedReceiver<ReceivedSignal>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = handler_fn(move |_, signal| {
            let _ = tx.send(signal.clone());
        });
        (handler, rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<ReceivedSignal>) -> ReceivedSignal {
        let Ok(Some(signal)) = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await
        else {
            panic!("no signal delivered");
        };
        signal
    }

    fn connect(bus: &LocalBus) -> Arc<LocalConnection> {
        let Ok(conn) = bus.connect() else {
            panic!("connect failed");
        };
        conn
    }

    #[test]
    fn connect_outside_runtime_fails() {
        let bus = LocalBus::new(8);
        assert!(matches!(bus.connect(), Err(BusError::NoRuntime)));
    }

    #[tokio::test]
    async fn connections_get_distinct_unique_names() {
        let bus = LocalBus::new(8);
        let a = connect(&bus);
        let b = connect(&bus);
        assert_ne!(a.unique_name(), b.unique_name());
        assert!(a.unique_name().is_some_and(is_unique_name));
    }

    #[tokio::test]
    async fn broadcast_reaches_matching_subscription() {
        let bus = LocalBus::new(8);
        let sender = connect(&bus);
        let listener = connect(&bus);
        let (handler, mut rx) = collector();
        assert!(listener.subscribe_pattern(&rule(None, "Ping"), handler).is_ok());

        assert!(sender.emit_signal(&frame(None, "Ping")).is_ok());

        let signal = next(&mut rx).await;
        assert_eq!(Some(signal.sender.as_str()), sender.unique_name());
        assert_eq!(signal.interface, IFACE);
        assert_eq!(signal.object_path, PATH);
        assert_eq!(signal.signal_name, "Ping");
        assert_eq!(signal.payload, frame(None, "Ping").payload);
    }

    #[tokio::test]
    async fn unicast_skips_other_connections() {
        let bus = LocalBus::new(8);
        let sender = connect(&bus);
        let target = connect(&bus);
        let bystander = connect(&bus);
        let (target_handler, mut target_rx) = collector();
        let (bystander_handler, mut bystander_rx) = collector();
        let _ = target.subscribe_pattern(&rule(None, "Ping"), target_handler);
        let _ = bystander.subscribe_pattern(&rule(None, "Ping"), Arc::clone(&bystander_handler));
        let _ = bystander.subscribe_pattern(&rule(None, "Marker"), bystander_handler);

        let dest = target.unique_name().map(str::to_string);
        assert!(sender.emit_signal(&frame(dest.as_deref(), "Ping")).is_ok());
        assert!(sender.emit_signal(&frame(None, "Marker")).is_ok());

        assert_eq!(next(&mut target_rx).await.signal_name, "Ping");
        assert_eq!(next(&mut bystander_rx).await.signal_name, "Marker");
    }

    #[tokio::test]
    async fn well_known_names_route_and_match() {
        let bus = LocalBus::new(8);
        let sender = connect(&bus);
        let target = connect(&bus);
        assert!(sender.request_name("net.example.Source").is_ok());
        assert!(target.request_name("net.example.Target").is_ok());
        assert_eq!(
            bus.name_owner("net.example.Target").as_deref(),
            target.unique_name()
        );

        let (handler, mut rx) = collector();
        let _ = target.subscribe_pattern(&rule(Some("net.example.Source"), "Ping"), handler);
        assert!(sender
            .emit_signal(&frame(Some("net.example.Target"), "Ping"))
            .is_ok());

        let signal = next(&mut rx).await;
        assert_eq!(Some(signal.sender.as_str()), sender.unique_name());
    }

    #[tokio::test]
    async fn name_owned_by_other_connection_is_taken() {
        let bus = LocalBus::new(8);
        let a = connect(&bus);
        let b = connect(&bus);
        assert!(a.request_name("net.example.Service").is_ok());
        assert!(a.request_name("net.example.Service").is_ok());
        assert_eq!(
            b.request_name("net.example.Service"),
            Err(BusError::NameTaken("net.example.Service".to_string()))
        );
        assert!(!b.release_name("net.example.Service"));
        assert!(a.release_name("net.example.Service"));
        assert!(b.request_name("net.example.Service").is_ok());
    }

    #[tokio::test]
    async fn unique_names_cannot_be_requested() {
        let bus = LocalBus::new(8);
        let a = connect(&bus);
        assert!(matches!(
            a.request_name(":1.99"),
            Err(BusError::InvalidName { .. })
        ));
    }

    #[tokio::test]
    async fn close_releases_owned_names() {
        let bus = LocalBus::new(8);
        let a = connect(&bus);
        assert!(a.request_name("net.example.Service").is_ok());
        a.close();
        assert_eq!(bus.name_owner("net.example.Service"), None);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = LocalBus::new(8);
        let sender = connect(&bus);
        let listener = connect(&bus);
        let (handler, mut rx) = collector();
        let Ok(ping) = listener.subscribe_pattern(&rule(None, "Ping"), Arc::clone(&handler)) else {
            panic!("subscribe failed");
        };
        let _ = listener.subscribe_pattern(&rule(None, "Marker"), handler);
        listener.unsubscribe(ping);
        assert_eq!(listener.registration_count(), 1);

        let _ = sender.emit_signal(&frame(None, "Ping"));
        let _ = sender.emit_signal(&frame(None, "Marker"));
        assert_eq!(next(&mut rx).await.signal_name, "Marker");
    }

    #[tokio::test]
    async fn invalid_names_are_rejected() {
        let bus = LocalBus::new(8);
        let conn = connect(&bus);
        let (handler, _rx) = collector();

        let mut bad_rule = rule(None, "Ping");
        bad_rule.object_path = Some("no/slash".to_string());
        assert!(matches!(
            conn.subscribe_pattern(&bad_rule, Arc::clone(&handler)),
            Err(BusError::InvalidName { kind: "object path", .. })
        ));
        assert!(matches!(
            conn.subscribe_pattern(&rule(None, "2Ping"), handler),
            Err(BusError::InvalidName { kind: "member", .. })
        ));

        let mut bad_frame = frame(None, "Ping");
        bad_frame.interface = "NoDots".to_string();
        assert!(matches!(
            conn.emit_signal(&bad_frame),
            Err(BusError::InvalidName { kind: "interface", .. })
        ));
        assert!(matches!(
            conn.emit_signal(&frame(Some("bad"), "Ping")),
            Err(BusError::InvalidName { kind: "bus name", .. })
        ));
        assert_eq!(conn.registration_count(), 0);
    }

    #[tokio::test]
    async fn closed_connection_rejects_calls() {
        let bus = LocalBus::new(8);
        let conn = connect(&bus);
        let (handler, _rx) = collector();
        let _ = conn.subscribe_pattern(&rule(None, "Ping"), Arc::clone(&handler));
        conn.close();
        conn.close();
        assert!(conn.is_closed());
        assert_eq!(conn.registration_count(), 0);
        assert_eq!(conn.emit_signal(&frame(None, "Ping")), Err(BusError::Closed));
        assert_eq!(
            conn.subscribe_pattern(&rule(None, "Ping"), handler),
            Err(BusError::Closed)
        );
    }

    #[tokio::test]
    async fn emit_without_listeners_succeeds() {
        let bus = LocalBus::new(8);
        let conn = connect(&bus);
        drop(bus);
        assert!(conn.emit_signal(&frame(None, "Ping")).is_ok());
    }
}
