//! Shared realtime connection and the manager that owns it.

use super::config::ConnectionConfig;
use super::transport::{Transport, TransportFactory, WebSocketFactory};
use super::wire::Frame;
use crate::error::{RealtimeError, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};
use url::Url;

/// Handler for one named server event.
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Identity of a registered handler, used to remove exactly that handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub u64);

/// Lifecycle of the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never started.
    Idle,
    /// First attempt in progress.
    Connecting,
    /// Namespace handshake completed; events flow.
    Connected,
    /// Waiting to retry after a failure.
    Reconnecting { attempt: u32 },
    /// Gave up after the bounded number of attempts.
    Exhausted,
    /// Shut down by the owner.
    Closed,
}

impl ConnectionState {
    /// Whether an I/O thread is (or should be) running.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting
                | ConnectionState::Connected
                | ConnectionState::Reconnecting { .. }
        )
    }
}

/// Server event decoded by the I/O thread, waiting for dispatch.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundEvent {
    pub name: String,
    pub payload: Value,
}

enum Exit {
    Shutdown,
    Dropped,
}

/// State shared between the connection and its I/O thread.
struct Shared {
    config: ConnectionConfig,
    factory: Arc<dyn TransportFactory>,
    state: Mutex<ConnectionState>,
    /// Subject ids joined on this connection; replayed after every reconnect.
    joined: Mutex<BTreeSet<String>>,
    shutdown: AtomicBool,
    inbound: Sender<InboundEvent>,
    outbound: Receiver<Frame>,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        let mut current = self.state.lock();
        let previous = *current;
        if previous != state {
            debug!(from = ?previous, to = ?state, "connection state changed");
            *current = state;
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Sleep for `delay`, waking early on shutdown. Returns false if shut down.
    fn sleep_unless_shutdown(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        let slice = self.config.poll_interval.max(Duration::from_millis(1));
        loop {
            if self.is_shutdown() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(slice.min(deadline - now));
        }
    }

    fn enqueue(&self, event: InboundEvent) {
        match self.inbound.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(event = %event.name, "inbound queue full; dropping event")
            }
            Err(TrySendError::Disconnected(event)) => {
                debug!(event = %event.name, "connection gone; dropping event")
            }
        }
    }

    /// Send a join for every subject not yet announced on this transport.
    /// The I/O thread is the only sender of join frames.
    fn sync_joins(
        &self,
        transport: &mut dyn Transport,
        announced: &mut BTreeSet<String>,
    ) -> Result<()> {
        let pending: Vec<String> = self
            .joined
            .lock()
            .iter()
            .filter(|subject| !announced.contains(*subject))
            .cloned()
            .collect();
        for subject in pending {
            let frame = Frame::event(
                self.config.join_event.clone(),
                Value::String(subject.clone()),
            );
            transport.send_text(&frame.encode())?;
            announced.insert(subject);
        }
        Ok(())
    }
}

/// One logical connection to the realtime event channel.
///
/// Network I/O happens on a dedicated thread. Decoded events are queued and
/// only dispatched to handlers when the owner calls [`pump`](Self::pump), so
/// handlers run on the owner's thread in transport order.
pub struct Connection {
    shared: Arc<Shared>,
    inbound: Receiver<InboundEvent>,
    outbound: Sender<Frame>,
    handlers: RwLock<HashMap<String, Vec<(HandlerId, EventHandler)>>>,
    next_handler: AtomicU64,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    pub fn new(config: ConnectionConfig, factory: Arc<dyn TransportFactory>) -> Self {
        let (inbound_tx, inbound_rx) = bounded(config.inbound_buffer.max(1));
        let (outbound_tx, outbound_rx) = unbounded();

        Self {
            shared: Arc::new(Shared {
                config,
                factory,
                state: Mutex::new(ConnectionState::Idle),
                joined: Mutex::new(BTreeSet::new()),
                shutdown: AtomicBool::new(false),
                inbound: inbound_tx,
                outbound: outbound_rx,
            }),
            inbound: inbound_rx,
            outbound: outbound_tx,
            handlers: RwLock::new(HashMap::new()),
            next_handler: AtomicU64::new(1),
            worker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Start the I/O thread unless one is already running.
    ///
    /// Safe to call redundantly. After the retry budget is exhausted this
    /// starts a fresh round of attempts.
    pub fn ensure_connected(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if let Some(handle) = worker.as_ref() {
            if !handle.is_finished() && self.state().is_live() {
                return Ok(());
            }
        }
        if let Some(handle) = worker.take() {
            let _ = handle.join();
        }

        // Invalid endpoints fail here, not on the I/O thread.
        let endpoint = self.shared.config.endpoint_url()?;

        self.shared.shutdown.store(false, Ordering::SeqCst);
        self.shared.set_state(ConnectionState::Connecting);

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("realtime-io".to_string())
            .spawn(move || run_io_loop(shared, endpoint))?;
        *worker = Some(handle);

        info!(endpoint = %self.shared.config.base_url, "realtime connection starting");
        Ok(())
    }

    /// Associate this connection with a subject (user) id.
    ///
    /// `None` or an empty id is a no-op. The id is recorded here and the
    /// I/O thread sends the signal once per established connection, so it
    /// is re-sent after every reconnect but never twice on one.
    pub fn join(&self, subject_id: Option<&str>) -> Result<()> {
        let Some(subject) = subject_id.filter(|s| !s.is_empty()) else {
            debug!("join skipped: no subject id");
            return Ok(());
        };

        let fresh = self.shared.joined.lock().insert(subject.to_string());
        debug!(subject = %subject, fresh, "joined session");
        Ok(())
    }

    /// Forget every joined subject. Returns the ids that were joined.
    pub fn leave_all(&self) -> Vec<String> {
        std::mem::take(&mut *self.shared.joined.lock())
            .into_iter()
            .collect()
    }

    pub fn joined(&self) -> Vec<String> {
        self.shared.joined.lock().iter().cloned().collect()
    }

    /// Queue an event for the server. Sent once the connection is up.
    pub fn emit(&self, event: &str, payload: Value) -> Result<()> {
        self.outbound
            .send(Frame::event(event, payload))
            .map_err(|_| RealtimeError::ChannelClosed)
    }

    /// Register a handler for a named server event.
    pub fn on<F>(&self, event: impl Into<String>, handler: F) -> HandlerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_handler.fetch_add(1, Ordering::SeqCst));
        self.handlers
            .write()
            .entry(event.into())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove exactly the handler `id` from `event`. Returns false if absent.
    pub fn off(&self, event: &str, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let Some(list) = handlers.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(hid, _)| *hid != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(event);
        }
        removed
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.read().get(event).map_or(0, Vec::len)
    }

    /// Invoke every handler for `event`. Returns how many ran.
    pub fn dispatch(&self, event: &str, payload: &Value) -> usize {
        let targets: Vec<EventHandler> = match self.handlers.read().get(event) {
            Some(list) => list.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => {
                trace!(event = %event, "no handlers for event");
                return 0;
            }
        };

        for handler in &targets {
            handler(payload);
        }
        targets.len()
    }

    /// Dispatch queued server events on the calling thread.
    ///
    /// Waits up to `timeout` for the first event, then drains whatever else
    /// is already queued. Returns the number of events dispatched.
    pub fn pump(&self, timeout: Duration) -> usize {
        let mut next = self.inbound.recv_timeout(timeout).ok();
        let mut count = 0;
        while let Some(event) = next {
            self.dispatch(&event.name, &event.payload);
            count += 1;
            next = self.inbound.try_recv().ok();
        }
        count
    }

    /// Dispatch queued events without waiting.
    pub fn pump_pending(&self) -> usize {
        self.pump(Duration::ZERO)
    }

    /// Stop the I/O thread and close the transport.
    pub fn disconnect(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
        if self.state() != ConnectionState::Idle {
            self.shared.set_state(ConnectionState::Closed);
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn run_io_loop(shared: Arc<Shared>, endpoint: Url) {
    let mut attempt: u32 = 0;

    loop {
        let mut transport = shared.factory.create();
        let mut reached = false;
        let outcome = drive(&shared, transport.as_mut(), &endpoint, &mut reached);
        transport.close();

        match outcome {
            Ok(Exit::Shutdown) => break,
            Ok(Exit::Dropped) => info!("realtime connection dropped"),
            Err(e) => warn!(error = %e, attempt, "realtime connection failed"),
        }

        if shared.is_shutdown() {
            break;
        }
        if reached {
            attempt = 0;
        }
        if !shared.config.reconnect || attempt >= shared.config.max_reconnect_attempts {
            warn!(attempts = attempt, "giving up on realtime connection; live updates disabled");
            shared.set_state(ConnectionState::Exhausted);
            return;
        }

        attempt += 1;
        shared.set_state(ConnectionState::Reconnecting { attempt });
        if !shared.sleep_unless_shutdown(shared.config.reconnect_delay) {
            break;
        }
    }

    shared.set_state(ConnectionState::Closed);
}

fn drive(
    shared: &Shared,
    transport: &mut dyn Transport,
    endpoint: &Url,
    reached: &mut bool,
) -> Result<Exit> {
    transport.connect(endpoint, shared.config.connect_timeout)?;
    debug!(endpoint = %endpoint, "transport open; awaiting handshake");
    let mut announced = BTreeSet::new();

    loop {
        if shared.is_shutdown() {
            if *reached {
                let _ = transport.send_text(&Frame::Disconnect.encode());
            }
            return Ok(Exit::Shutdown);
        }

        if *reached {
            shared.sync_joins(transport, &mut announced)?;
            while let Ok(frame) = shared.outbound.try_recv() {
                transport.send_text(&frame.encode())?;
            }
        }

        let Some(text) = transport.read_text(shared.config.poll_interval)? else {
            continue;
        };
        let frame = match Frame::decode(&text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                continue;
            }
        };

        match frame {
            Frame::Open(info) => {
                debug!(sid = %info.sid, "engine handshake received");
                transport.send_text(&Frame::Connect.encode())?;
            }
            Frame::Ping => transport.send_text(&Frame::Pong.encode())?,
            Frame::Connect => {
                *reached = true;
                shared.set_state(ConnectionState::Connected);
                info!("realtime connection established");
                shared.sync_joins(transport, &mut announced)?;
            }
            Frame::ConnectError(message) => {
                return Err(RealtimeError::Protocol(format!(
                    "connect rejected: {}",
                    message
                )))
            }
            Frame::Disconnect | Frame::Close => return Ok(Exit::Dropped),
            Frame::Event { name, mut args } => {
                let payload = if args.is_empty() {
                    Value::Null
                } else {
                    args.swap_remove(0)
                };
                trace!(event = %name, "server event received");
                shared.enqueue(InboundEvent { name, payload });
            }
            Frame::Pong | Frame::Noop | Frame::Ack { .. } => {}
        }
    }
}

/// Owns the single connection for a session.
///
/// The connection is created on first use and reused afterwards; only
/// [`teardown`](Self::teardown) replaces it.
pub struct ConnectionManager {
    config: ConnectionConfig,
    factory: Arc<dyn TransportFactory>,
    current: Mutex<Option<Arc<Connection>>>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            config,
            factory,
            current: Mutex::new(None),
        }
    }

    /// Manager using the WebSocket transport.
    pub fn websocket(config: ConnectionConfig) -> Self {
        Self::new(config, Arc::new(WebSocketFactory))
    }

    /// Return the existing connection, creating it on first call.
    pub fn get_connection(&self) -> Arc<Connection> {
        let mut current = self.current.lock();
        match current.as_ref() {
            Some(conn) => Arc::clone(conn),
            None => {
                let conn = Arc::new(Connection::new(
                    self.config.clone(),
                    Arc::clone(&self.factory),
                ));
                *current = Some(Arc::clone(&conn));
                conn
            }
        }
    }

    /// The connection, if one has been created.
    pub fn current(&self) -> Option<Arc<Connection>> {
        self.current.lock().clone()
    }

    /// Disconnect and forget the connection.
    pub fn teardown(&self) {
        let conn = self.current.lock().take();
        if let Some(conn) = conn {
            conn.leave_all();
            conn.disconnect();
            info!("realtime connection torn down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Unreachable;

    impl Transport for Unreachable {
        fn connect(&mut self, _endpoint: &Url, _timeout: Duration) -> Result<()> {
            Err(RealtimeError::NotConnected)
        }
        fn send_text(&mut self, _text: &str) -> Result<()> {
            Err(RealtimeError::NotConnected)
        }
        fn read_text(&mut self, _timeout: Duration) -> Result<Option<String>> {
            Err(RealtimeError::NotConnected)
        }
        fn close(&mut self) {}
    }

    fn offline_factory() -> Arc<dyn TransportFactory> {
        Arc::new(|| Box::new(Unreachable) as Box<dyn Transport>)
    }

    fn offline_connection() -> Connection {
        Connection::new(ConnectionConfig::default(), offline_factory())
    }

    #[test]
    fn test_on_off_removes_only_that_handler() {
        let conn = offline_connection();
        let hits = Arc::new(AtomicUsize::new(0));

        let h1 = {
            let hits = Arc::clone(&hits);
            conn.on("taskUpdated", move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        let h2 = {
            let hits = Arc::clone(&hits);
            conn.on("taskUpdated", move |_| {
                hits.fetch_add(10, Ordering::SeqCst);
            })
        };
        assert_ne!(h1, h2);
        assert_eq!(conn.handler_count("taskUpdated"), 2);

        assert!(conn.off("taskUpdated", h1));
        assert!(!conn.off("taskUpdated", h1));
        assert_eq!(conn.dispatch("taskUpdated", &Value::Null), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 10);

        assert!(conn.off("taskUpdated", h2));
        assert_eq!(conn.handler_count("taskUpdated"), 0);
    }

    #[test]
    fn test_dispatch_unknown_event() {
        let conn = offline_connection();
        assert_eq!(conn.dispatch("nobodyListens", &Value::Null), 0);
    }

    #[test]
    fn test_join_without_subject_is_noop() {
        let conn = offline_connection();
        conn.join(None).unwrap();
        conn.join(Some("")).unwrap();
        assert!(conn.joined().is_empty());
    }

    #[test]
    fn test_join_before_connect_is_remembered() {
        let conn = offline_connection();
        conn.join(Some("user-1")).unwrap();
        conn.join(Some("user-1")).unwrap();
        assert_eq!(conn.joined(), vec!["user-1".to_string()]);

        assert_eq!(conn.leave_all(), vec!["user-1".to_string()]);
        assert!(conn.joined().is_empty());
    }

    #[test]
    fn test_pump_with_empty_queue() {
        let conn = offline_connection();
        assert_eq!(conn.pump(Duration::from_millis(10)), 0);
        assert_eq!(conn.state(), ConnectionState::Idle);
    }

    #[test]
    fn test_ensure_connected_rejects_bad_endpoint() {
        let conn = Connection::new(
            ConnectionConfig::with_base_url("nonsense"),
            offline_factory(),
        );
        assert!(matches!(
            conn.ensure_connected(),
            Err(RealtimeError::InvalidEndpoint(_))
        ));
        assert_eq!(conn.state(), ConnectionState::Idle);
    }

    #[test]
    fn test_manager_reuses_connection() {
        let manager = ConnectionManager::new(ConnectionConfig::default(), offline_factory());
        assert!(manager.current().is_none());

        let a = manager.get_connection();
        let b = manager.get_connection();
        assert!(Arc::ptr_eq(&a, &b));

        manager.teardown();
        assert!(manager.current().is_none());
        let c = manager.get_connection();
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
