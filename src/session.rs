//! Session-scoped realtime context.

use crate::connection::{
    Connection, ConnectionConfig, ConnectionManager, ConnectionState, TransportFactory,
    WebSocketFactory,
};
use crate::error::Result;
use crate::feed::{FeedConfig, FeedSnapshot, NotificationFeed, SoundCue, TerminalBell};
use crate::router::{Attachment, EventRouter, LiveSink, RouteOutcome};
use crate::subscriptions::{DuplicatePolicy, Registration, UpdateRegistry};
use crate::types::{EntityKind, NotificationId, NotificationInput, NotificationRecord};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Default number of recent event ids remembered for redelivery checks.
pub const DEFAULT_DEDUP_WINDOW: usize = 256;

/// Session configuration.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub connection: ConnectionConfig,
    pub feed: FeedConfig,
    pub duplicate_policy: DuplicatePolicy,
    /// Event ids remembered for dropping redeliveries. 0 disables.
    pub dedup_window: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            feed: FeedConfig::default(),
            duplicate_policy: DuplicatePolicy::default(),
            dedup_window: DEFAULT_DEDUP_WINDOW,
        }
    }
}

impl SessionConfig {
    /// Defaults, with the endpoint taken from the environment.
    pub fn from_env() -> Self {
        Self {
            connection: ConnectionConfig::from_env(),
            ..Default::default()
        }
    }
}

/// Everything the UI talks to for live notifications.
///
/// Created once at session start. [`start`](Self::start) connects and joins
/// the user, [`end`](Self::end) tears the connection down at logout. The
/// update registry outlives `end` because consumers unregister themselves
/// when they unmount.
pub struct RealtimeSession {
    connections: ConnectionManager,
    feed: Arc<NotificationFeed>,
    registry: Arc<UpdateRegistry>,
    router: Arc<EventRouter>,
    attachment: Mutex<Option<Attachment>>,
    subject: Mutex<Option<String>>,
}

impl RealtimeSession {
    /// Session over WebSocket that rings the terminal bell.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_parts(config, Arc::new(WebSocketFactory), Box::new(TerminalBell))
    }

    /// Session with a custom transport and sound cue.
    pub fn with_parts(
        config: SessionConfig,
        factory: Arc<dyn TransportFactory>,
        sound: Box<dyn SoundCue>,
    ) -> Self {
        let feed = Arc::new(NotificationFeed::with_sound(config.feed, sound));
        let registry = Arc::new(UpdateRegistry::with_policy(config.duplicate_policy));
        let sink = Arc::new(LiveSink {
            feed: Arc::clone(&feed),
            registry: Arc::clone(&registry),
        });

        Self {
            connections: ConnectionManager::new(config.connection, factory),
            feed,
            registry,
            router: Arc::new(EventRouter::new(sink, config.dedup_window)),
            attachment: Mutex::new(None),
            subject: Mutex::new(None),
        }
    }

    /// Connect, attach the router and join `subject_id`.
    ///
    /// Safe to call repeatedly; the connection and router attachment are
    /// created once.
    pub fn start(&self, subject_id: Option<&str>) -> Result<()> {
        let conn = self.connections.get_connection();
        {
            let mut attachment = self.attachment.lock();
            if attachment.is_none() {
                *attachment = Some(self.router.attach(&conn));
            }
        }

        conn.ensure_connected()?;
        conn.join(subject_id)?;

        if let Some(subject) = subject_id {
            *self.subject.lock() = Some(subject.to_string());
        }
        Ok(())
    }

    /// Logout: detach, disconnect and clear the feed.
    pub fn end(&self) {
        if let Some(attachment) = self.attachment.lock().take() {
            attachment.detach();
        }
        self.connections.teardown();
        self.feed.clear();
        if let Some(subject) = self.subject.lock().take() {
            info!(subject = %subject, "realtime session ended");
        }
    }

    /// End the current session and start a fresh one for another user.
    pub fn switch_subject(&self, subject_id: Option<&str>) -> Result<()> {
        self.end();
        self.start(subject_id)
    }

    pub fn subject(&self) -> Option<String> {
        self.subject.lock().clone()
    }

    /// The session's connection, created if needed.
    pub fn connection(&self) -> Arc<Connection> {
        self.connections.get_connection()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connections
            .current()
            .map_or(ConnectionState::Idle, |conn| conn.state())
    }

    /// Dispatch queued server events on the calling thread.
    pub fn pump(&self, timeout: Duration) -> usize {
        match self.connections.current() {
            Some(conn) => conn.pump(timeout),
            None => 0,
        }
    }

    /// Route a server event that arrived by other means.
    pub fn route(&self, event: &str, payload: &Value) -> RouteOutcome {
        self.router.route(event, payload)
    }

    // --- Update subscriptions ---

    pub fn register_update_callback<F>(&self, key: impl Into<String>, callback: F) -> Result<Registration>
    where
        F: Fn(EntityKind) + Send + Sync + 'static,
    {
        self.registry.register(key, callback)
    }

    pub fn unregister_update_callback(&self, key: &str) -> bool {
        self.registry.unregister(key)
    }

    // --- Feed ---

    pub fn notifications(&self) -> Vec<NotificationRecord> {
        self.feed.snapshot().notifications
    }

    pub fn unread_count(&self) -> usize {
        self.feed.unread_count()
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        self.feed.snapshot()
    }

    pub fn mark_as_read(&self, id: NotificationId) -> bool {
        self.feed.mark_read(id)
    }

    pub fn mark_all_as_read(&self) {
        self.feed.mark_all_read()
    }

    pub fn clear_all_notifications(&self) {
        self.feed.clear()
    }

    /// Inject a notification that did not come from the server.
    pub fn add_notification(&self, input: NotificationInput) -> NotificationRecord {
        self.feed.add(input)
    }

    pub fn set_sound_enabled(&self, enabled: bool) {
        self.feed.set_sound_enabled(enabled)
    }

    pub fn feed(&self) -> &Arc<NotificationFeed> {
        &self.feed
    }

    pub fn registry(&self) -> &Arc<UpdateRegistry> {
        &self.registry
    }
}
