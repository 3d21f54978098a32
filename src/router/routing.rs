//! Translates server events into feed entries and update broadcasts.

use crate::connection::{Connection, HandlerId};
use crate::feed::NotificationFeed;
use crate::subscriptions::UpdateRegistry;
use crate::types::{EntityKind, NotificationInput};
use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

use super::table::{lookup, EVENT_TABLE};

/// Where routed events go.
pub trait EventSink: Send + Sync {
    /// A recognized event that belongs in the feed.
    fn on_notification(&self, input: NotificationInput);

    /// Entity data of `kind` changed on the server.
    fn on_broadcast(&self, kind: EntityKind);
}

/// Sink feeding the notification feed and the update registry.
pub struct LiveSink {
    pub feed: Arc<NotificationFeed>,
    pub registry: Arc<UpdateRegistry>,
}

impl EventSink for LiveSink {
    fn on_notification(&self, input: NotificationInput) {
        self.feed.add(input);
    }

    fn on_broadcast(&self, kind: EntityKind) {
        self.registry.broadcast(kind);
    }
}

/// What happened to one incoming event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Not a recognized event name.
    Ignored,
    /// Same `eventId` seen recently; dropped.
    Duplicate,
    /// Broadcast only, no feed entry.
    Broadcast(EntityKind),
    /// Added to the feed, then broadcast.
    Notified(EntityKind),
}

/// Classifies server events and fans them out to a sink.
pub struct EventRouter {
    sink: Arc<dyn EventSink>,
    /// Recently seen event ids; `None` when deduplication is off.
    seen: Option<Mutex<LruCache<String, ()>>>,
}

impl EventRouter {
    /// Create a router remembering the last `dedup_window` event ids.
    /// A window of 0 disables deduplication.
    pub fn new(sink: Arc<dyn EventSink>, dedup_window: usize) -> Self {
        Self {
            sink,
            seen: NonZeroUsize::new(dedup_window).map(|n| Mutex::new(LruCache::new(n))),
        }
    }

    /// Route one server event.
    ///
    /// The feed entry is always produced before the broadcast.
    pub fn route(&self, event: &str, payload: &Value) -> RouteOutcome {
        let Some(spec) = lookup(event) else {
            trace!(event = %event, "ignoring unrecognized event");
            return RouteOutcome::Ignored;
        };

        if self.is_redelivery(event, payload) {
            debug!(event = %event, "dropping redelivered event");
            return RouteOutcome::Duplicate;
        }

        let outcome = match spec.title {
            Some(title) => {
                let message = extract_message(event, payload);
                self.sink
                    .on_notification(NotificationInput::new(spec.kind, title, message, spec.icon));
                RouteOutcome::Notified(spec.kind)
            }
            None => RouteOutcome::Broadcast(spec.kind),
        };

        self.sink.on_broadcast(spec.kind);
        outcome
    }

    /// Register handlers for every recognized event on `connection`.
    ///
    /// The returned [`Attachment`] removes exactly these handlers when
    /// detached or dropped.
    pub fn attach(self: &Arc<Self>, connection: &Arc<Connection>) -> Attachment {
        let handlers = EVENT_TABLE
            .iter()
            .map(|spec| {
                let router = Arc::clone(self);
                let name = spec.name;
                let id = connection.on(name, move |payload: &Value| {
                    router.route(name, payload);
                });
                (name, id)
            })
            .collect();

        debug!("event router attached");
        Attachment {
            connection: Arc::downgrade(connection),
            handlers,
        }
    }

    fn is_redelivery(&self, event: &str, payload: &Value) -> bool {
        let Some(seen) = &self.seen else {
            return false;
        };
        let Some(event_id) = event_id(payload) else {
            return false;
        };

        let key = format!("{}:{}", event, event_id);
        seen.lock().put(key, ()).is_some()
    }
}

/// Handlers installed by one [`EventRouter::attach`] call.
pub struct Attachment {
    connection: Weak<Connection>,
    handlers: Vec<(&'static str, HandlerId)>,
}

impl Attachment {
    /// Remove the handlers from the connection.
    pub fn detach(mut self) {
        self.release();
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    fn release(&mut self) {
        let handlers = std::mem::take(&mut self.handlers);
        if let Some(connection) = self.connection.upgrade() {
            for (name, id) in handlers {
                connection.off(name, id);
            }
            debug!("event router detached");
        }
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        if !self.handlers.is_empty() {
            self.release();
        }
    }
}

fn extract_message(event: &str, payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("message") {
            Some(Value::String(s)) => s.clone(),
            Some(other) if !other.is_null() => other.to_string(),
            _ => {
                warn!(event = %event, "event payload has no message");
                String::new()
            }
        },
        _ => {
            warn!(event = %event, "event payload has no message");
            String::new()
        }
    }
}

fn event_id(payload: &Value) -> Option<String> {
    match payload.get("eventId")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
