//! # Taskboard Realtime
//!
//! Live notifications and cross-component cache invalidation for the
//! taskboard client.
//!
//! ## Core Concepts
//!
//! - **Connection**: one Socket.IO-over-WebSocket channel per session, with
//!   bounded automatic reconnects
//! - **Router**: maps server events (`taskAssigned`, `teamUpdated`, ...) to
//!   feed entries and update broadcasts
//! - **Feed**: bounded, most-recent-first notification list with unread count
//! - **Subscriptions**: keyed callbacks told which kind of entity changed
//!
//! ## Example
//!
//! ```ignore
//! use taskboard_realtime::{EntityKind, RealtimeSession, SessionConfig};
//!
//! let session = RealtimeSession::new(SessionConfig::from_env());
//! session.start(Some("user-42"))?;
//!
//! session.register_update_callback("task-list", |kind| {
//!     if kind == EntityKind::Task {
//!         // refetch tasks
//!     }
//! })?;
//!
//! // On the UI loop:
//! session.pump(Duration::from_millis(16));
//! let snapshot = session.snapshot();
//! println!("{} unread", snapshot.unread_count);
//! ```

pub mod connection;
pub mod error;
pub mod feed;
pub mod router;
pub mod session;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use connection::{
    Connection, ConnectionConfig, ConnectionManager, ConnectionState, HandlerId, Transport,
    TransportFactory, WebSocketFactory, WebSocketTransport,
};
pub use error::{RealtimeError, Result};
pub use feed::{FeedConfig, FeedSnapshot, NotificationFeed, Silent, SoundCue, TerminalBell};
pub use router::{Attachment, EventRouter, EventSink, LiveSink, RouteOutcome};
pub use session::{RealtimeSession, SessionConfig};
pub use subscriptions::{BroadcastReport, DuplicatePolicy, Registration, UpdateRegistry};
pub use types::*;
