//! Connection to the realtime event channel.
//!
//! A [`ConnectionManager`] lazily creates one [`Connection`] per session and
//! hands the same instance to every caller. The connection speaks Socket.IO
//! over a WebSocket on its own I/O thread, reconnecting a bounded number of
//! times, and queues decoded server events until the owner pumps them:
//!
//! ```ignore
//! let manager = ConnectionManager::websocket(ConnectionConfig::from_env());
//! let conn = manager.get_connection();
//! conn.ensure_connected()?;
//! conn.join(Some("user-42"))?;
//!
//! conn.on("taskUpdated", |payload| println!("{}", payload));
//! loop {
//!     conn.pump(Duration::from_millis(100));
//! }
//! ```

mod config;
mod manager;
mod transport;
pub mod wire;

pub use config::{ConnectionConfig, ENDPOINT_ENV_VAR};
pub use manager::{
    Connection, ConnectionManager, ConnectionState, EventHandler, HandlerId, InboundEvent,
};
pub use transport::{Transport, TransportFactory, WebSocketFactory, WebSocketTransport};
