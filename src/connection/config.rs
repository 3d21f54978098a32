//! Connection configuration.

use crate::error::{RealtimeError, Result};
use std::time::Duration;
use url::Url;

/// Environment variable holding the base endpoint of the socket server.
pub const ENDPOINT_ENV_VAR: &str = "TASKBOARD_SOCKET_URL";

/// Configuration for the realtime connection.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Base endpoint, e.g. `http://localhost:5000`.
    pub base_url: String,

    /// Socket.IO mount path.
    /// Default: "/socket.io/"
    pub path: String,

    /// Whether to reconnect automatically after a drop.
    pub reconnect: bool,

    /// Consecutive failed attempts tolerated before giving up.
    /// Default: 5
    pub max_reconnect_attempts: u32,

    /// Fixed delay between attempts.
    /// Default: 1000ms
    pub reconnect_delay: Duration,

    /// Upper bound on the TCP connect and on each read or write of the
    /// upgrade handshake. A stalled server counts as a failed attempt.
    /// Default: 5s
    pub connect_timeout: Duration,

    /// How long the I/O thread blocks on a read before servicing outbound
    /// frames and shutdown requests.
    pub poll_interval: Duration,

    /// Max decoded events queued for dispatch before new ones are dropped.
    pub inbound_buffer: usize,

    /// Event name of the session join signal.
    pub join_event: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            path: "/socket.io/".to_string(),
            reconnect: true,
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_millis(1000),
            connect_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(50),
            inbound_buffer: 1024,
            join_event: "join".to_string(),
        }
    }
}

impl ConnectionConfig {
    /// Config pointing at the given base endpoint, defaults otherwise.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Read the base endpoint from [`ENDPOINT_ENV_VAR`], falling back to the default.
    pub fn from_env() -> Self {
        match std::env::var(ENDPOINT_ENV_VAR) {
            Ok(url) if !url.trim().is_empty() => Self::with_base_url(url.trim()),
            _ => Self::default(),
        }
    }

    /// WebSocket URL for the socket server. Long-polling is never used.
    pub fn endpoint_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(RealtimeError::InvalidEndpoint(format!(
                    "unsupported scheme: {}",
                    other
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| RealtimeError::InvalidEndpoint(self.base_url.clone()))?;

        url.set_path(&self.path);
        url.query_pairs_mut()
            .clear()
            .append_pair("EIO", "4")
            .append_pair("transport", "websocket");

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reconnect_policy() {
        let config = ConnectionConfig::default();
        assert!(config.reconnect);
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.reconnect_delay, Duration::from_millis(1000));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_endpoint_url_http() {
        let config = ConnectionConfig::with_base_url("http://api.example.com:5000");
        let url = config.endpoint_url().unwrap();
        assert_eq!(
            url.as_str(),
            "ws://api.example.com:5000/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn test_endpoint_url_https() {
        let config = ConnectionConfig::with_base_url("https://api.example.com");
        let url = config.endpoint_url().unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.port_or_known_default(), Some(443));
    }

    #[test]
    fn test_endpoint_url_rejects_garbage() {
        let config = ConnectionConfig::with_base_url("not a url");
        assert!(matches!(
            config.endpoint_url(),
            Err(RealtimeError::InvalidEndpoint(_))
        ));

        let config = ConnectionConfig::with_base_url("ftp://files.example.com");
        assert!(matches!(
            config.endpoint_url(),
            Err(RealtimeError::InvalidEndpoint(_))
        ));
    }
}
