//! Transport seam between the connection and the network.

use crate::error::{RealtimeError, Result};
use std::io::{self, ErrorKind};
use std::net::TcpStream;
use std::time::Duration;
use tracing::debug;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{HandshakeError, Message, WebSocket};
use url::Url;

/// A persistent, bidirectional text channel.
///
/// Driven by a single I/O thread, so implementations need `Send` but not
/// `Sync`.
pub trait Transport: Send {
    /// Establish the channel, giving up once `timeout` passes without
    /// progress.
    fn connect(&mut self, endpoint: &Url, timeout: Duration) -> Result<()>;

    /// Send one text frame.
    fn send_text(&mut self, text: &str) -> Result<()>;

    /// Wait up to `timeout` for the next text frame. `Ok(None)` on timeout.
    fn read_text(&mut self, timeout: Duration) -> Result<Option<String>>;

    /// Close the channel. Must be safe to call when not connected.
    fn close(&mut self);
}

/// Creates a fresh transport for every connection attempt.
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> Box<dyn Transport>;
}

impl<F> TransportFactory for F
where
    F: Fn() -> Box<dyn Transport> + Send + Sync,
{
    fn create(&self) -> Box<dyn Transport> {
        self()
    }
}

/// Factory for [`WebSocketTransport`].
#[derive(Clone, Copy, Debug, Default)]
pub struct WebSocketFactory;

impl TransportFactory for WebSocketFactory {
    fn create(&self) -> Box<dyn Transport> {
        Box::new(WebSocketTransport::new())
    }
}

/// Blocking WebSocket transport over `tungstenite`.
///
/// `wss` endpoints are served through rustls with the webpki root store.
#[derive(Default)]
pub struct WebSocketTransport {
    socket: Option<WebSocket<MaybeTlsStream<TcpStream>>>,
    /// Handle to the same OS socket, so timeouts apply under TLS too.
    tcp: Option<TcpStream>,
    read_timeout: Option<Duration>,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn socket(&mut self) -> Result<&mut WebSocket<MaybeTlsStream<TcpStream>>> {
        self.socket.as_mut().ok_or(RealtimeError::NotConnected)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        if self.read_timeout == Some(timeout) {
            return Ok(());
        }
        let tcp = self.tcp.as_ref().ok_or(RealtimeError::NotConnected)?;
        // A zero duration means "block forever" to the OS.
        tcp.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
        self.read_timeout = Some(timeout);
        Ok(())
    }
}

/// Open a TCP stream to the endpoint's host, trying each resolved address.
fn open_stream(endpoint: &Url, timeout: Duration) -> Result<TcpStream> {
    let addrs = endpoint.socket_addrs(|| None)?;
    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%addr, error = %e, "tcp connect failed");
                last_error = Some(e);
            }
        }
    }
    Err(last_error
        .unwrap_or_else(|| io::Error::new(ErrorKind::NotFound, "endpoint resolved to no address"))
        .into())
}

impl Transport for WebSocketTransport {
    fn connect(&mut self, endpoint: &Url, timeout: Duration) -> Result<()> {
        let timeout = timeout.max(Duration::from_millis(1));
        let stream = open_stream(endpoint, timeout)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;
        let tcp = stream.try_clone()?;

        let socket = match tungstenite::client_tls(endpoint.as_str(), stream) {
            Ok((socket, _response)) => socket,
            Err(HandshakeError::Interrupted(_)) => {
                return Err(RealtimeError::Io(io::Error::new(
                    ErrorKind::TimedOut,
                    "websocket handshake timed out",
                )))
            }
            Err(HandshakeError::Failure(e)) => return Err(e.into()),
        };

        self.socket = Some(socket);
        self.tcp = Some(tcp);
        self.read_timeout = Some(timeout);
        Ok(())
    }

    fn send_text(&mut self, text: &str) -> Result<()> {
        self.socket()?.send(Message::Text(text.to_string()))?;
        Ok(())
    }

    fn read_text(&mut self, timeout: Duration) -> Result<Option<String>> {
        self.set_read_timeout(timeout)?;
        loop {
            match self.socket()?.read() {
                Ok(Message::Text(text)) => return Ok(Some(text)),
                Ok(Message::Close(_)) => return Err(RealtimeError::NotConnected),
                // Ping/pong frames are answered by tungstenite itself.
                Ok(_) => continue,
                Err(tungstenite::Error::Io(e))
                    if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    return Ok(None)
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close(None);
            let _ = socket.flush();
        }
        self.tcp = None;
        self.read_timeout = None;
    }
}
