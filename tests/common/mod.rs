//! Scripted in-memory server shared by the integration tests.

#![allow(dead_code)]

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskboard_realtime::{
    ConnectionConfig, RealtimeError, Result, SessionConfig, Transport, TransportFactory,
};
use url::Url;

pub const WAIT: Duration = Duration::from_secs(2);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Fast timings so reconnect tests finish quickly.
pub fn fast_config() -> SessionConfig {
    SessionConfig {
        connection: ConnectionConfig {
            base_url: "http://localhost:5000".to_string(),
            poll_interval: Duration::from_millis(5),
            reconnect_delay: Duration::from_millis(20),
            ..Default::default()
        },
        ..Default::default()
    }
}

struct ScriptedTransport {
    incoming: Receiver<String>,
    outgoing: Sender<String>,
    connects: Arc<AtomicUsize>,
    refuse: bool,
}

impl Transport for ScriptedTransport {
    fn connect(&mut self, _endpoint: &Url, _timeout: Duration) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(RealtimeError::WebSocket("connection refused".into()));
        }
        Ok(())
    }

    fn send_text(&mut self, text: &str) -> Result<()> {
        self.outgoing
            .send(text.to_string())
            .map_err(|_| RealtimeError::ChannelClosed)
    }

    fn read_text(&mut self, timeout: Duration) -> Result<Option<String>> {
        match self.incoming.recv_timeout(timeout) {
            Ok(text) => Ok(Some(text)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(RealtimeError::NotConnected),
        }
    }

    fn close(&mut self) {}
}

/// The server side of the scripted transport.
pub struct ScriptedServer {
    to_client: Sender<String>,
    from_client: Receiver<String>,
    connects: Arc<AtomicUsize>,
}

impl ScriptedServer {
    pub fn send(&self, frame: &str) {
        self.to_client.send(frame.to_string()).unwrap();
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Wait for the client to send exactly `expected`, skipping other frames.
    pub fn expect_sent(&self, expected: &str) {
        let deadline = Instant::now() + WAIT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.from_client.recv_timeout(remaining) {
                Ok(frame) if frame == expected => return,
                Ok(_) => continue,
                Err(_) => panic!("client never sent {}", expected),
            }
        }
    }

    /// Everything the client sent within `window`.
    pub fn sent_within(&self, window: Duration) -> Vec<String> {
        let deadline = Instant::now() + window;
        let mut frames = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.from_client.recv_timeout(remaining) {
                Ok(frame) => frames.push(frame),
                Err(_) => return frames,
            }
        }
    }

    /// Engine open, namespace connect, and the server's connect ack.
    pub fn handshake(&self) {
        self.send(r#"0{"sid":"engine-1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#);
        self.expect_sent("40");
        self.send(r#"40{"sid":"socket-1"}"#);
    }
}

fn scripted_with(refuse: bool) -> (Arc<dyn TransportFactory>, ScriptedServer) {
    let (to_client, incoming) = unbounded();
    let (outgoing, from_client) = unbounded();
    let connects = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&connects);
    let factory: Arc<dyn TransportFactory> = Arc::new(move || {
        Box::new(ScriptedTransport {
            incoming: incoming.clone(),
            outgoing: outgoing.clone(),
            connects: Arc::clone(&counter),
            refuse,
        }) as Box<dyn Transport>
    });

    (
        factory,
        ScriptedServer {
            to_client,
            from_client,
            connects,
        },
    )
}

pub fn scripted() -> (Arc<dyn TransportFactory>, ScriptedServer) {
    scripted_with(false)
}

/// A server that refuses every connection.
pub fn refusing() -> (Arc<dyn TransportFactory>, ScriptedServer) {
    scripted_with(true)
}

/// Poll `condition` until it holds or the wait expires.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
