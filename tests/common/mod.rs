#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    unused,
    reason = "Not every test file uses every helper"
)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt as _;
use resocket::error::Error;
use resocket::ws::WsError;
use resocket::ws::traits::{ConnectRequest, EventSender, Socket, Transport, TransportEvent};
use resocket::{ConnectionConfig, MessageStream, WebSocketClient};
use tokio::sync::mpsc;

/// Socket that records everything done to it.
#[derive(Debug, Default)]
pub struct MockSocket {
    sent: Mutex<Vec<String>>,
    closes: Mutex<Vec<(u16, String)>>,
}

impl MockSocket {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn closes(&self) -> Vec<(u16, String)> {
        self.closes.lock().unwrap().clone()
    }
}

impl Socket for MockSocket {
    fn send(&self, text: &str) -> bool {
        self.sent.lock().unwrap().push(text.to_owned());
        true
    }

    fn close(&self, code: u16, reason: &str) -> bool {
        self.closes.lock().unwrap().push((code, reason.to_owned()));
        true
    }
}

/// One `connect` call seen by [`MockTransport`]. The test plays the server through `events`.
pub struct Connection {
    pub request: ConnectRequest,
    pub events: EventSender,
    pub socket: Arc<MockSocket>,
}

impl Connection {
    pub fn open(&self) {
        self.events.send(TransportEvent::Open).unwrap();
    }

    pub fn message(&self, text: &str) {
        self.events
            .send(TransportEvent::Message(text.to_owned()))
            .unwrap();
    }

    pub fn fail(&self, reason: &str) {
        let error: Error = WsError::Transport(reason.to_owned()).into();
        self.events.send(TransportEvent::Failure(error)).unwrap();
    }
}

/// Scripted transport: every connect is handed to the test instead of a network.
pub struct MockTransport {
    connections: mpsc::UnboundedSender<Connection>,
    connects: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Connection>) {
        let (connections, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            connections,
            connects: AtomicUsize::new(0),
        });
        (transport, rx)
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn connect(&self, request: &ConnectRequest, events: EventSender) -> Arc<dyn Socket> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let socket = Arc::new(MockSocket::default());
        _ = self.connections.send(Connection {
            request: request.clone(),
            events,
            socket: Arc::clone(&socket),
        });
        socket
    }
}

/// Client wired to a fresh [`MockTransport`], reconnecting without delay.
pub fn mock_client(
    url: &str,
    timeout_seconds: u64,
) -> (
    WebSocketClient,
    Arc<MockTransport>,
    mpsc::UnboundedReceiver<Connection>,
) {
    let (transport, connections) = MockTransport::new();
    let mut config = ConnectionConfig::new(url, Arc::clone(&transport) as Arc<dyn Transport>);
    config
        .set_timeout_seconds(timeout_seconds)
        .set_reconnect_delay(Duration::ZERO);

    (WebSocketClient::new(config), transport, connections)
}

/// Poll `stream` once so its session starts connecting.
pub async fn start(stream: &mut MessageStream) {
    assert!(
        futures_util::poll!(stream.next()).is_pending(),
        "nothing should be buffered before the first connect"
    );
}
