//! Seams between the supervisor and its collaborators.
//!
//! - [`Transport`] / [`Socket`]: the WebSocket library that does the actual I/O
//! - [`Subscriber`]: application code receiving messages from a [`MessageStream`](super::MessageStream)

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use crate::error::Error;

/// Channel on which a transport reports what happens to a socket it created.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Lifecycle and data callbacks emitted by a [`Transport`] for a single socket.
#[non_exhaustive]
#[derive(Debug)]
pub enum TransportEvent {
    /// The upgrade completed and the socket can send and receive
    Open,
    /// An inbound text frame, passed through verbatim
    Message(String),
    /// The peer started the closing handshake
    Closing {
        /// Close status code
        code: u16,
        /// Close reason
        reason: String,
    },
    /// The socket is fully closed
    Closed {
        /// Close status code
        code: u16,
        /// Close reason
        reason: String,
    },
    /// Connecting, reading or writing failed. No further events follow.
    Failure(Error),
}

/// Everything a transport needs to open a socket.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// `ws://` or `wss://` endpoint
    pub url: Url,
    /// Extra headers for the upgrade request
    pub headers: HashMap<String, String>,
}

impl ConnectRequest {
    #[must_use]
    pub fn new(url: Url, headers: HashMap<String, String>) -> Self {
        Self { url, headers }
    }
}

/// Handle to one transport-level socket.
///
/// Both methods enqueue work and return immediately. `false` means the socket
/// is already closing or closed and nothing was enqueued.
pub trait Socket: Send + Sync + 'static {
    /// Enqueue a text frame.
    fn send(&self, text: &str) -> bool;

    /// Start the closing handshake with the given status code and reason.
    fn close(&self, code: u16, reason: &str) -> bool;
}

/// A WebSocket client library.
///
/// `connect` must not block: it returns the socket handle straight away and
/// reports progress through `events`, starting with either
/// [`TransportEvent::Open`] or [`TransportEvent::Failure`].
///
/// # Example
///
/// ```ignore
/// struct Loopback;
///
/// impl Transport for Loopback {
///     fn connect(&self, _request: &ConnectRequest, events: EventSender) -> Arc<dyn Socket> {
///         _ = events.send(TransportEvent::Open);
///         Arc::new(LoopbackSocket(events))
///     }
/// }
/// ```
pub trait Transport: Send + Sync + 'static {
    fn connect(&self, request: &ConnectRequest, events: EventSender) -> Arc<dyn Socket>;
}

/// Receives the items of a [`MessageStream`](super::MessageStream).
///
/// Only [`Subscriber::on_message`] is required. Errors are notifications: the
/// stream keeps reconnecting after every one of them, and
/// [`Subscriber::on_complete`] is called once the session has been closed.
#[async_trait]
pub trait Subscriber: Send + 'static {
    async fn on_message(&mut self, message: String);

    async fn on_error(&mut self, error: Error) {
        drop(error);
    }

    async fn on_complete(&mut self) {}
}
