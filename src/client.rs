use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tokio::sync::watch;

use crate::Result;
use crate::error::Error;
use crate::ws::config::ConnectionConfig;
use crate::ws::{ConnectionState, ConnectionSupervisor, MessageStream};

/// Reconnecting WebSocket client.
///
/// Construct one per endpoint and share it by cloning; all clones drive the
/// same connection. At most one session runs at a time: [`WebSocketClient::open`]
/// fails until the previous session has been shut down or its stream dropped.
///
/// # Examples
///
/// ```rust, no_run
/// use futures::StreamExt as _;
/// use resocket::WebSocketClient;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let client = WebSocketClient::with_url("wss://example.com/echo");
///
///     let mut stream = client.open()?;
///     client.send_message("hello");
///
///     while let Some(message) = stream.next().await {
///         match message {
///             Ok(text) => println!("{text}"),
///             // The connection is restarted after every error
///             Err(e) => eprintln!("{e}"),
///         }
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct WebSocketClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    /// Settings used by the next session
    config: RwLock<ConnectionConfig>,
    /// Owner of the live connection
    supervisor: Arc<ConnectionSupervisor>,
}

impl WebSocketClient {
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config: RwLock::new(config),
                supervisor: Arc::new(ConnectionSupervisor::new()),
            }),
        }
    }

    /// Client for `url` using [`TungsteniteTransport`](crate::ws::tungstenite::TungsteniteTransport)
    /// and default settings.
    #[cfg(feature = "tungstenite")]
    pub fn with_url<S: Into<String>>(url: S) -> Self {
        let transport = Arc::new(crate::ws::tungstenite::TungsteniteTransport::new());
        Self::new(ConnectionConfig::new(url, transport))
    }

    /// A copy of the current settings.
    #[must_use]
    pub fn config(&self) -> ConnectionConfig {
        // ConnectionConfig has no invariants spanning fields, so a poisoned lock is still usable.
        self.inner
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Change the settings used by the next session.
    ///
    /// # Errors
    ///
    /// Returns a validation error while a session is running; the settings are
    /// left untouched in that case.
    ///
    /// # Example
    ///
    /// ```
    /// use resocket::WebSocketClient;
    /// use resocket::ws::config::ConnectionConfig;
    ///
    /// let client = WebSocketClient::new(ConnectionConfig::default());
    /// client.configure(|config| {
    ///     config.set_url("wss://example.com/feed").set_timeout_seconds(180);
    /// })?;
    ///
    /// assert_eq!(client.config().timeout_seconds(), 180);
    /// # Ok::<(), resocket::error::Error>(())
    /// ```
    pub fn configure<F: FnOnce(&mut ConnectionConfig)>(&self, f: F) -> Result<()> {
        let mut config = self
            .inner
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if self.inner.supervisor.in_session() {
            return Err(Error::validation(
                "connection settings cannot change while the websocket is running",
            ));
        }
        f(&mut config);
        Ok(())
    }

    /// Start a session and return its message stream.
    ///
    /// The first connect is made once the stream is polled. Must be called
    /// from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the URL is empty or not `ws`/`wss`, no
    /// transport is configured, the timeout is zero, or a session is already
    /// running. No connect attempt is made and a running session is left alone.
    pub fn open(&self) -> Result<MessageStream> {
        // Held across open so `configure` cannot slip in between validation and start.
        let config = self
            .inner
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        self.inner.supervisor.open(&config)
    }

    /// Send a text frame on the active connection.
    ///
    /// Returns `false` when no connection is open, or when the transport refused
    /// the frame. Nothing is queued for later.
    #[must_use = "a false result means the message was not sent"]
    pub fn send_message(&self, text: &str) -> bool {
        self.inner.supervisor.send(text)
    }

    /// Serialize `value` to JSON and send it as a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be serialized. Delivery itself is
    /// reported through the boolean, as with [`WebSocketClient::send_message`].
    pub fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<bool> {
        let json = serde_json::to_string(value)?;
        Ok(self.send_message(&json))
    }

    /// Close the connection with `1000 "disconnect"` and end the session.
    ///
    /// The session's stream completes. Does nothing when no session is running.
    pub fn shut_down_socket(&self) {
        self.inner.supervisor.shut_down();
    }

    /// Same as [`WebSocketClient::shut_down_socket`].
    pub fn close(&self) {
        self.shut_down_socket();
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.supervisor.state()
    }

    /// Subscribe to connection state changes.
    ///
    /// Useful for noticing reconnects, e.g. to send a greeting again.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.supervisor.state_receiver()
    }
}
