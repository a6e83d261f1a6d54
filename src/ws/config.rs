#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Constant;
use bon::Builder;
use tokio::sync::Semaphore;
use url::Url;

use super::traits::{ConnectRequest, Transport};
use crate::Result;
use crate::error::Error;

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 60;
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(10);
pub const DEFAULT_BUFFER_CAPACITY: usize = 128;
/// Largest buffer a tokio channel can be created with.
pub const MAX_BUFFER_CAPACITY: usize = Semaphore::MAX_PERMITS;

/// Connection settings for a [`WebSocketClient`](crate::WebSocketClient).
///
/// Setters never validate. Everything is checked when the client opens a
/// session, see [`ConnectionConfig::validate`].
///
/// # Example
///
/// ```
/// use resocket::ws::config::ConnectionConfig;
///
/// let mut config = ConnectionConfig::default();
/// config
///     .set_url("wss://example.com/feed")
///     .insert_header("Authorization", "Bearer token")
///     .set_timeout_seconds(180);
///
/// assert_eq!(config.timeout_seconds(), 180);
/// ```
#[derive(Clone, Builder)]
pub struct ConnectionConfig {
    /// `ws://` or `wss://` endpoint
    #[builder(into, default)]
    url: String,
    /// Extra headers sent with the upgrade request
    #[builder(default)]
    headers: HashMap<String, String>,
    /// Silence after which the connection is presumed dead and restarted
    #[builder(default = DEFAULT_TIMEOUT_SECONDS)]
    timeout_seconds: u64,
    /// The WebSocket library used to open sockets
    transport: Option<Arc<dyn Transport>>,
    /// Pause before every reconnect. The first connect of a session is never delayed.
    #[builder(default = DEFAULT_RECONNECT_DELAY)]
    reconnect_delay: Duration,
    /// Messages held for a slow consumer before new ones are dropped
    #[builder(default = DEFAULT_BUFFER_CAPACITY)]
    buffer_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            headers: HashMap::new(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            transport: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("transport", &self.transport.as_ref().map(|_| ".."))
            .field("reconnect_delay", &self.reconnect_delay)
            .field("buffer_capacity", &self.buffer_capacity)
            .finish()
    }
}

impl ConnectionConfig {
    /// Config with the two required settings filled in.
    pub fn new<S: Into<String>>(url: S, transport: Arc<dyn Transport>) -> Self {
        Self {
            url: url.into(),
            transport: Some(transport),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_url<S: Into<String>>(&mut self, url: S) -> &mut Self {
        self.url = url.into();
        self
    }

    #[must_use]
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn set_headers(&mut self, headers: HashMap<String, String>) -> &mut Self {
        self.headers = headers;
        self
    }

    pub fn insert_header<K: Into<String>, V: Into<String>>(&mut self, name: K, value: V) -> &mut Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }

    pub fn set_timeout_seconds(&mut self, timeout_seconds: u64) -> &mut Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// The inactivity window as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    #[must_use]
    pub fn transport(&self) -> Option<&Arc<dyn Transport>> {
        self.transport.as_ref()
    }

    pub fn set_transport(&mut self, transport: Arc<dyn Transport>) -> &mut Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    pub fn set_reconnect_delay(&mut self, delay: Duration) -> &mut Self {
        self.reconnect_delay = delay;
        self
    }

    #[must_use]
    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    pub fn set_buffer_capacity(&mut self, capacity: usize) -> &mut Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Check every setting a session depends on.
    ///
    /// # Errors
    ///
    /// Returns a [`Kind::Validation`](crate::error::Kind::Validation) error when the URL
    /// is empty, unparsable or not `ws`/`wss`, when no transport is set, or when the
    /// timeout or buffer capacity is zero, or the buffer capacity exceeds
    /// [`MAX_BUFFER_CAPACITY`].
    pub fn validate(&self) -> Result<()> {
        self.prepare().map(drop)
    }

    /// Validate and produce what the supervisor needs to connect.
    pub(crate) fn prepare(&self) -> Result<(ConnectRequest, Arc<dyn Transport>)> {
        if self.url.trim().is_empty() {
            return Err(Error::validation("websocket url must not be empty"));
        }
        let Some(transport) = self.transport.clone() else {
            return Err(Error::validation("transport must not be missing"));
        };

        let url = Url::parse(&self.url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::validation(format!(
                "websocket url must use ws:// or wss://, got {}://",
                url.scheme()
            )));
        }
        if self.timeout_seconds == 0 {
            return Err(Error::validation("timeout must be at least one second"));
        }
        if self.buffer_capacity == 0 {
            return Err(Error::validation("buffer capacity must be at least one"));
        }
        if self.buffer_capacity > MAX_BUFFER_CAPACITY {
            return Err(Error::validation(format!(
                "buffer capacity must not exceed {MAX_BUFFER_CAPACITY}"
            )));
        }

        Ok((ConnectRequest::new(url, self.headers.clone()), transport))
    }

    /// Fixed pacing between reconnect attempts.
    pub(crate) fn reconnect_backoff(&self) -> Constant {
        Constant::new(self.reconnect_delay)
    }
}
