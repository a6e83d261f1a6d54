#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

/// WebSocket error variants.
///
/// These are runtime failures. The supervisor reports them as non-terminal
/// items on the [`MessageStream`](super::MessageStream) and reconnects.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Error connecting to or communicating with the WebSocket server
    #[cfg(feature = "tungstenite")]
    Connection(tokio_tungstenite::tungstenite::Error),
    /// Failure reported by a custom transport
    Transport(String),
    /// WebSocket connection was closed by the peer
    ConnectionClosed {
        /// Close status code sent by the peer
        code: u16,
        /// Close reason sent by the peer
        reason: String,
    },
    /// No event arrived within the inactivity window
    Timeout {
        /// The configured inactivity window
        after: Duration,
    },
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(feature = "tungstenite")]
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
            Self::Transport(reason) => write!(f, "WebSocket transport failure: {reason}"),
            Self::ConnectionClosed { code, reason } => {
                write!(f, "WebSocket connection closed ({code}): {reason}")
            }
            Self::Timeout { after } => {
                write!(f, "WebSocket inactive for {after:?}, reconnecting")
            }
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            #[cfg(feature = "tungstenite")]
            Self::Connection(e) => Some(e),
            _ => None,
        }
    }
}

// Integration with main Error type
impl From<WsError> for crate::error::Error {
    fn from(e: WsError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, e)
    }
}

#[cfg(feature = "tungstenite")]
impl From<tokio_tungstenite::tungstenite::Error> for crate::error::Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, WsError::Connection(e))
    }
}

#[cfg(feature = "tungstenite")]
impl From<tokio_tungstenite::tungstenite::http::header::InvalidHeaderName> for crate::error::Error {
    fn from(e: tokio_tungstenite::tungstenite::http::header::InvalidHeaderName) -> Self {
        crate::error::Error::with_source(crate::error::Kind::Validation, e)
    }
}

#[cfg(feature = "tungstenite")]
impl From<tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue> for crate::error::Error {
    fn from(e: tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue) -> Self {
        crate::error::Error::with_source(crate::error::Kind::Validation, e)
    }
}
