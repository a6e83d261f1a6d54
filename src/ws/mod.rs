//! Core WebSocket infrastructure.
//!
//! This module keeps one WebSocket connection alive on behalf of a
//! [`WebSocketClient`](crate::WebSocketClient), reconnecting whenever it fails
//! or goes quiet for longer than the configured timeout.
//!
//! # Architecture
//!
//! - [`ConnectionSupervisor`]: connect / reconnect / close state machine owning the live socket
//! - [`MessageStream`]: drop-on-overflow stream of inbound text messages
//! - [`Transport`] / [`Socket`]: the WebSocket library doing the I/O
//! - [`Subscriber`]: callback-style consumer of a [`MessageStream`]
//!
//! # Example
//!
//! ```ignore
//! let mut config = ConnectionConfig::default();
//! config.set_url("wss://example.com/feed").set_transport(Arc::new(TungsteniteTransport::new()));
//!
//! let supervisor = Arc::new(ConnectionSupervisor::new());
//! let subscription = supervisor.open(&config)?.subscribe(MySubscriber);
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod state;
pub mod stream;
pub mod traits;
#[cfg(feature = "tungstenite")]
pub mod tungstenite;

pub use connection::ConnectionSupervisor;
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use state::ConnectionState;
pub use stream::{MessageStream, Subscription};
pub use traits::*;
