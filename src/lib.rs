#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod client;
pub mod error;
pub mod ws;

pub use client::WebSocketClient;
pub use ws::config::ConnectionConfig;
pub use ws::{
    ConnectionState, MessageStream, Subscriber, Subscription, Transport, TransportEvent,
};

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;
