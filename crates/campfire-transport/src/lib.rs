//! Transport abstraction layer for Campfire.
//!
//! Provides the [`Bus`] trait: one connection to a topic-scoped
//! publish/subscribe message bus, owned by a single room visit. The bus is
//! assumed to give at-least-once delivery and ordered delivery per
//! publisher-topic pair, nothing more.
//!
//! # Implementations
//!
//! - [`LocalBroker`] / [`LocalBus`]: in-process broker, used by tests and
//!   the demo
//! - `WebSocketBus` (feature `websocket`, default): JSON frames over a
//!   WebSocket via `tokio-tungstenite`, with fixed-backoff reconnect

mod error;
mod local;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use local::{LocalBroker, LocalBus};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketBus, WebSocketBusConfig};

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

/// Name of a bus topic, e.g. `/topic/room/lobby`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(String);

impl Topic {
    /// Creates a topic from any string-like value.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the topic name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Connection status of a bus, observable through [`Bus::status`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BusStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// The last connection attempt failed; a retry may follow.
    Error(String),
}

impl BusStatus {
    /// Returns `true` if publishes will currently be accepted.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for BusStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

/// A message delivered on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Topic the message was published to.
    pub topic: Topic,
    /// Raw payload as published.
    pub body: Vec<u8>,
}

/// One client connection to a publish/subscribe bus.
///
/// Methods take `&self` so the owner can poll [`recv`](Bus::recv) inside a
/// `tokio::select!` while publishing from other branches. `recv` must be
/// cancel-safe: dropping the future must not lose a message.
pub trait Bus: Send + Sync + 'static {
    /// Starts delivering messages published to `topic` to this client.
    fn subscribe(
        &self,
        topic: &Topic,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Publishes `body` to every subscriber of `topic`, including this
    /// client if it is subscribed.
    fn publish(
        &self,
        topic: &Topic,
        body: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next message on any subscribed topic.
    ///
    /// Returns `Ok(None)` once the bus is closed for good.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<BusMessage>, TransportError>> + Send;

    /// Closes the connection. Pending and future `recv` calls return `None`.
    fn disconnect(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Observable connection status.
    fn status(&self) -> watch::Receiver<BusStatus>;
}

/// Lets the owner keep a handle on a bus it has handed to a session.
impl<B: Bus> Bus for Arc<B> {
    fn subscribe(
        &self,
        topic: &Topic,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        (**self).subscribe(topic)
    }

    fn publish(
        &self,
        topic: &Topic,
        body: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        (**self).publish(topic, body)
    }

    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<BusMessage>, TransportError>> + Send {
        (**self).recv()
    }

    fn disconnect(&self) -> impl Future<Output = Result<(), TransportError>> + Send {
        (**self).disconnect()
    }

    fn status(&self) -> watch::Receiver<BusStatus> {
        (**self).status()
    }
}
