//! Message transport between the recognizer and the server.

mod websocket;

pub use websocket::WebSocketTransport;

use std::time::Duration;

use url::Url;

use crate::error::RecognitionError;

/// Something that happened on the connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One complete inbound message
    Message(Vec<u8>),
    /// The remote side closed the connection or it failed
    Closed(String),
}

/// Receives events on the transport's own thread, in arrival order
pub type EventHandler = Box<dyn Fn(TransportEvent) + Send + Sync>;

/// Where and how to connect
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub url: Url,
    /// Full `Authorization` header value
    pub authorization: Option<String>,
    pub connect_timeout: Duration,
}

/// Message-preserving connection to the server.
///
/// `send` may be called from any thread; frames go out in call order.
pub trait Transport: Send + Sync {
    fn open(&self, endpoint: &Endpoint, on_event: EventHandler) -> Result<(), RecognitionError>;

    fn send(&self, payload: Vec<u8>) -> Result<(), RecognitionError>;

    /// Close the connection. Does not emit `TransportEvent::Closed`.
    fn close(&self);

    fn is_open(&self) -> bool;
}
