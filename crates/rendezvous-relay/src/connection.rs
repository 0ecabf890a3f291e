//! Connection handles.
//!
//! A [`ConnectionHandle`] is the relay's view of one transport-level duplex
//! channel. It owns nothing of the transport: it is the sending half of a
//! bounded queue that the transport's writer task drains into the socket.
//! When the writer task goes away the queue closes and the handle reports
//! itself closed.

use std::fmt;

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Unique identifier of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh connection identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A text frame queued for delivery to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Frame payload, written to the socket as-is
    pub payload: String,
}

impl OutboundMessage {
    /// Create a new outbound message.
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Consume the message, returning the payload.
    pub fn into_payload(self) -> String {
        self.payload
    }
}

/// Result of attempting to queue a message on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendResult {
    /// Message was queued for delivery
    Sent,
    /// The outbound queue is full (backpressure)
    ChannelFull,
    /// The connection's writer has gone away
    ChannelClosed,
}

impl SendResult {
    /// Whether the message was queued.
    pub fn is_sent(&self) -> bool {
        matches!(self, SendResult::Sent)
    }
}

/// Handle to one live connection.
///
/// Cheap to clone; every clone feeds the same outbound queue.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: mpsc::Sender<OutboundMessage>,
}

impl ConnectionHandle {
    /// Wrap the sending half of a connection's outbound queue.
    pub fn new(sender: mpsc::Sender<OutboundMessage>) -> Self {
        Self {
            id: ConnectionId::new(),
            sender,
        }
    }

    /// The connection's identifier.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether the connection can still accept messages.
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Queue a message without waiting.
    ///
    /// Never blocks. A full queue is reported as `ChannelFull`.
    pub fn send(&self, message: OutboundMessage) -> SendResult {
        match self.sender.try_send(message) {
            Ok(()) => SendResult::Sent,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(connection = %self.id, "Outbound queue full");
                SendResult::ChannelFull
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(connection = %self.id, "Outbound queue closed");
                SendResult::ChannelClosed
            }
        }
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Create a connection handle together with the receiver its writer drains.
pub fn connection_channel(capacity: usize) -> (ConnectionHandle, mpsc::Receiver<OutboundMessage>) {
    let (tx, rx) = mpsc::channel(capacity);
    (ConnectionHandle::new(tx), rx)
}
