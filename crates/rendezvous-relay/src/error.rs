//! Error types for the signaling relay.
//!
//! None of these are ever reported back to a client.

use thiserror::Error;

/// Relay errors.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Outbound message could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while classifying an inbound message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Body is not a JSON object
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// Object has no string `type` field
    #[error("Message has no type")]
    MissingType,

    /// `type` is not one the relay understands
    #[error("Unknown message type: {0}")]
    UnknownType(String),

    /// A field required by the message type is absent
    #[error("Message of type {kind} is missing field {field}")]
    MissingField {
        /// Message type
        kind: &'static str,
        /// Wire name of the missing field
        field: &'static str,
    },
}

impl ProtocolError {
    /// Create a new malformed message error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Create a new missing field error.
    pub fn missing_field(kind: &'static str, field: &'static str) -> Self {
        Self::MissingField { kind, field }
    }

    /// Whether the message was structurally unreadable, as opposed to
    /// readable but of a type the relay does not handle.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, Self::UnknownType(_))
    }
}
