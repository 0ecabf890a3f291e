//! Wire protocol.
//!
//! Messages are JSON objects discriminated by a `type` field:
//!
//! ```text
//! { "type": "register", "userId": "alice" }
//! { "type": "offer" | "answer" | "candidate", "targetId": "bob", ...payload }
//! { "type": "getPeers", "userId": "alice" }
//! -- server-originated --
//! { "type": "peers", "peers": ["alice", "bob"] }
//! ```
//!
//! Only the routing fields are read. Signaling payloads are forwarded as the
//! original text, so fields the relay does not know about survive the hop.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::connection::OutboundMessage;
use crate::error::{ProtocolError, RelayError};
use crate::types::PeerId;

/// Wire names of the inbound message types.
pub mod message_type {
    /// Identity registration
    pub const REGISTER: &str = "register";
    /// Session description offer
    pub const OFFER: &str = "offer";
    /// Session description answer
    pub const ANSWER: &str = "answer";
    /// Connectivity candidate
    pub const CANDIDATE: &str = "candidate";
    /// Peer list request
    pub const GET_PEERS: &str = "getPeers";
}

/// Kind of an addressed signaling message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// Session description offer
    Offer,
    /// Session description answer
    Answer,
    /// Connectivity candidate
    Candidate,
}

impl SignalKind {
    /// Get the wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offer => message_type::OFFER,
            Self::Answer => message_type::ANSWER,
            Self::Candidate => message_type::CANDIDATE,
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// Bind an identity to the sending connection
    Register {
        /// Identity to register
        user_id: PeerId,
    },
    /// Forward the raw message to one peer
    Signal {
        /// Offer, answer or candidate
        kind: SignalKind,
        /// Addressed peer
        target_id: PeerId,
    },
    /// Reply with every registered identity except `user_id`
    GetPeers {
        /// Requesting identity, excluded from the reply
        user_id: PeerId,
    },
}

/// Routing fields of an inbound message. Everything else is ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    user_id: Option<String>,
    target_id: Option<String>,
}

impl InboundMessage {
    /// Classify a raw text frame.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| ProtocolError::malformed(e.to_string()))?;
        if !value.is_object() {
            return Err(ProtocolError::malformed("message is not a JSON object"));
        }

        let envelope: Envelope =
            serde_json::from_value(value).map_err(|e| ProtocolError::malformed(e.to_string()))?;
        let kind = envelope.kind.ok_or(ProtocolError::MissingType)?;

        match kind.as_str() {
            message_type::REGISTER => Ok(Self::Register {
                user_id: required(envelope.user_id, message_type::REGISTER, "userId")?,
            }),
            message_type::OFFER => Self::signal(SignalKind::Offer, envelope.target_id),
            message_type::ANSWER => Self::signal(SignalKind::Answer, envelope.target_id),
            message_type::CANDIDATE => Self::signal(SignalKind::Candidate, envelope.target_id),
            message_type::GET_PEERS => Ok(Self::GetPeers {
                user_id: required(envelope.user_id, message_type::GET_PEERS, "userId")?,
            }),
            _ => Err(ProtocolError::UnknownType(kind)),
        }
    }

    fn signal(kind: SignalKind, target_id: Option<String>) -> Result<Self, ProtocolError> {
        Ok(Self::Signal {
            kind,
            target_id: required(target_id, kind.as_str(), "targetId")?,
        })
    }

    /// Get the wire name of this message's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Register { .. } => message_type::REGISTER,
            Self::Signal { kind, .. } => kind.as_str(),
            Self::GetPeers { .. } => message_type::GET_PEERS,
        }
    }
}

fn required(
    field: Option<String>,
    kind: &'static str,
    name: &'static str,
) -> Result<PeerId, ProtocolError> {
    field
        .map(PeerId::from)
        .ok_or_else(|| ProtocolError::missing_field(kind, name))
}

/// Messages originated by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Current membership, possibly with the recipient excluded
    Peers {
        /// Registered identities
        peers: Vec<PeerId>,
    },
}

impl ServerMessage {
    /// Create a peers notification.
    pub fn peers(peers: Vec<PeerId>) -> Self {
        Self::Peers { peers }
    }

    /// Serialize into a frame ready for a connection's outbound queue.
    pub fn to_outbound(&self) -> Result<OutboundMessage, RelayError> {
        Ok(OutboundMessage::new(serde_json::to_string(self)?))
    }
}
