//! # rendezvous-relay
//!
//! Signaling relay core for Rendezvous.
//!
//! Clients connect over a persistent duplex channel, register an identity,
//! discover the other connected identities and exchange opaque negotiation
//! payloads (offers, answers, connectivity candidates) addressed to a single
//! peer. The relay never interprets those payloads; it routes by identity and
//! broadcasts membership changes.
//!
//! ## Architecture
//!
//! - **Connection Registry**: the single source of truth for who is reachable,
//!   mapping each identity to the live connection that registered it
//! - **Signal Router**: classifies each inbound message and forwards it,
//!   answers a peer query, or updates the registry
//! - **Connection Handle**: the transport boundary; a bounded outbound queue
//!   drained by the connection's writer task
//!
//! The transport itself (accept loop, WebSocket upgrade) lives in
//! `rendezvous-server`.

pub mod connection;
pub mod metrics;
pub mod protocol;
pub mod registry;
pub mod router;

mod error;
mod types;

pub use connection::{
    connection_channel, ConnectionHandle, ConnectionId, OutboundMessage, SendResult,
};
pub use error::{ProtocolError, RelayError};
pub use protocol::{InboundMessage, ServerMessage, SignalKind};
pub use registry::{BroadcastReport, ConnectionRegistry};
pub use router::{DropReason, RouteOutcome, SignalRouter};
pub use types::PeerId;
