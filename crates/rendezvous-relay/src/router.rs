//! Signaling message routing.
//!
//! The `SignalRouter` is driven by each inbound frame and by each connection
//! close. It holds no state of its own; the [`ConnectionRegistry`] is the only
//! thing it reads or mutates.
//!
//! # Routing Logic
//!
//! | type                           | action                                         |
//! |--------------------------------|------------------------------------------------|
//! | `register`                     | bind identity, broadcast peers to everyone     |
//! | `offer`, `answer`, `candidate` | forward the raw frame to `targetId` if open    |
//! | `getPeers`                     | reply with every identity except `userId`      |
//! | anything else                  | drop and log                                   |
//!
//! Delivery is best-effort. Nothing is ever sent back to a client to report
//! a drop.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::connection::{ConnectionHandle, OutboundMessage, SendResult};
use crate::metrics;
use crate::protocol::{InboundMessage, ServerMessage, SignalKind};
use crate::registry::{BroadcastReport, ConnectionRegistry};
use crate::types::PeerId;

/// Why an inbound message produced no delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Body could not be classified
    Malformed,
    /// `type` is not handled by the relay
    UnknownType,
    /// No connection is registered under the addressed identity
    TargetNotFound,
    /// The addressed connection has closed
    TargetClosed,
    /// The recipient's queue rejected the message
    SendFailed,
}

impl DropReason {
    /// Short label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::UnknownType => "unknown_type",
            Self::TargetNotFound => "target_not_found",
            Self::TargetClosed => "target_closed",
            Self::SendFailed => "send_failed",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the router did with one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Identity was bound and membership broadcast
    Registered {
        /// Registered identity
        peer: PeerId,
        /// Result of the membership broadcast
        broadcast: BroadcastReport,
    },
    /// Raw frame was queued on the target connection
    Forwarded {
        /// Recipient identity
        target: PeerId,
    },
    /// Peer list was queued on the requesting connection
    PeersSent {
        /// Number of identities in the list
        count: usize,
    },
    /// Nothing was delivered
    Dropped(DropReason),
}

impl RouteOutcome {
    /// Short label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Registered { .. } => "registered",
            Self::Forwarded { .. } => "forwarded",
            Self::PeersSent { .. } => "peers_sent",
            Self::Dropped(reason) => reason.as_str(),
        }
    }
}

/// Routes inbound signaling messages between registered connections.
#[derive(Debug, Clone)]
pub struct SignalRouter {
    registry: Arc<ConnectionRegistry>,
}

impl SignalRouter {
    /// Create a router over a shared registry.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this router resolves identities against.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Handle one raw frame received on `connection`.
    #[instrument(skip(self, connection, raw), fields(connection = %connection.id()))]
    pub async fn handle_message(&self, connection: &ConnectionHandle, raw: &str) -> RouteOutcome {
        let message = match InboundMessage::parse(raw) {
            Ok(message) => message,
            Err(e) if e.is_malformed() => {
                warn!(error = %e, len = raw.len(), "Dropping malformed message");
                metrics::record_message("invalid", DropReason::Malformed.as_str());
                return RouteOutcome::Dropped(DropReason::Malformed);
            }
            Err(e) => {
                info!(error = %e, "Dropping message of unknown type");
                metrics::record_message("invalid", DropReason::UnknownType.as_str());
                return RouteOutcome::Dropped(DropReason::UnknownType);
            }
        };

        let message_type = message.type_name();
        let outcome = match message {
            InboundMessage::Register { user_id } => {
                let broadcast = self
                    .registry
                    .register(user_id.clone(), connection.clone())
                    .await;
                info!(peer = %user_id, "User registered");
                RouteOutcome::Registered {
                    peer: user_id,
                    broadcast,
                }
            }
            InboundMessage::Signal { kind, target_id } => self.forward(kind, target_id, raw).await,
            InboundMessage::GetPeers { user_id } => self.send_peers(connection, &user_id).await,
        };

        metrics::record_message(message_type, outcome.label());
        outcome
    }

    /// Handle the close or error of `connection`.
    ///
    /// Removes the identity it held, if any, and broadcasts the new
    /// membership. Safe to call more than once and for connections that never
    /// registered.
    #[instrument(skip(self, connection), fields(connection = %connection.id()))]
    pub async fn handle_disconnect(&self, connection: &ConnectionHandle) -> Option<PeerId> {
        match self.registry.remove(connection.id()).await {
            Some((peer, broadcast)) => {
                info!(
                    peer = %peer,
                    notified = broadcast.delivered,
                    "User disconnected"
                );
                Some(peer)
            }
            None => {
                debug!("Connection closed without a registered identity");
                None
            }
        }
    }

    /// Forward the unmodified frame to the addressed peer.
    async fn forward(&self, kind: SignalKind, target: PeerId, raw: &str) -> RouteOutcome {
        let Some(handle) = self.registry.lookup(target.as_str()).await else {
            debug!(kind = %kind, target = %target, "Target not registered, dropping");
            return RouteOutcome::Dropped(DropReason::TargetNotFound);
        };

        if !handle.is_open() {
            debug!(kind = %kind, target = %target, "Target connection closed, dropping");
            return RouteOutcome::Dropped(DropReason::TargetClosed);
        }

        match handle.send(OutboundMessage::new(raw)) {
            SendResult::Sent => {
                debug!(kind = %kind, target = %target, "Forwarded signaling message");
                RouteOutcome::Forwarded { target }
            }
            SendResult::ChannelClosed => {
                debug!(kind = %kind, target = %target, "Target closed during send, dropping");
                RouteOutcome::Dropped(DropReason::TargetClosed)
            }
            SendResult::ChannelFull => {
                warn!(kind = %kind, target = %target, "Target queue full, dropping");
                RouteOutcome::Dropped(DropReason::SendFailed)
            }
        }
    }

    /// Reply to the requester with everyone but itself.
    async fn send_peers(&self, connection: &ConnectionHandle, requester: &PeerId) -> RouteOutcome {
        let peers = self.registry.snapshot(Some(requester.as_str())).await;
        let count = peers.len();

        let message = match ServerMessage::peers(peers).to_outbound() {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Failed to encode peers notification");
                return RouteOutcome::Dropped(DropReason::SendFailed);
            }
        };

        match connection.send(message) {
            SendResult::Sent => {
                debug!(requester = %requester, count, "Sent peer list");
                RouteOutcome::PeersSent { count }
            }
            result => {
                warn!(requester = %requester, result = ?result, "Failed to send peer list");
                RouteOutcome::Dropped(DropReason::SendFailed)
            }
        }
    }
}
