//! Connection Registry implementation.
//!
//! Maps client identities to live connections, with a reverse index from
//! connection to identity so close handling can find what to remove.

use std::collections::HashMap;
use std::fmt;

use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::connection::{ConnectionHandle, ConnectionId, SendResult};
use crate::metrics;
use crate::protocol::ServerMessage;
use crate::types::PeerId;

/// Outcome of one membership broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections the notification was queued on
    pub delivered: usize,
    /// Open connections whose queue rejected the notification
    pub failed: usize,
    /// Registered connections that were already closed
    pub skipped: usize,
}

/// Primary map and reverse index, always mutated together.
#[derive(Default)]
struct RegistryState {
    /// Identity to the connection that registered it last
    peers: HashMap<PeerId, ConnectionHandle>,
    /// Connection to the identity it currently holds
    identities: HashMap<ConnectionId, PeerId>,
}

impl RegistryState {
    fn snapshot(&self, excluding: Option<&str>) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self
            .peers
            .keys()
            .filter(|peer| Some(peer.as_str()) != excluding)
            .cloned()
            .collect();
        peers.sort();
        peers
    }

    /// Queue the full membership on every open connection.
    ///
    /// Called with the write lock held, so every connection receives
    /// notifications in mutation order.
    fn broadcast_peers(&self) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        let message = match ServerMessage::peers(self.snapshot(None)).to_outbound() {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Failed to encode peers notification");
                return report;
            }
        };

        for (peer, handle) in &self.peers {
            if !handle.is_open() {
                debug!(peer = %peer, "Skipping closed connection");
                report.skipped += 1;
                continue;
            }

            match handle.send(message.clone()) {
                SendResult::Sent => report.delivered += 1,
                result => {
                    warn!(peer = %peer, result = ?result, "Failed to queue peers notification");
                    report.failed += 1;
                }
            }
        }

        metrics::record_broadcast_failures(report.failed);
        report
    }
}

/// Registry of live, identified connections.
///
/// Mutations (`register`, `remove`) and the snapshot each of them broadcasts
/// happen under one write lock. Lookups and snapshots for single requesters
/// share a read lock.
///
/// ## Usage
///
/// ```ignore
/// let registry = ConnectionRegistry::new();
///
/// // When a client registers:
/// let (handle, rx) = connection_channel(64);
/// registry.register(PeerId::from("alice"), handle.clone()).await;
///
/// // When routing a message:
/// if let Some(target) = registry.lookup("bob").await {
///     target.send(OutboundMessage::new(raw));
/// }
///
/// // When the connection closes:
/// registry.remove(handle.id()).await;
/// ```
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
}

impl ConnectionRegistry {
    /// Create a new, empty connection registry.
    pub fn new() -> Self {
        info!("Creating connection registry");
        Self {
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Bind `peer` to `handle` and broadcast the new membership.
    ///
    /// An existing binding for `peer` is replaced; the older connection stays
    /// open but is no longer reachable through the registry. If `handle` was
    /// already registered under another identity, that identity is released.
    /// A connection holds at most one identity, so nothing it leaves behind
    /// can outlive its disconnect.
    #[instrument(skip(self, handle), fields(peer = %peer, connection = %handle.id()))]
    pub async fn register(&self, peer: PeerId, handle: ConnectionHandle) -> BroadcastReport {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let connection = handle.id();

        if let Some(previous) = state.identities.remove(&connection) {
            if previous != peer {
                state.peers.remove(&previous);
                debug!(previous = %previous, "Released previous identity of connection");
            }
        }

        match state.peers.insert(peer.clone(), handle) {
            Some(replaced) if replaced.id() != connection => {
                state.identities.remove(&replaced.id());
                debug!(evicted = %replaced.id(), "Replaced existing registration");
            }
            Some(_) => debug!("Connection re-registered same identity"),
            None => debug!("Registered new peer"),
        }
        state.identities.insert(connection, peer);

        info!(peers = state.peers.len(), "Peer registered");
        metrics::record_registrations(state.peers.len());

        state.broadcast_peers()
    }

    /// Remove whatever identity `connection` holds and broadcast the new
    /// membership.
    ///
    /// Returns `None` without broadcasting if the connection never registered,
    /// was already removed, or lost its identity to a newer registration.
    #[instrument(skip(self), fields(connection = %connection))]
    pub async fn remove(&self, connection: ConnectionId) -> Option<(PeerId, BroadcastReport)> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let Some(peer) = state.identities.remove(&connection) else {
            debug!("Connection held no identity");
            return None;
        };
        state.peers.remove(&peer);

        info!(peer = %peer, peers = state.peers.len(), "Peer unregistered");
        metrics::record_registrations(state.peers.len());

        let report = state.broadcast_peers();
        Some((peer, report))
    }

    /// Get the connection currently registered under `peer`.
    pub async fn lookup(&self, peer: &str) -> Option<ConnectionHandle> {
        self.state.read().await.peers.get(peer).cloned()
    }

    /// List registered identities in ascending order, optionally leaving one out.
    pub async fn snapshot(&self, excluding: Option<&str>) -> Vec<PeerId> {
        self.state.read().await.snapshot(excluding)
    }

    /// Get the identity a connection currently holds.
    pub async fn identity_of(&self, connection: ConnectionId) -> Option<PeerId> {
        self.state.read().await.identities.get(&connection).cloned()
    }

    /// Check if an identity is currently registered.
    pub async fn is_registered(&self, peer: &str) -> bool {
        self.state.read().await.peers.contains_key(peer)
    }

    /// Get the number of registered identities.
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.peers.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("ConnectionRegistry");
        match self.state.try_read() {
            Ok(state) => debug.field("connection_count", &state.peers.len()),
            Err(_) => debug.field("connection_count", &"<locked>"),
        };
        debug.finish()
    }
}
