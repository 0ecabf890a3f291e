//! Connection Registry for identity-addressed routing.
//!
//! Tracks which live connection currently answers to each client identity,
//! and keeps every registered client's peer list current by broadcasting a
//! membership snapshot whenever the set of identities changes.
//!
//! ## Architecture
//!
//! ```text
//! WebSocket task (alice) <-> ConnectionRegistry <-> WebSocket task (bob)
//!          |                         |                        |
//!          v                         v                        v
//!    mpsc::Sender            RwLock<{ PeerId -> handle,   mpsc::Sender
//!                                     ConnectionId -> PeerId }>
//! ```

mod connection_registry;

pub use connection_registry::{BroadcastReport, ConnectionRegistry};
