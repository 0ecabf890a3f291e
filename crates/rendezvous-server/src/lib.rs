//! # rendezvous-server
//!
//! WebSocket transport for the Rendezvous signaling relay. Accepts
//! connections, upgrades them to WebSocket and feeds every frame and close
//! event into a [`rendezvous_relay::SignalRouter`].

pub mod config;
pub mod server;
pub mod telemetry;
