//! Relay metrics for observability.
//!
//! Uses the global OpenTelemetry meter provider, which the host application
//! may install. Without one, every instrument is a no-op.

use opentelemetry::metrics::{Counter, Gauge, Meter};
use opentelemetry::KeyValue;
use std::sync::OnceLock;

static METER: OnceLock<Meter> = OnceLock::new();

fn meter() -> &'static Meter {
    METER.get_or_init(|| opentelemetry::global::meter("rendezvous-relay"))
}

// ============================================================================
// Counters (Cumulative)
// ============================================================================

/// Counter for inbound messages handled by the router.
pub fn messages_routed() -> Counter<u64> {
    meter()
        .u64_counter("relay.messages.routed")
        .with_description("Total inbound signaling messages handled")
        .with_unit("message")
        .build()
}

/// Counter for failed sends during a membership broadcast.
pub fn broadcast_failures() -> Counter<u64> {
    meter()
        .u64_counter("relay.broadcast.failures")
        .with_description("Peer notifications that could not be queued")
        .with_unit("message")
        .build()
}

// ============================================================================
// Gauges (Current State)
// ============================================================================

/// Gauge for registered identities.
pub fn registrations_active() -> Gauge<i64> {
    meter()
        .i64_gauge("relay.registrations.active")
        .with_description("Current number of registered identities")
        .with_unit("peer")
        .build()
}

// ============================================================================
// Metric Recording Helpers
// ============================================================================

/// Record an inbound message and what the router did with it.
pub fn record_message(message_type: &str, outcome: &str) {
    messages_routed().add(
        1,
        &[
            KeyValue::new("type", message_type.to_string()),
            KeyValue::new("outcome", outcome.to_string()),
        ],
    );
}

/// Record failed sends from one broadcast.
pub fn record_broadcast_failures(count: usize) {
    if count > 0 {
        broadcast_failures().add(count as u64, &[]);
    }
}

/// Record the current number of registered identities.
pub fn record_registrations(count: usize) {
    registrations_active().record(count as i64, &[]);
}
