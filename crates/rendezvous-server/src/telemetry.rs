//! Logging setup for the relay server.
//!
//! Environment variables:
//! - `RUST_LOG`: Log filter (default: `info,rendezvous_server=debug,rendezvous_relay=debug`)
//! - `RENDEZVOUS_LOG_FORMAT`: `pretty` or `json` (default: `pretty`)

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;

const DEFAULT_FILTER: &str = "info,rendezvous_server=debug,rendezvous_relay=debug";

/// Install the global tracing subscriber.
///
/// Can only succeed once per process.
pub fn init(format: LogFormat) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init(),
    }
    .context("Failed to install tracing subscriber")?;

    tracing::info!(format = %format, "Telemetry initialized");

    Ok(())
}
