use anyhow::Result;
use tracing::info;

use rendezvous_server::config::{LogFormat, ServerConfig};
use rendezvous_server::{server, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init(LogFormat::from_env())?;

    info!("Rendezvous signaling relay starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::from_env()?;
    config.log_config();

    server::start(config).await?;

    Ok(())
}
