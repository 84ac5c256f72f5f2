mod server;

use anyhow::Result;
use tracing::info;

use strmwarp_api::MediaServerAdapter;
use strmwarp_core::{
    bootstrap::{load_config, log_summary},
    logging,
};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load and validate configuration
    let config = load_config()?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("strmwarp {} starting...", env!("CARGO_PKG_VERSION"));
    log_summary(&config);

    // 3. Build route table for the configured backend
    let adapter = MediaServerAdapter::new(&config)?;

    // 4. Serve until SIGINT/SIGTERM
    server::serve(&config.http_address(), adapter.router()).await?;

    info!("strmwarp stopped");
    Ok(())
}
