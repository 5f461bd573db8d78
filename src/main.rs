//! Relay server entry point.

use anyhow::Context;
use cheesecake_relay::{server, RelaySettings};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = RelaySettings::from_env().context("Failed to load relay settings")?;
    info!(
        model = %settings.model,
        flows = %settings.flows_dir.display(),
        "Starting Cheesecake relay"
    );

    server::serve(settings).await.context("Relay server failed")?;
    Ok(())
}
