use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use agora_server::{AppState, MarketConfig, router, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let data_dir = std::env::var("AGORA_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".agora"));
    let config = MarketConfig::load(&data_dir)?;
    telemetry::init_tracing(&config.telemetry)?;

    if !MarketConfig::config_path(&data_dir).exists() {
        config.save(&data_dir)?;
        info!(path = %MarketConfig::config_path(&data_dir).display(), "wrote default config");
    }

    let state = AppState::new(&config).context("Failed to wire market modules")?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, governance = %config.governance(), "agora listening");
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
