mod api;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::{router, AppState};
use dash_core::agents;
use dash_core::config::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Logging Setup
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    info!("Dash Gateway Initializing...");

    // 2. Configuration (.env + environment)
    let settings = Settings::from_env().context("invalid configuration")?;

    // 3. Build the Agent (Brain + Classifier + Platform)
    let agent = agents::build(&settings).context("failed to initialize agent")?;

    // 4. Define Routes
    let app = router(AppState { agent });

    // 5. Start Server
    let listener = TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_addr))?;
    info!("Gateway listening on {}...", settings.bind_addr);

    axum::serve(listener, app).await.context("server terminated")?;
    Ok(())
}
