//! Process entry point: wires the Config, Session Store, Provider Router,
//! Agent Loop, Consensus Engine and Client Registry into one `axum::Router`
//! and serves the HTTP/SSE/WS surface of spec §6.

use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use zen_claw_core::GatewayError;
use zen_claw_service::config::{Args, GatewayConfig};
use zen_claw_service::state::AppState;
use zen_claw_service::build_router;

#[tokio::main]
async fn main() -> Result<(), GatewayError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("zen_claw_service=info,tower_http=info"));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let args = Args::parse();
    let config = GatewayConfig::from_args(args);
    info!(
        addr = %config.bind_addr,
        data_dir = %config.data_dir.display(),
        max_sessions = config.max_sessions,
        "starting zen-claw gateway"
    );

    let state = AppState::build(config.clone()).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("listening on {}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
