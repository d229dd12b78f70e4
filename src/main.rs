mod api;
mod config;
mod engine;
mod pages;
mod profile;
mod report;
mod sdk;
mod server;
mod session;
mod telemetry;

use crate::config::{AppConfig, Cli};
use crate::server::AppState;
use crate::session::InMemorySessionStore;
use crate::telemetry::TracingTelemetrySink;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::load(&cli)?;

    let engine = engine::backend_from_config(&config);
    let sessions: Arc<dyn crate::session::SessionStore> =
        Arc::new(InMemorySessionStore::new(config.session_ttl));
    let telemetry: Arc<dyn crate::telemetry::TelemetrySink> = Arc::new(TracingTelemetrySink);

    let state = AppState::new(config.clone(), engine, sessions, telemetry);

    let addr: SocketAddr = config.bind_addr;
    tracing::info!(%addr, "starting zakaut-gui server");
    server::run(addr, state).await?;
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
