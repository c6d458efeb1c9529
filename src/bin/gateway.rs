//! Ingress API process

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use videogen::api::{self, AppState};
use videogen::broker::RedisBroker;
use videogen::config::Settings;
use videogen::sse::SseHub;
use videogen::storage::RestObjectStore;
use videogen::store::RestStore;

#[derive(Parser)]
#[command(name = "videogen-gateway", about = "VideoGen ingress API")]
struct Args {
    /// Override the configured bind address
    #[arg(long)]
    bind_addr: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings = Settings::from_env()?;
    videogen::init_tracing(&settings.log_level);

    let broker = Arc::new(
        RedisBroker::connect(&settings.redis_url, &settings.cache_namespace)
            .await
            .context("broker connection failed")?,
    );
    let store = Arc::new(RestStore::new(
        &settings.store_url,
        &settings.store_service_key,
    )?);
    let objects = Arc::new(RestObjectStore::new(
        &settings.store_url,
        &settings.store_service_key,
    )?);

    let bind_addr = args.bind_addr.unwrap_or_else(|| settings.bind_addr.clone());
    let state = AppState::new(settings, broker, store, objects);
    let sweeper = SseHub::spawn_sweeper(state.hub.clone());

    let app = api::router(state)?;
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!("gateway listening on http://{bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    sweeper.abort();
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutdown signal received");
    }
}
