//! Worker process

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use videogen::broker::RedisBroker;
use videogen::config::Settings;
use videogen::cost::CostLedger;
use videogen::events::EventBus;
use videogen::pipeline::{Orchestrator, StubCollaborators};
use videogen::queue::JobQueue;
use videogen::sse::SseHub;
use videogen::storage::RestObjectStore;
use videogen::store::RestStore;
use videogen::worker::WorkerPool;

#[derive(Parser)]
#[command(name = "videogen-worker", about = "VideoGen pipeline worker")]
struct Args {
    /// Override the configured concurrency cap
    #[arg(long)]
    concurrency: Option<usize>,
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

    // Worker processes host no HTTP clients; the hub only carries local
    // broadcasts, which have no subscribers here.
    let hub = Arc::new(SseHub::new());
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        broker.clone(),
        CostLedger::new(store.clone()),
        EventBus::new(broker.clone()),
        hub,
        Arc::new(StubCollaborators),
        objects,
        settings.environment,
    ));

    let concurrency = args.concurrency.unwrap_or(settings.worker_concurrency);
    let pool = Arc::new(WorkerPool::new(
        JobQueue::new(broker.clone()),
        store,
        broker,
        orchestrator,
        concurrency,
    ));

    tokio::select! {
        _ = pool.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received, worker stopping");
        }
    }
    Ok(())
}
