//! Queue-to-worker round trip over the in-memory backends

mod common;

use chrono::Utc;
use common::*;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use videogen::broker::{keys, CacheBroker, MemoryBroker};
use videogen::config::Environment;
use videogen::cost::CostLedger;
use videogen::events::EventBus;
use videogen::models::{JobStatus, QueuePayload};
use videogen::pipeline::{ObjectStore, Orchestrator};
use videogen::queue::JobQueue;
use videogen::sse::SseHub;
use videogen::storage::{MemoryObjectStore, AUDIO_BUCKET};
use videogen::store::{JobStore, MemoryStore};
use videogen::worker::WorkerPool;

async fn wait_for_status(
    store: &Arc<MemoryStore>,
    job_id: Uuid,
    wanted: JobStatus,
) -> bool {
    for _ in 0..100 {
        if let Some(job) = store.get_job(job_id).await.unwrap() {
            if job.status == wanted {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_worker_drains_queue_to_completion() {
    let broker = Arc::new(MemoryBroker::new());
    let store = Arc::new(MemoryStore::new());
    let objects = Arc::new(MemoryObjectStore::new());
    let ledger = CostLedger::new(store.clone());
    let collaborators =
        ScriptedCollaborators::new(Script::default(), broker.clone(), ledger.clone());
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        broker.clone(),
        ledger,
        EventBus::new(broker.clone()),
        Arc::new(SseHub::new()),
        collaborators,
        objects.clone(),
        Environment::Development,
    ));
    let queue = JobQueue::new(broker.clone());
    let pool = Arc::new(WorkerPool::new(
        queue.clone(),
        store.clone(),
        broker.clone(),
        orchestrator,
        3,
    ));

    let user_id = Uuid::new_v4();
    let job = seeded_job(&store, user_id, JobStatus::Queued).await;
    let audio_url = objects
        .upload(AUDIO_BUCKET, "u/j/song.wav", wav_bytes(60), "audio/wav")
        .await
        .unwrap();
    queue
        .enqueue(&QueuePayload {
            job_id: job.id,
            user_id,
            audio_url,
            user_prompt: job.user_prompt.clone(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    let worker = tokio::spawn(pool.run());

    assert!(wait_for_status(&store, job.id, JobStatus::Completed).await);
    let done = store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(done.progress, 100);
    assert!(done.video_url.is_some());

    // Cleanup ran: payload key deleted, queue drained
    for _ in 0..50 {
        if broker
            .get(&keys::job_payload(job.id))
            .await
            .unwrap()
            .is_none()
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(broker
        .get(&keys::job_payload(job.id))
        .await
        .unwrap()
        .is_none());
    assert_eq!(queue.depth().await.unwrap(), 0);

    worker.abort();
}

#[tokio::test]
async fn test_worker_fast_fails_cancelled_queued_job() {
    let broker = Arc::new(MemoryBroker::new());
    let store = Arc::new(MemoryStore::new());
    let objects = Arc::new(MemoryObjectStore::new());
    let ledger = CostLedger::new(store.clone());
    let collaborators =
        ScriptedCollaborators::new(Script::default(), broker.clone(), ledger.clone());
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        broker.clone(),
        ledger,
        EventBus::new(broker.clone()),
        Arc::new(SseHub::new()),
        collaborators.clone(),
        objects,
        Environment::Development,
    ));
    let queue = JobQueue::new(broker.clone());
    let pool = Arc::new(WorkerPool::new(
        queue.clone(),
        store.clone(),
        broker.clone(),
        orchestrator,
        3,
    ));

    // Cancelled while queued: row already failed, payload key deleted, but
    // the stale list entry remains
    let user_id = Uuid::new_v4();
    let job = seeded_job(&store, user_id, JobStatus::Queued).await;
    let payload = QueuePayload {
        job_id: job.id,
        user_id,
        audio_url: job.audio_url.clone(),
        user_prompt: job.user_prompt.clone(),
        created_at: Utc::now(),
    };
    queue.enqueue(&payload).await.unwrap();
    queue.remove(job.id).await.unwrap();
    store
        .update_job(
            job.id,
            &videogen::models::JobUpdate {
                status: Some(JobStatus::Failed),
                error_message: Some("Job cancelled by user".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let worker = tokio::spawn(pool.run());

    // The stale entry is drained without any stage running
    for _ in 0..100 {
        if queue.depth().await.unwrap() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(queue.depth().await.unwrap(), 0);
    assert_eq!(collaborators.log.lock().analyze_calls, 0);
    let stored = store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.progress, 0);

    worker.abort();
}
