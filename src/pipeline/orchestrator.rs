//! Staged state machine for one job
//!
//! Walks the stage table in order. Every stage boundary checks cancellation,
//! known-cost stages check the budget before running and enforce it after,
//! and the degradable reference stage falls back to a null output instead of
//! failing the job. Progress writes are monotonic within a run and the
//! terminal event is always last.

use crate::broker::{keys, CacheBroker};
use crate::config::Environment;
use crate::cost::{self, CostLedger};
use crate::error::{PipelineError, PipelineResult};
use crate::events::{EventBus, EventType};
use crate::models::{
    AudioAnalysis, ClipPrompts, Clips, JobStage, JobStatus, JobUpdate, QueuePayload, References,
    ScenePlan, StageStatus, VideoOutput,
};
use crate::pipeline::{pipeline_stages, AnalysisCache, ObjectStore, StageCollaborators};
use crate::sse::SseHub;
use crate::store::JobStore;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

const CANCELLED_MESSAGE: &str = "Job cancelled by user";

/// Intermediate outputs threaded between stages
#[derive(Default)]
struct StageOutputs {
    analysis: Option<AudioAnalysis>,
    plan: Option<ScenePlan>,
    references: Option<References>,
    prompts: Option<ClipPrompts>,
    clips: Option<Clips>,
    video: Option<VideoOutput>,
}

impl StageOutputs {
    fn analysis(&self) -> PipelineResult<&AudioAnalysis> {
        self.analysis
            .as_ref()
            .ok_or_else(|| PipelineError::Pipeline("audio analysis output missing".into()))
    }

    fn plan(&self) -> PipelineResult<&ScenePlan> {
        self.plan
            .as_ref()
            .ok_or_else(|| PipelineError::Pipeline("scene plan output missing".into()))
    }
}

/// Drives one job through the fixed stage sequence
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    broker: Arc<dyn CacheBroker>,
    ledger: CostLedger,
    events: EventBus,
    hub: Arc<SseHub>,
    collaborators: Arc<dyn StageCollaborators>,
    objects: Arc<dyn ObjectStore>,
    analysis_cache: AnalysisCache,
    environment: Environment,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn JobStore>,
        broker: Arc<dyn CacheBroker>,
        ledger: CostLedger,
        events: EventBus,
        hub: Arc<SseHub>,
        collaborators: Arc<dyn StageCollaborators>,
        objects: Arc<dyn ObjectStore>,
        environment: Environment,
    ) -> Self {
        let analysis_cache = AnalysisCache::new(broker.clone(), store.clone());
        Self {
            store,
            broker,
            ledger,
            events,
            hub,
            collaborators,
            objects,
            analysis_cache,
            environment,
        }
    }

    /// Execute the pipeline for one dequeued job.
    ///
    /// Terminal failures are written to the job row before the error is
    /// returned; retryable errors propagate untouched so the worker can let
    /// the queue re-deliver.
    pub async fn execute(&self, payload: &QueuePayload) -> PipelineResult<()> {
        let job_id = payload.job_id;
        match self.run_stages(payload).await {
            Ok(()) => {
                self.ledger.release(job_id);
                info!(job_id = %job_id, "pipeline completed successfully");
                Ok(())
            }
            Err(err @ PipelineError::Retryable(_)) => {
                warn!(job_id = %job_id, error = %err, "retryable pipeline error");
                Err(err)
            }
            Err(err) => {
                self.handle_failure(job_id, &err).await;
                self.ledger.release(job_id);
                Err(err)
            }
        }
    }

    async fn run_stages(&self, payload: &QueuePayload) -> PipelineResult<()> {
        let job_id = payload.job_id;
        let limit = cost::budget_limit(self.environment);

        self.store
            .update_job(
                job_id,
                &JobUpdate {
                    status: Some(JobStatus::Processing),
                    ..JobUpdate::touched()
                },
            )
            .await?;

        let stages = pipeline_stages();
        let mut outputs = StageOutputs::default();

        for (index, stage) in stages.iter().enumerate() {
            self.check_cancelled(job_id).await?;

            if let Some(estimate) = stage.pre_estimate {
                if self.ledger.would_exceed(job_id, estimate, limit).await? {
                    return Err(PipelineError::BudgetExceeded(format!(
                        "Would exceed budget limit before {}",
                        stage.name
                    )));
                }
            }

            self.events
                .publish(
                    job_id,
                    EventType::StageUpdate,
                    json!({"stage": stage.name, "status": "started"}),
                )
                .await;

            self.invoke_stage(stage.name, payload, &mut outputs).await?;

            if stage.enforce_after {
                self.ledger.enforce(job_id, limit).await?;
            }

            let is_final = index == stages.len() - 1;
            if is_final {
                self.complete(job_id, &outputs).await?;
            } else {
                self.update_progress(job_id, stage.progress, stage.name).await;

                let mut data = json!({"stage": stage.name, "status": "completed"});
                if let (true, Some(analysis)) = (index == 0, outputs.analysis.as_ref()) {
                    data["duration"] = json!(analysis.duration);
                }
                self.events
                    .publish(job_id, EventType::StageUpdate, data)
                    .await;
            }
        }

        Ok(())
    }

    async fn invoke_stage(
        &self,
        name: &str,
        payload: &QueuePayload,
        outputs: &mut StageOutputs,
    ) -> PipelineResult<()> {
        let job_id = payload.job_id;
        match name {
            "audio_parser" => {
                outputs.analysis = Some(self.run_analysis(payload).await?);
            }
            "scene_planner" => {
                let analysis = outputs.analysis()?;
                outputs.plan = Some(
                    self.collaborators
                        .plan_scenes(job_id, &payload.user_prompt, analysis)
                        .await?,
                );
            }
            "reference_generator" => {
                let plan = outputs.plan()?;
                match self.collaborators.generate_references(job_id, plan).await {
                    Ok(references) => outputs.references = Some(references),
                    Err(e) => {
                        warn!(
                            job_id = %job_id,
                            error = %e,
                            "reference generation failed, entering fallback mode"
                        );
                        self.record_fallback(job_id, name, &e).await;
                        outputs.references = None;
                    }
                }
            }
            "prompt_generator" => {
                let plan = outputs.plan()?;
                outputs.prompts = Some(
                    self.collaborators
                        .generate_prompts(job_id, plan, outputs.references.as_ref())
                        .await?,
                );
            }
            "video_generator" => {
                let prompts = outputs
                    .prompts
                    .as_ref()
                    .ok_or_else(|| PipelineError::Pipeline("clip prompts missing".into()))?;
                let clips = self.collaborators.generate_clips(job_id, prompts).await?;
                if clips.clips.len() < 3 {
                    return Err(PipelineError::Pipeline(
                        "Insufficient clips generated (minimum 3 required)".into(),
                    ));
                }
                outputs.clips = Some(clips);
            }
            "composer" => {
                let clips = outputs
                    .clips
                    .as_ref()
                    .ok_or_else(|| PipelineError::Pipeline("clips missing".into()))?;
                let transitions = outputs
                    .plan
                    .as_ref()
                    .map(|p| p.transitions.clone())
                    .unwrap_or_default();
                let beats = outputs
                    .analysis
                    .as_ref()
                    .map(|a| a.beat_timestamps.clone())
                    .unwrap_or_default();
                outputs.video = Some(
                    self.collaborators
                        .compose_video(job_id, clips, &payload.audio_url, &transitions, &beats)
                        .await?,
                );
            }
            other => {
                return Err(PipelineError::Pipeline(format!("unknown stage: {other}")));
            }
        }
        Ok(())
    }

    /// Run the analysis stage, short-circuiting through the content-hash cache
    async fn run_analysis(&self, payload: &QueuePayload) -> PipelineResult<AudioAnalysis> {
        let file_hash = self.audio_content_hash(&payload.audio_url).await;

        if let Some(hash) = &file_hash {
            if let Some(cached) = self.analysis_cache.get(hash).await {
                return Ok(cached);
            }
        }

        let analysis = self
            .collaborators
            .analyze_audio(payload.job_id, &payload.audio_url)
            .await?;

        if let Some(hash) = &file_hash {
            self.analysis_cache.store(hash, &analysis).await;
        }
        Ok(analysis)
    }

    /// Content hash of the uploaded audio; best-effort
    async fn audio_content_hash(&self, audio_url: &str) -> Option<String> {
        let (bucket, path) = parse_object_url(audio_url)?;
        match self.objects.download(&bucket, &path).await {
            Ok(bytes) => Some(crate::auth::content_hash(&bytes)),
            Err(e) => {
                warn!(audio_url, error = %e, "failed to hash audio for analysis cache");
                None
            }
        }
    }

    async fn record_fallback(&self, job_id: Uuid, stage_name: &str, cause: &PipelineError) {
        let stage = JobStage {
            job_id,
            stage_name: stage_name.to_string(),
            status: StageStatus::Failed,
            metadata: Some(json!({
                "fallback_mode": true,
                "fallback_reason": cause.to_string(),
            })),
        };
        if let Err(e) = self.store.upsert_stage(&stage).await {
            error!(job_id = %job_id, stage_name, error = %e, "failed to record fallback stage");
        }
    }

    async fn check_cancelled(&self, job_id: Uuid) -> PipelineResult<()> {
        match self.broker.get(&keys::job_cancel(job_id)).await {
            Ok(Some(_)) => Err(PipelineError::Pipeline(CANCELLED_MESSAGE.into())),
            Ok(None) => Ok(()),
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "failed to check cancellation flag");
                Ok(())
            }
        }
    }

    /// Write progress to the job row, invalidate the status cache, and
    /// publish the transition on both the event bus and the hub.
    ///
    /// Best-effort end to end: a failed progress write never fails the job.
    async fn update_progress(&self, job_id: Uuid, progress: u8, stage_name: &str) {
        let update = JobUpdate {
            progress: Some(progress),
            current_stage: Some(stage_name.to_string()),
            ..JobUpdate::touched()
        };
        if let Err(e) = self.store.update_job(job_id, &update).await {
            error!(job_id = %job_id, progress, error = %e, "failed to update progress");
        }
        if let Err(e) = self.broker.delete(&keys::job_status(job_id)).await {
            warn!(job_id = %job_id, error = %e, "failed to invalidate job status cache");
        }

        let data = json!({
            "progress": progress,
            "estimated_remaining": null,
            "stage": stage_name,
        });
        self.events
            .publish(job_id, EventType::Progress, data.clone())
            .await;
        self.hub.broadcast(job_id, EventType::Progress.as_str(), &data);

        info!(job_id = %job_id, progress, stage = stage_name, "progress updated");
    }

    async fn complete(&self, job_id: Uuid, outputs: &StageOutputs) -> PipelineResult<()> {
        let video = outputs
            .video
            .as_ref()
            .ok_or_else(|| PipelineError::Pipeline("composed video missing".into()))?;
        let total_cost = self.ledger.total(job_id).await?;

        self.store
            .update_job(
                job_id,
                &JobUpdate {
                    status: Some(JobStatus::Completed),
                    progress: Some(100),
                    current_stage: Some("composer".to_string()),
                    video_url: Some(video.video_url.clone()),
                    total_cost: Some(total_cost),
                    completed_at: Some(Utc::now()),
                    ..JobUpdate::touched()
                },
            )
            .await?;

        if let Err(e) = self.broker.delete(&keys::job_status(job_id)).await {
            warn!(job_id = %job_id, error = %e, "failed to invalidate job status cache");
        }

        self.update_progress(job_id, 100, "composer").await;
        self.events
            .publish(
                job_id,
                EventType::Completed,
                json!({
                    "video_url": video.video_url,
                    "total_cost": total_cost,
                }),
            )
            .await;
        Ok(())
    }

    /// Mark the job failed and emit the terminal error event
    async fn handle_failure(&self, job_id: Uuid, err: &PipelineError) {
        let update = JobUpdate {
            status: Some(JobStatus::Failed),
            error_message: Some(err.to_string()),
            ..JobUpdate::touched()
        };
        if let Err(e) = self.store.update_job(job_id, &update).await {
            error!(job_id = %job_id, error = %e, "failed to write failure state");
        }
        if let Err(e) = self.broker.delete(&keys::job_status(job_id)).await {
            warn!(job_id = %job_id, error = %e, "failed to invalidate job status cache");
        }

        self.events
            .publish(
                job_id,
                EventType::Error,
                json!({
                    "error": err.to_string(),
                    "code": err.code(),
                    "retryable": err.is_retryable(),
                }),
            )
            .await;

        error!(job_id = %job_id, code = err.code(), "pipeline error handled");
    }
}

/// Split a stored object URL into (bucket, path)
fn parse_object_url(url: &str) -> Option<(String, String)> {
    let after = url.split("/object/").nth(1)?;
    let (bucket, path) = after.split_once('/')?;
    if bucket.is_empty() || path.is_empty() {
        return None;
    }
    Some((bucket.to_string(), path.to_string()))
}
