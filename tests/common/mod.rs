//! Shared test fixtures: in-memory backends, scripted collaborators, and
//! request builders.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use videogen::api::{AppState, SharedState};
use videogen::broker::{keys, CacheBroker, MemoryBroker};
use videogen::config::{Environment, RateLimitPolicy, Settings};
use videogen::cost::CostLedger;
use videogen::error::{PipelineError, PipelineResult};
use videogen::models::*;
use videogen::pipeline::StageCollaborators;
use videogen::storage::MemoryObjectStore;
use videogen::store::{JobStore, MemoryStore};

pub const JWT_SECRET: &str = "test-secret-test-secret-test-secret!";

pub fn test_settings(environment: Environment) -> Settings {
    Settings {
        store_url: "https://store.example.com".to_string(),
        store_service_key: "k".repeat(64),
        redis_url: "redis://localhost:6379".to_string(),
        jwt_secret: JWT_SECRET.to_string(),
        frontend_url: "https://app.example.com".to_string(),
        environment,
        log_level: "info".to_string(),
        rate_limit_policy: RateLimitPolicy::FailOpen,
        cache_namespace: "videogen:cache:".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        worker_concurrency: 3,
    }
}

pub struct TestHarness {
    pub state: SharedState,
    pub broker: Arc<MemoryBroker>,
    pub store: Arc<MemoryStore>,
    pub objects: Arc<MemoryObjectStore>,
}

pub fn harness(environment: Environment) -> TestHarness {
    let broker = Arc::new(MemoryBroker::new());
    let store = Arc::new(MemoryStore::new());
    let objects = Arc::new(MemoryObjectStore::new());
    let state = AppState::new(
        test_settings(environment),
        broker.clone(),
        store.clone(),
        objects.clone(),
    );
    TestHarness {
        state,
        broker,
        store,
        objects,
    }
}

pub fn token_for(user_id: Uuid) -> String {
    let claims = json!({
        "sub": user_id.to_string(),
        "exp": Utc::now().timestamp() + 3600,
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

/// Minimal WAV header declaring the requested duration; the probe only
/// reads chunk metadata, so no sample data is needed.
pub fn wav_bytes(duration_secs: u32) -> Vec<u8> {
    let byte_rate = 1000u32;
    let data_len = byte_rate * duration_secs;
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&8000u32.to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    bytes
}

pub async fn seeded_job(store: &Arc<MemoryStore>, user_id: Uuid, status: JobStatus) -> Job {
    let job = Job {
        id: Uuid::new_v4(),
        user_id,
        status,
        audio_url: "mem://store/object/audio-uploads/u/j/song.wav".to_string(),
        user_prompt: "p".repeat(60),
        progress: 0,
        current_stage: None,
        estimated_cost: Decimal::new(2_00, 2),
        total_cost: Decimal::ZERO,
        video_url: None,
        error_message: None,
        created_at: Utc::now(),
        updated_at: None,
        completed_at: None,
    };
    store.insert_job(&job).await.unwrap();
    job
}

/// What the scripted collaborators should do at each stage
#[derive(Clone)]
pub struct Script {
    /// Cost tracked during reference generation
    pub reference_cost: Option<Decimal>,
    /// Fail the (degradable) reference stage
    pub reference_fails: bool,
    /// Set the cancellation marker while planning scenes
    pub cancel_during_planning: bool,
    /// Clips produced by the generation stage
    pub clip_count: usize,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            reference_cost: None,
            reference_fails: false,
            cancel_during_planning: false,
            clip_count: 3,
        }
    }
}

/// Per-stage call log for assertions
#[derive(Default)]
pub struct CallLog {
    pub analyze_calls: usize,
    pub clips_calls: usize,
    pub prompts_references: Vec<bool>,
}

pub struct ScriptedCollaborators {
    pub script: Script,
    pub log: Mutex<CallLog>,
    broker: Arc<MemoryBroker>,
    ledger: CostLedger,
}

impl ScriptedCollaborators {
    pub fn new(script: Script, broker: Arc<MemoryBroker>, ledger: CostLedger) -> Arc<Self> {
        Arc::new(Self {
            script,
            log: Mutex::new(CallLog::default()),
            broker,
            ledger,
        })
    }
}

#[async_trait]
impl StageCollaborators for ScriptedCollaborators {
    async fn analyze_audio(&self, _job_id: Uuid, _audio_url: &str) -> PipelineResult<AudioAnalysis> {
        self.log.lock().analyze_calls += 1;
        Ok(AudioAnalysis {
            duration: 60.0,
            bpm: 128.0,
            beat_timestamps: vec![0.0, 0.5, 1.0, 1.5],
            structure: vec![],
            mood: "energetic".to_string(),
            lyrics: vec![],
            clip_boundaries: vec![0.0, 20.0, 40.0],
        })
    }

    async fn plan_scenes(
        &self,
        job_id: Uuid,
        _user_prompt: &str,
        _analysis: &AudioAnalysis,
    ) -> PipelineResult<ScenePlan> {
        if self.script.cancel_during_planning {
            self.broker
                .set(&keys::job_cancel(job_id), "1", Some(900))
                .await
                .unwrap();
        }
        Ok(ScenePlan {
            scenes: vec![json!({"location": "City"})],
            transitions: vec![json!({"type": "cut", "timestamp": 0.0})],
            style: None,
        })
    }

    async fn generate_references(
        &self,
        job_id: Uuid,
        _plan: &ScenePlan,
    ) -> PipelineResult<References> {
        if let Some(cost) = self.script.reference_cost {
            self.ledger
                .track_cost(job_id, "reference_generator", "sdxl", cost)
                .await?;
        }
        if self.script.reference_fails {
            return Err(PipelineError::Pipeline("image synthesis unavailable".into()));
        }
        Ok(References {
            image_urls: vec!["mem://refs/0.png".to_string()],
        })
    }

    async fn generate_prompts(
        &self,
        _job_id: Uuid,
        _plan: &ScenePlan,
        references: Option<&References>,
    ) -> PipelineResult<ClipPrompts> {
        self.log.lock().prompts_references.push(references.is_some());
        Ok(ClipPrompts {
            prompts: vec![ClipPrompt {
                clip_index: 0,
                prompt: "A scene".to_string(),
            }],
        })
    }

    async fn generate_clips(&self, _job_id: Uuid, _prompts: &ClipPrompts) -> PipelineResult<Clips> {
        self.log.lock().clips_calls += 1;
        Ok(Clips {
            clips: (0..self.script.clip_count as u32)
                .map(|i| Clip {
                    clip_index: i,
                    video_url: format!("mem://clips/{i}.mp4"),
                    duration: 5.0,
                })
                .collect(),
        })
    }

    async fn compose_video(
        &self,
        job_id: Uuid,
        _clips: &Clips,
        _audio_url: &str,
        _transitions: &[serde_json::Value],
        _beat_timestamps: &[f64],
    ) -> PipelineResult<VideoOutput> {
        Ok(VideoOutput {
            video_url: format!("mem://store/object/video-outputs/{job_id}/final_video.mp4"),
            duration: 60.0,
        })
    }
}
