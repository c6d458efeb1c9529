//! Data model for jobs, stages, costs, and collaborator I/O
//!
//! These are the durable entities owned by the store gateway plus the typed
//! payloads exchanged with the out-of-process media stages.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Job lifecycle state; terminal states are sticky
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// One end-to-end unit of work driven by one audio+prompt pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: JobStatus,
    pub audio_url: String,
    pub user_prompt: String,
    /// 0-100, monotonically non-decreasing within a successful run
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub current_stage: Option<String>,
    pub estimated_cost: Decimal,
    #[serde(default)]
    pub total_cost: Decimal,
    /// Present only on success
    #[serde(default)]
    pub video_url: Option<String>,
    /// Present only on failure
    #[serde(default)]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Partial update applied to a job row; `None` fields are left untouched
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl JobUpdate {
    /// Update that stamps `updated_at` with the current time
    pub fn touched() -> Self {
        JobUpdate {
            updated_at: Some(Utc::now()),
            ..Default::default()
        }
    }
}

/// Stage execution state within one job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Per (job, stage-name) record; the orchestrator upserts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStage {
    pub job_id: Uuid,
    pub stage_name: String,
    pub status: StageStatus,
    /// Opaque diagnostic document; carries fallback flags for degradable stages
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Append-only cost row; the sum of a job's entries equals its total_cost
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEntry {
    pub job_id: Uuid,
    pub stage_name: String,
    pub api_name: String,
    pub cost: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Durable copy of a cached analysis result, keyed by content hash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisCacheEntry {
    pub file_hash: String,
    pub analysis_data: Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Record placed on the FIFO queue list and the crash-resume payload key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuePayload {
    pub job_id: Uuid,
    pub user_id: Uuid,
    pub audio_url: String,
    pub user_prompt: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Collaborator I/O types (contracts only; the stages live out of process)
// ---------------------------------------------------------------------------

/// Output of the audio analysis stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioAnalysis {
    pub duration: f64,
    pub bpm: f64,
    pub beat_timestamps: Vec<f64>,
    pub structure: Vec<StructureSection>,
    pub mood: String,
    #[serde(default)]
    pub lyrics: Vec<LyricLine>,
    #[serde(default)]
    pub clip_boundaries: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureSection {
    pub label: String,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LyricLine {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

/// Output of the scene planning stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenePlan {
    pub scenes: Vec<Value>,
    #[serde(default)]
    pub transitions: Vec<Value>,
    #[serde(default)]
    pub style: Option<Value>,
}

/// Output of the degradable reference synthesis stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct References {
    pub image_urls: Vec<String>,
}

/// Output of the prompt construction stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipPrompts {
    pub prompts: Vec<ClipPrompt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipPrompt {
    pub clip_index: u32,
    pub prompt: String,
}

/// Output of the clip generation stage; at least 3 clips are required
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clips {
    pub clips: Vec<Clip>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clip {
    pub clip_index: u32,
    pub video_url: String,
    pub duration: f64,
}

/// Output of the final composition stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoOutput {
    pub video_url: String,
    pub duration: f64,
}
