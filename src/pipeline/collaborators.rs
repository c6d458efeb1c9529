//! Collaborator contracts
//!
//! The media-processing stages and the object store live out of process;
//! the control plane calls them as black-box operations with typed inputs
//! and outputs. Transient failures surface as `Retryable`.

use crate::error::PipelineResult;
use crate::models::{
    AudioAnalysis, Clip, ClipPrompt, ClipPrompts, Clips, References, ScenePlan, VideoOutput,
};
use async_trait::async_trait;
use uuid::Uuid;

/// The six media-processing stages, in pipeline order
#[async_trait]
pub trait StageCollaborators: Send + Sync {
    /// Extract audio features; results are cacheable by content hash
    async fn analyze_audio(&self, job_id: Uuid, audio_url: &str)
        -> PipelineResult<AudioAnalysis>;

    async fn plan_scenes(
        &self,
        job_id: Uuid,
        user_prompt: &str,
        analysis: &AudioAnalysis,
    ) -> PipelineResult<ScenePlan>;

    /// Degradable: a failure here falls back to `None` references
    async fn generate_references(
        &self,
        job_id: Uuid,
        plan: &ScenePlan,
    ) -> PipelineResult<References>;

    async fn generate_prompts(
        &self,
        job_id: Uuid,
        plan: &ScenePlan,
        references: Option<&References>,
    ) -> PipelineResult<ClipPrompts>;

    /// Must produce at least three clips
    async fn generate_clips(&self, job_id: Uuid, prompts: &ClipPrompts)
        -> PipelineResult<Clips>;

    async fn compose_video(
        &self,
        job_id: Uuid,
        clips: &Clips,
        audio_url: &str,
        transitions: &[serde_json::Value],
        beat_timestamps: &[f64],
    ) -> PipelineResult<VideoOutput>;
}

/// Stand-in stages for environments where the media modules are not
/// deployed yet; every call logs and returns a fixed plausible output.
pub struct StubCollaborators;

#[async_trait]
impl StageCollaborators for StubCollaborators {
    async fn analyze_audio(
        &self,
        job_id: Uuid,
        _audio_url: &str,
    ) -> PipelineResult<AudioAnalysis> {
        tracing::warn!(job_id = %job_id, "audio analysis module not available, using stub");
        Ok(AudioAnalysis {
            duration: 120.0,
            bpm: 120.0,
            beat_timestamps: vec![0.0, 0.5, 1.0],
            structure: vec![],
            mood: "energetic".to_string(),
            lyrics: vec![],
            clip_boundaries: vec![],
        })
    }

    async fn plan_scenes(
        &self,
        job_id: Uuid,
        _user_prompt: &str,
        _analysis: &AudioAnalysis,
    ) -> PipelineResult<ScenePlan> {
        tracing::warn!(job_id = %job_id, "scene planner module not available, using stub");
        Ok(ScenePlan {
            scenes: vec![serde_json::json!({"location": "City", "description": "Urban setting"})],
            transitions: vec![serde_json::json!({"type": "cut", "timestamp": 0.0})],
            style: None,
        })
    }

    async fn generate_references(
        &self,
        job_id: Uuid,
        _plan: &ScenePlan,
    ) -> PipelineResult<References> {
        tracing::warn!(job_id = %job_id, "reference generator module not available, using stub");
        Ok(References { image_urls: vec![] })
    }

    async fn generate_prompts(
        &self,
        job_id: Uuid,
        _plan: &ScenePlan,
        _references: Option<&References>,
    ) -> PipelineResult<ClipPrompts> {
        tracing::warn!(job_id = %job_id, "prompt generator module not available, using stub");
        Ok(ClipPrompts {
            prompts: vec![ClipPrompt {
                clip_index: 0,
                prompt: "A scene".to_string(),
            }],
        })
    }

    async fn generate_clips(
        &self,
        job_id: Uuid,
        _prompts: &ClipPrompts,
    ) -> PipelineResult<Clips> {
        tracing::warn!(job_id = %job_id, "video generator module not available, using stub");
        Ok(Clips {
            clips: (0..3)
                .map(|i| Clip {
                    clip_index: i,
                    video_url: format!("stub://clips/{i}"),
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
        tracing::warn!(job_id = %job_id, "composer module not available, using stub");
        Ok(VideoOutput {
            video_url: format!("stub://videos/{job_id}/final_video.mp4"),
            duration: 120.0,
        })
    }
}

/// Object store contract: uploads, downloads, and signed GET URLs
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload bytes and return the stored object's URL
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> PipelineResult<String>;

    async fn download(&self, bucket: &str, path: &str) -> PipelineResult<Vec<u8>>;

    /// Time-bounded URL granting GET access without ambient credentials
    async fn signed_url(&self, bucket: &str, path: &str, ttl_secs: u64)
        -> PipelineResult<String>;
}
