//! In-memory store backend for tests and local development

use super::{JobPage, JobStore};
use crate::error::{PipelineError, PipelineResult};
use crate::models::{AnalysisCacheEntry, CostEntry, Job, JobStage, JobStatus, JobUpdate};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    jobs: HashMap<Uuid, Job>,
    stages: HashMap<(Uuid, String), JobStage>,
    costs: Vec<CostEntry>,
    analysis_cache: HashMap<String, AnalysisCacheEntry>,
}

/// In-memory implementation of the store gateway
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cost entries recorded for a job, in insertion order
    pub fn costs_for(&self, job_id: Uuid) -> Vec<CostEntry> {
        self.tables
            .lock()
            .costs
            .iter()
            .filter(|c| c.job_id == job_id)
            .cloned()
            .collect()
    }

    fn apply_update(job: &mut Job, update: &JobUpdate) {
        if let Some(status) = update.status {
            job.status = status;
        }
        if let Some(progress) = update.progress {
            job.progress = progress;
        }
        if let Some(stage) = &update.current_stage {
            job.current_stage = Some(stage.clone());
        }
        if let Some(total) = update.total_cost {
            job.total_cost = total;
        }
        if let Some(url) = &update.video_url {
            job.video_url = Some(url.clone());
        }
        if let Some(message) = &update.error_message {
            job.error_message = Some(message.clone());
        }
        if let Some(completed_at) = update.completed_at {
            job.completed_at = Some(completed_at);
        }
        if let Some(updated_at) = update.updated_at {
            job.updated_at = Some(updated_at);
        }
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert_job(&self, job: &Job) -> PipelineResult<()> {
        let mut tables = self.tables.lock();
        if tables.jobs.contains_key(&job.id) {
            return Err(PipelineError::Conflict(format!(
                "job {} already exists",
                job.id
            )));
        }
        tables.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> PipelineResult<Option<Job>> {
        Ok(self.tables.lock().jobs.get(&job_id).cloned())
    }

    async fn update_job(&self, job_id: Uuid, update: &JobUpdate) -> PipelineResult<()> {
        let mut tables = self.tables.lock();
        if let Some(job) = tables.jobs.get_mut(&job_id) {
            Self::apply_update(job, update);
        }
        Ok(())
    }

    async fn list_jobs(
        &self,
        user_id: Uuid,
        status: Option<JobStatus>,
        limit: u32,
        offset: u32,
    ) -> PipelineResult<JobPage> {
        let tables = self.tables.lock();
        let mut matching: Vec<Job> = tables
            .jobs
            .values()
            .filter(|j| j.user_id == user_id)
            .filter(|j| status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matching.len() as u64;
        let jobs = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok(JobPage { jobs, total })
    }

    async fn upsert_stage(&self, stage: &JobStage) -> PipelineResult<()> {
        self.tables
            .lock()
            .stages
            .insert((stage.job_id, stage.stage_name.clone()), stage.clone());
        Ok(())
    }

    async fn get_stage(
        &self,
        job_id: Uuid,
        stage_name: &str,
    ) -> PipelineResult<Option<JobStage>> {
        Ok(self
            .tables
            .lock()
            .stages
            .get(&(job_id, stage_name.to_string()))
            .cloned())
    }

    async fn insert_cost(&self, entry: &CostEntry) -> PipelineResult<()> {
        self.tables.lock().costs.push(entry.clone());
        Ok(())
    }

    async fn upsert_analysis_cache(&self, entry: &AnalysisCacheEntry) -> PipelineResult<()> {
        self.tables
            .lock()
            .analysis_cache
            .insert(entry.file_hash.clone(), entry.clone());
        Ok(())
    }

    async fn health_check(&self) -> bool {
        true
    }
}
