//! Store gateway
//!
//! Typed CRUD over the relational store: jobs, stage records, cost entries,
//! and the durable analysis cache. The REST backend talks PostgREST dialect;
//! the memory backend serves tests and local development.

mod memory;
mod rest;

pub use memory::MemoryStore;
pub use rest::RestStore;

use crate::error::PipelineResult;
use crate::models::{AnalysisCacheEntry, CostEntry, Job, JobStage, JobStatus, JobUpdate};
use async_trait::async_trait;
use uuid::Uuid;

/// Page of jobs plus the total matching count
#[derive(Debug, Clone)]
pub struct JobPage {
    pub jobs: Vec<Job>,
    pub total: u64,
}

/// Typed CRUD on the durable entities
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert_job(&self, job: &Job) -> PipelineResult<()>;

    async fn get_job(&self, job_id: Uuid) -> PipelineResult<Option<Job>>;

    /// Apply a partial update to a job row
    async fn update_job(&self, job_id: Uuid, update: &JobUpdate) -> PipelineResult<()>;

    /// Jobs owned by `user_id`, newest first, optionally filtered by status.
    /// Ordering, limit, and offset are pushed down to the store.
    async fn list_jobs(
        &self,
        user_id: Uuid,
        status: Option<JobStatus>,
        limit: u32,
        offset: u32,
    ) -> PipelineResult<JobPage>;

    /// Upsert on (job_id, stage_name); exactly one row per pair
    async fn upsert_stage(&self, stage: &JobStage) -> PipelineResult<()>;

    async fn get_stage(&self, job_id: Uuid, stage_name: &str)
        -> PipelineResult<Option<JobStage>>;

    /// Append a cost entry; never updated in place
    async fn insert_cost(&self, entry: &CostEntry) -> PipelineResult<()>;

    /// Upsert the durable analysis cache row, keyed by content hash
    async fn upsert_analysis_cache(&self, entry: &AnalysisCacheEntry) -> PipelineResult<()>;

    /// Health probe
    async fn health_check(&self) -> bool;
}
