//! PostgREST-dialect store backend
//!
//! The relational store fronts its tables with a REST interface; this client
//! authenticates with the service key and pushes filters, ordering, and
//! pagination down into query parameters.

use super::{JobPage, JobStore};
use crate::error::{PipelineError, PipelineResult};
use crate::models::{AnalysisCacheEntry, CostEntry, Job, JobStage, JobStatus, JobUpdate};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Response;
use uuid::Uuid;

/// REST client over the relational store
#[derive(Clone)]
pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
}

impl RestStore {
    /// Build a client for the store at `store_url`, authenticating every
    /// request with `service_key`
    pub fn new(store_url: &str, service_key: &str) -> PipelineResult<Self> {
        let mut headers = HeaderMap::new();
        let key_value = HeaderValue::from_str(service_key)
            .map_err(|_| PipelineError::Config("STORE_SERVICE_KEY is not valid ASCII".into()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {service_key}"))
            .map_err(|_| PipelineError::Config("STORE_SERVICE_KEY is not valid ASCII".into()))?;
        headers.insert("apikey", key_value);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to build store client: {e}")))?;

        Ok(Self {
            client,
            base_url: format!("{}/rest/v1", store_url.trim_end_matches('/')),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, table)
    }

    async fn expect_success(response: Response) -> PipelineResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(PipelineError::Retryable(format!(
            "store returned {status}: {body}"
        )))
    }

    /// Parse the total from a `Content-Range: 0-9/42` header
    fn parse_total(response: &Response) -> Option<u64> {
        response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(|range| range.rsplit('/').next())
            .and_then(|total| total.parse().ok())
    }
}

#[async_trait]
impl JobStore for RestStore {
    async fn insert_job(&self, job: &Job) -> PipelineResult<()> {
        let response = self
            .client
            .post(self.table_url("jobs"))
            .header("Prefer", "return=minimal")
            .json(job)
            .send()
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> PipelineResult<Option<Job>> {
        let response = self
            .client
            .get(self.table_url("jobs"))
            .query(&[("id", format!("eq.{job_id}")), ("select", "*".into())])
            .send()
            .await?;
        let response = Self::expect_success(response).await?;
        let rows: Vec<Job> = serde_json::from_slice(&response.bytes().await?)?;
        Ok(rows.into_iter().next())
    }

    async fn update_job(&self, job_id: Uuid, update: &JobUpdate) -> PipelineResult<()> {
        let response = self
            .client
            .patch(self.table_url("jobs"))
            .query(&[("id", format!("eq.{job_id}"))])
            .header("Prefer", "return=minimal")
            .json(update)
            .send()
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn list_jobs(
        &self,
        user_id: Uuid,
        status: Option<JobStatus>,
        limit: u32,
        offset: u32,
    ) -> PipelineResult<JobPage> {
        let mut query = vec![
            ("user_id".to_string(), format!("eq.{user_id}")),
            ("select".to_string(), "*".to_string()),
            ("order".to_string(), "created_at.desc".to_string()),
            ("limit".to_string(), limit.to_string()),
            ("offset".to_string(), offset.to_string()),
        ];
        if let Some(status) = status {
            query.push(("status".to_string(), format!("eq.{}", status.as_str())));
        }

        let response = self
            .client
            .get(self.table_url("jobs"))
            .query(&query)
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let response = Self::expect_success(response).await?;
        let total = Self::parse_total(&response).unwrap_or(0);
        let jobs: Vec<Job> = serde_json::from_slice(&response.bytes().await?)?;
        Ok(JobPage { jobs, total })
    }

    async fn upsert_stage(&self, stage: &JobStage) -> PipelineResult<()> {
        let response = self
            .client
            .post(self.table_url("job_stages"))
            .query(&[("on_conflict", "job_id,stage_name")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(stage)
            .send()
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn get_stage(
        &self,
        job_id: Uuid,
        stage_name: &str,
    ) -> PipelineResult<Option<JobStage>> {
        let response = self
            .client
            .get(self.table_url("job_stages"))
            .query(&[
                ("job_id", format!("eq.{job_id}")),
                ("stage_name", format!("eq.{stage_name}")),
                ("select", "*".to_string()),
            ])
            .send()
            .await?;
        let response = Self::expect_success(response).await?;
        let rows: Vec<JobStage> = serde_json::from_slice(&response.bytes().await?)?;
        Ok(rows.into_iter().next())
    }

    async fn insert_cost(&self, entry: &CostEntry) -> PipelineResult<()> {
        let response = self
            .client
            .post(self.table_url("job_costs"))
            .header("Prefer", "return=minimal")
            .json(entry)
            .send()
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn upsert_analysis_cache(&self, entry: &AnalysisCacheEntry) -> PipelineResult<()> {
        let response = self
            .client
            .post(self.table_url("audio_analysis_cache"))
            .query(&[("on_conflict", "file_hash")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(entry)
            .send()
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        let response = self
            .client
            .get(self.table_url("jobs"))
            .query(&[("select", "id"), ("limit", "1")])
            .send()
            .await;
        matches!(response, Ok(r) if r.status().is_success())
    }
}
