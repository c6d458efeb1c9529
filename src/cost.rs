//! Cost tracking and budget enforcement
//!
//! Per-job cost accumulation with hard caps. A per-job mutex serializes
//! append-entry / read-total / write-total so each writer sees the total it
//! just wrote; the map of mutexes is evicted when a job reaches a terminal
//! state.

use crate::config::Environment;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{CostEntry, JobUpdate};
use crate::store::JobStore;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// Budget limit for the environment
pub fn budget_limit(environment: Environment) -> Decimal {
    if environment.is_billed() {
        Decimal::new(2000_00, 2)
    } else {
        Decimal::new(50_00, 2)
    }
}

/// Admission-time cost estimate for an audio of the given duration.
///
/// Production/staging bill at 200.00 per minute; development approximates at
/// 1.50 per minute with a 2.00 floor.
pub fn cost_estimate(duration_minutes: f64, environment: Environment) -> Decimal {
    let minutes = Decimal::from_f64(duration_minutes).unwrap_or_default();
    let estimate = if environment.is_billed() {
        minutes * Decimal::new(200_00, 2)
    } else {
        (minutes * Decimal::new(1_50, 2)).max(Decimal::new(2_00, 2))
    };
    estimate.round_dp(2)
}

/// Concurrent-safe per-job cost accumulator
#[derive(Clone)]
pub struct CostLedger {
    store: Arc<dyn JobStore>,
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl CostLedger {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            locks: Arc::new(DashMap::new()),
        }
    }

    fn lock_for(&self, job_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(job_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Record a charge against a job and fold it into the job's total
    pub async fn track_cost(
        &self,
        job_id: Uuid,
        stage_name: &str,
        api_name: &str,
        cost: Decimal,
    ) -> PipelineResult<()> {
        if cost < Decimal::ZERO {
            return Err(PipelineError::Validation(format!(
                "Cost cannot be negative: {cost}"
            )));
        }

        let lock = self.lock_for(job_id);
        let _guard = lock.lock().await;

        self.store
            .insert_cost(&CostEntry {
                job_id,
                stage_name: stage_name.to_string(),
                api_name: api_name.to_string(),
                cost,
                timestamp: Utc::now(),
            })
            .await?;

        let current = self.total(job_id).await?;
        let new_total = current + cost;
        self.store
            .update_job(
                job_id,
                &JobUpdate {
                    total_cost: Some(new_total),
                    ..JobUpdate::touched()
                },
            )
            .await?;

        info!(
            job_id = %job_id,
            stage_name,
            api_name,
            cost = %cost,
            total = %new_total,
            "tracked cost"
        );
        Ok(())
    }

    /// Current accumulated total for a job; zero when the job is unknown
    pub async fn total(&self, job_id: Uuid) -> PipelineResult<Decimal> {
        Ok(self
            .store
            .get_job(job_id)
            .await?
            .map(|job| job.total_cost)
            .unwrap_or(Decimal::ZERO))
    }

    /// Whether adding `delta` would push the job past `limit`
    pub async fn would_exceed(
        &self,
        job_id: Uuid,
        delta: Decimal,
        limit: Decimal,
    ) -> PipelineResult<bool> {
        let current = self.total(job_id).await?;
        Ok(current + delta > limit)
    }

    /// Fail with `BudgetExceeded` when the accumulated total is past `limit`
    pub async fn enforce(&self, job_id: Uuid, limit: Decimal) -> PipelineResult<()> {
        let current = self.total(job_id).await?;
        if current > limit {
            return Err(PipelineError::BudgetExceeded(format!(
                "Budget limit of ${limit} exceeded for job {job_id}. Current total: ${current}"
            )));
        }
        Ok(())
    }

    /// Drop the per-job lock entry once the job reaches a terminal state
    pub fn release(&self, job_id: Uuid) {
        self.locks.remove(&job_id);
    }
}
