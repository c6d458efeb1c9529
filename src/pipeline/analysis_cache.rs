//! Analysis result caching
//!
//! The analysis stage is the most expensive; its output is cached by the
//! SHA-256 content hash of the uploaded audio, in both the broker (24-hour
//! TTL) and the durable `audio_analysis_cache` table. All operations are
//! best-effort: a cache failure never fails the job.

use crate::broker::{keys, CacheBroker};
use crate::models::{AnalysisCacheEntry, AudioAnalysis};
use crate::store::JobStore;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

const ANALYSIS_TTL_SECS: u64 = 86_400;

/// Broker + durable-table cache for audio analysis results
#[derive(Clone)]
pub struct AnalysisCache {
    broker: Arc<dyn CacheBroker>,
    store: Arc<dyn JobStore>,
}

impl AnalysisCache {
    pub fn new(broker: Arc<dyn CacheBroker>, store: Arc<dyn JobStore>) -> Self {
        Self { broker, store }
    }

    /// Look up a cached analysis by content hash
    pub async fn get(&self, file_hash: &str) -> Option<AudioAnalysis> {
        let key = keys::audio_cache(file_hash);
        match self.broker.get(&key).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(analysis) => {
                    info!(file_hash, "analysis cache hit");
                    Some(analysis)
                }
                Err(e) => {
                    warn!(file_hash, error = %e, "failed to decode cached analysis");
                    None
                }
            },
            Ok(None) => {
                debug!(file_hash, "analysis cache miss");
                None
            }
            Err(e) => {
                warn!(file_hash, error = %e, "failed to read analysis cache");
                None
            }
        }
    }

    /// Store an analysis in the broker and the durable table
    pub async fn store(&self, file_hash: &str, analysis: &AudioAnalysis) {
        let data = match serde_json::to_value(analysis) {
            Ok(data) => data,
            Err(e) => {
                warn!(file_hash, error = %e, "failed to serialize analysis");
                return;
            }
        };

        let key = keys::audio_cache(file_hash);
        if let Err(e) = self
            .broker
            .set(&key, &data.to_string(), Some(ANALYSIS_TTL_SECS))
            .await
        {
            warn!(file_hash, error = %e, "failed to cache analysis in broker");
        }

        let now = Utc::now();
        let entry = AnalysisCacheEntry {
            file_hash: file_hash.to_string(),
            analysis_data: data,
            created_at: now,
            expires_at: now + Duration::seconds(ANALYSIS_TTL_SECS as i64),
        };
        if let Err(e) = self.store.upsert_analysis_cache(&entry).await {
            warn!(file_hash, error = %e, "failed to persist analysis cache row");
        }
    }
}
