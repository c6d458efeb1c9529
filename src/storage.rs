//! Object storage backends
//!
//! REST implementation of the object-store contract plus an in-memory
//! backend for tests. Buckets: `audio-uploads` for ingress, `video-outputs`
//! for composed artifacts.

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::ObjectStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

pub const AUDIO_BUCKET: &str = "audio-uploads";
pub const VIDEO_BUCKET: &str = "video-outputs";

/// REST client for the store's object storage endpoint
#[derive(Clone)]
pub struct RestObjectStore {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

impl RestObjectStore {
    pub fn new(store_url: &str, service_key: &str) -> PipelineResult<Self> {
        let mut headers = HeaderMap::new();
        let key_value = HeaderValue::from_str(service_key)
            .map_err(|_| PipelineError::Config("STORE_SERVICE_KEY is not valid ASCII".into()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {service_key}"))
            .map_err(|_| PipelineError::Config("STORE_SERVICE_KEY is not valid ASCII".into()))?;
        headers.insert("apikey", key_value);
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to build storage client: {e}")))?;

        Ok(Self {
            client,
            base_url: format!("{}/storage/v1", store_url.trim_end_matches('/')),
        })
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/object/{bucket}/{path}", self.base_url)
    }
}

#[async_trait]
impl ObjectStore for RestObjectStore {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> PipelineResult<String> {
        let url = self.object_url(bucket, path);
        let response = self
            .client
            .post(&url)
            .header("Content-Type", content_type)
            .body(bytes)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(PipelineError::Retryable(format!(
                "object upload returned {status}"
            )));
        }
        Ok(url)
    }

    async fn download(&self, bucket: &str, path: &str) -> PipelineResult<Vec<u8>> {
        let response = self
            .client
            .get(self.object_url(bucket, path))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(PipelineError::Retryable(format!(
                "object download returned {status}"
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn signed_url(
        &self,
        bucket: &str,
        path: &str,
        ttl_secs: u64,
    ) -> PipelineResult<String> {
        let response = self
            .client
            .post(format!("{}/object/sign/{bucket}/{path}", self.base_url))
            .json(&json!({"expiresIn": ttl_secs}))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(PipelineError::Retryable(format!(
                "signed url request returned {status}"
            )));
        }
        let signed: SignedUrlResponse = serde_json::from_slice(&response.bytes().await?)?;
        if signed.signed_url.starts_with("http") {
            Ok(signed.signed_url)
        } else {
            Ok(format!(
                "{}{}",
                self.base_url,
                signed.signed_url.trim_start_matches("/storage/v1")
            ))
        }
    }
}

/// In-memory object store for tests and local development
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<Mutex<HashMap<(String, String), Vec<u8>>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> PipelineResult<String> {
        self.objects
            .lock()
            .insert((bucket.to_string(), path.to_string()), bytes);
        Ok(format!("mem://store/object/{bucket}/{path}"))
    }

    async fn download(&self, bucket: &str, path: &str) -> PipelineResult<Vec<u8>> {
        self.objects
            .lock()
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| PipelineError::NotFound(format!("object {bucket}/{path}")))
    }

    async fn signed_url(
        &self,
        bucket: &str,
        path: &str,
        ttl_secs: u64,
    ) -> PipelineResult<String> {
        if !self
            .objects
            .lock()
            .contains_key(&(bucket.to_string(), path.to_string()))
        {
            return Err(PipelineError::NotFound(format!("object {bucket}/{path}")));
        }
        Ok(format!("mem://signed/{bucket}/{path}?expires={ttl_secs}"))
    }
}
