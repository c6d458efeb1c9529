//! Token validation
//!
//! Bearer tokens are HS256-signed by the identity provider with a shared
//! secret. Positive validations are cached in the broker for five minutes,
//! keyed by a content hash of the token; negative results are never cached.

use crate::broker::{keys, CacheBroker};
use crate::error::{PipelineError, PipelineResult};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

const TOKEN_CACHE_TTL_SECS: u64 = 300;

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<String>,
    #[allow(dead_code)]
    exp: i64,
}

/// Resolved identity of an authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: Uuid,
}

/// Validates bearer tokens with a broker-backed positive cache
#[derive(Clone)]
pub struct TokenValidator {
    broker: Arc<dyn CacheBroker>,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenValidator {
    pub fn new(broker: Arc<dyn CacheBroker>, secret: &str) -> Self {
        Self {
            broker,
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Validate a bearer token and resolve the owning user.
    ///
    /// Cache read/write failures are logged and ignored; they never fail the
    /// request on their own.
    pub async fn validate(&self, token: &str) -> PipelineResult<AuthContext> {
        let cache_key = keys::jwt_valid(&token_hash(token));

        match self.broker.get(&cache_key).await {
            Ok(Some(cached)) => {
                if let Ok(context) = serde_json::from_str::<AuthContext>(&cached) {
                    debug!(user_id = %context.user_id, "token validated from cache");
                    return Ok(context);
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "failed to check token cache"),
        }

        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|_| PipelineError::AuthInvalidToken)?;

        let subject = match data.claims.sub.as_deref() {
            Some(sub) if !sub.is_empty() => sub,
            _ => return Err(PipelineError::AuthMissingSubject),
        };
        let user_id = subject
            .parse::<Uuid>()
            .map_err(|_| PipelineError::AuthInvalidToken)?;

        let context = AuthContext { user_id };
        match serde_json::to_string(&context) {
            Ok(json) => {
                if let Err(e) = self
                    .broker
                    .set(&cache_key, &json, Some(TOKEN_CACHE_TTL_SECS))
                    .await
                {
                    warn!(error = %e, "failed to cache validated token");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize auth context"),
        }

        debug!(user_id = %user_id, "token validated");
        Ok(context)
    }
}

/// Content hash used as the token cache key
fn token_hash(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex_encode(&hasher.finalize())
}

/// Lowercase hex encoding
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// SHA-256 content hash of an uploaded file, used for analysis caching
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}
