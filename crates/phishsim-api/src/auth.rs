//! Authentication module

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use phishsim_common::config::ApiKeyConfig;
use phishsim_core::{
    DispatchSupervisor, EventRecorder, Metrics, ResultExporter, StatsAggregator, TargetEnroller,
    TokenIssuer,
};
use phishsim_storage::Repositories;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{api_error, ApiError};
use crate::landing::LandingPage;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub repos: Repositories,
    pub supervisor: DispatchSupervisor,
    pub recorder: Arc<EventRecorder>,
    pub stats: Arc<StatsAggregator>,
    pub exporter: Arc<ResultExporter>,
    pub enroller: Arc<TargetEnroller>,
    pub landing: Arc<LandingPage>,
    pub metrics: Metrics,
    pub api_keys: Arc<Vec<ApiKeyConfig>>,
}

impl AppState {
    /// Wire the request-facing components around a set of repositories
    pub fn new(
        repos: Repositories,
        supervisor: DispatchSupervisor,
        metrics: Metrics,
        api_keys: Vec<ApiKeyConfig>,
    ) -> Result<Self, minijinja::Error> {
        Ok(Self {
            recorder: Arc::new(EventRecorder::new(&repos, metrics.clone())),
            stats: Arc::new(StatsAggregator::new(&repos)),
            exporter: Arc::new(ResultExporter::new(&repos)),
            enroller: Arc::new(TargetEnroller::new(repos.targets.clone(), TokenIssuer::new())),
            landing: Arc::new(LandingPage::new()?),
            repos,
            supervisor,
            metrics,
            api_keys: Arc::new(api_keys),
        })
    }
}

/// Authenticated context extracted from API key
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Name of the operator the key belongs to
    pub operator: String,
}

/// Extract API key from request
pub fn extract_api_key(req: &Request) -> Option<&str> {
    // Check Authorization header
    if let Some(auth) = req.headers().get("authorization") {
        if let Ok(auth_str) = auth.to_str() {
            if let Some(key) = auth_str.strip_prefix("Bearer ") {
                return Some(key);
            }
        }
    }

    // Check X-API-Key header
    if let Some(key) = req.headers().get("x-api-key") {
        if let Ok(key_str) = key.to_str() {
            return Some(key_str);
        }
    }

    None
}

/// Hash an API key for comparison
fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify an API key against a configured hash.
///
/// Supports Argon2 PHC strings (`$argon2...`) and SHA-256 hex digests.
fn verify_api_key(api_key: &str, stored_hash: &str) -> bool {
    if stored_hash.starts_with("$argon2") {
        return PasswordHash::new(stored_hash)
            .ok()
            .and_then(|parsed_hash| {
                Argon2::default()
                    .verify_password(api_key.as_bytes(), &parsed_hash)
                    .ok()
            })
            .is_some();
    }

    hash_api_key(api_key).eq_ignore_ascii_case(stored_hash)
}

/// Find the configured key matching `api_key`
fn validate_api_key<'a>(keys: &'a [ApiKeyConfig], api_key: &str) -> Option<&'a ApiKeyConfig> {
    keys.iter().find(|key| verify_api_key(api_key, &key.hash))
}

fn unauthorized(message: &str) -> ApiError {
    api_error(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let api_key = extract_api_key(&request).ok_or_else(|| {
        warn!(path = %request.uri().path(), "Missing API key");
        unauthorized("Missing API key")
    })?;

    let key = validate_api_key(&state.api_keys, api_key).ok_or_else(|| {
        warn!(path = %request.uri().path(), "Invalid API key");
        unauthorized("Invalid API key")
    })?;

    debug!(operator = %key.name, "API key authenticated");

    let auth_context = AuthContext {
        operator: key.name.clone(),
    };
    request.extensions_mut().insert(auth_context);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::{validate_api_key, verify_api_key};
    use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
    use argon2::Argon2;
    use phishsim_common::config::ApiKeyConfig;
    use sha2::{Digest, Sha256};

    fn sha256_hex(value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(value.as_bytes());
        hex::encode(hasher.finalize())
    }

    #[test]
    fn verifies_sha256_hash() {
        let api_key = "ps_test_sha_key";
        let hash = sha256_hex(api_key);

        assert!(verify_api_key(api_key, &hash));
        assert!(verify_api_key(api_key, &hash.to_uppercase()));
        assert!(!verify_api_key("wrong_key", &hash));
    }

    #[test]
    fn verifies_argon2_hash() {
        let api_key = "ps_test_argon2_key";
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(api_key.as_bytes(), &salt)
            .expect("argon2 hash generation should succeed")
            .to_string();

        assert!(verify_api_key(api_key, &hash));
        assert!(!verify_api_key("wrong_key", &hash));
    }

    #[test]
    fn resolves_operator_name() {
        let keys = vec![
            ApiKeyConfig {
                name: "soc".to_string(),
                hash: sha256_hex("soc-key"),
            },
            ApiKeyConfig {
                name: "red-team".to_string(),
                hash: sha256_hex("red-key"),
            },
        ];

        assert_eq!(validate_api_key(&keys, "red-key").map(|k| k.name.as_str()), Some("red-team"));
        assert!(validate_api_key(&keys, "nope").is_none());
        assert!(validate_api_key(&[], "soc-key").is_none());
    }
}
