//! API request handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::dns::records::RecordGenerator;
use crate::error::IdentityError;
use crate::keys::spawn_generate_dkim_key;
use crate::settings::{SettingsPatch, SettingsStore};
use crate::verification::VerificationEngine;

/// Shared application state
pub struct AppState {
    pub store: SettingsStore,
    pub engine: VerificationEngine,
    pub generator: RecordGenerator,
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ApiError {
    pub fn new(msg: &str) -> Self {
        Self {
            error: msg.to_string(),
            code: None,
        }
    }

    pub fn with_code(msg: &str, code: &str) -> Self {
        Self {
            error: msg.to_string(),
            code: Some(code.to_string()),
        }
    }
}

/// Translate component errors to boundary-facing responses.
///
/// `not_configured` gets its own code so the consuming UI can prompt setup
/// instead of showing a failure banner.
fn error_response(err: IdentityError) -> Response {
    let (status, code) = match &err {
        IdentityError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
        IdentityError::NotConfigured => (StatusCode::CONFLICT, "not_configured"),
        IdentityError::StaleWrite => (StatusCode::CONFLICT, "stale_write"),
        IdentityError::ResolutionUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "resolution_unavailable")
        }
        IdentityError::KeyMaterial(_) => {
            warn!("Key material error: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "key_material")
        }
        _ => {
            warn!("Internal error: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "internal")
        }
    };

    (status, Json(ApiError::with_code(&err.to_string(), code))).into_response()
}

/// GET /health - liveness probe
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /email-config/:org_id - current configuration view
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<String>,
) -> Response {
    match state.store.get(&org_id).await {
        Ok(config) => (StatusCode::OK, Json(config)).into_response(),
        Err(e) => error_response(e),
    }
}

/// PUT /email-config/:org_id - apply a settings patch
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<String>,
    Json(patch): Json<SettingsPatch>,
) -> Response {
    let current = match state.store.get(&org_id).await {
        Ok(config) => config,
        Err(e) => return error_response(e),
    };

    match state.store.update(&org_id, &patch, current.revision).await {
        Ok(config) => (StatusCode::OK, Json(config)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /email-config/:org_id/dns-records - expected records to publish
///
/// Generates DKIM key material lazily on the first call for a domain.
pub async fn dns_records(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<String>,
) -> Response {
    let config = match state.store.get(&org_id).await {
        Ok(config) => config,
        Err(e) => return error_response(e),
    };

    let Some(domain) = config.domain.clone() else {
        return error_response(IdentityError::NotConfigured);
    };

    let provider = config.provider.clone();
    let key = match config.dkim_key() {
        Some(key) => key,
        None => {
            let material = match spawn_generate_dkim_key().await {
                Ok(material) => material,
                Err(e) => return error_response(e),
            };
            match state
                .store
                .set_dkim_key(&org_id, config.revision, &material)
                .await
            {
                Ok(_) => material,
                Err(e) => return error_response(e),
            }
        }
    };

    match state.generator.generate(&domain, &key, &provider) {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /email-config/:org_id/verify - run a verification attempt
///
/// Synchronous; blocks for at most the configured DNS lookup timeout.
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<String>,
) -> Response {
    match state.engine.verify(&org_id).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => error_response(e),
    }
}
