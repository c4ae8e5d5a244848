//! Axum Handlers for the REST API
//!
//! This module contains the credential intermediary's endpoints: signed-URL
//! issuing, agent identity, health and diagnostics. It uses `utoipa` doc
//! comments to generate OpenAPI documentation.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};
use voxbridge_core::credentials::direct_url;

use crate::{
    models::{
        AgentIdResponse, AgentStatus, DiagnosticsResponse, ErrorResponse, HealthResponse,
        SignedUrl, SignedUrlFallback, SignedUrlStatus,
    },
    state::AppState,
};

pub enum ApiError {
    NotFound(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Issue a signed relay URL for the configured agent.
///
/// When no signed URL can be issued the body carries a `fallback_url` built
/// from the relay endpoint instead.
#[utoipa::path(
    get,
    path = "/api/signed-url",
    responses(
        (status = 200, description = "Signed URL issued, or no API key configured (fallback body)", body = SignedUrl),
        (status = 502, description = "Provider refused or was unreachable", body = SignedUrlFallback),
        (status = 404, description = "No agent configured", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn signed_url(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    state.stats.record_request();

    let agent_id = state
        .config
        .agent_id
        .clone()
        .ok_or_else(|| ApiError::NotFound("No agent is configured".to_string()))?;
    let fallback_url = direct_url(&state.config.relay_endpoint, &agent_id)?;

    let Some(signer) = state.signer.as_ref() else {
        warn!("API key not configured; handing out fallback URL.");
        state.stats.record_failure("API key not configured");
        let body = SignedUrlFallback {
            error: "API key not configured".to_string(),
            fallback_url,
            agent_id,
            details: "ELEVENLABS_API_KEY is not set on the server".to_string(),
            status: SignedUrlStatus::Fallback,
        };
        return Ok((StatusCode::OK, Json(body)).into_response());
    };

    match signer.signed_url(&agent_id).await {
        Ok(signed_url) => {
            info!(%agent_id, "Signed URL issued.");
            let body = SignedUrl {
                signed_url,
                agent_id,
                status: SignedUrlStatus::Success,
            };
            Ok((StatusCode::OK, Json(body)).into_response())
        }
        Err(e) => {
            let details = format!("{e:#}");
            warn!(%agent_id, error = %details, "Failed to get signed URL.");
            state.stats.record_failure(details.clone());
            let body = SignedUrlFallback {
                error: "Failed to get signed URL".to_string(),
                fallback_url,
                agent_id,
                details,
                status: SignedUrlStatus::Fallback,
            };
            Ok((StatusCode::BAD_GATEWAY, Json(body)).into_response())
        }
    }
}

/// Report which agent this deployment serves.
#[utoipa::path(
    get,
    path = "/api/agent-id",
    responses(
        (status = 200, description = "Agent identity", body = AgentIdResponse)
    )
)]
pub async fn agent_id(State(state): State<Arc<AppState>>) -> Json<AgentIdResponse> {
    let agent_id = state.config.agent_id.clone();
    let status = if agent_id.is_some() {
        AgentStatus::Ready
    } else {
        AgentStatus::Missing
    };
    Json(AgentIdResponse { agent_id, status })
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        api_key_configured: state.config.elevenlabs_api_key.is_some(),
    })
}

/// Configuration and signed-URL counters, without secrets.
#[utoipa::path(
    get,
    path = "/api/diagnostics",
    responses(
        (status = 200, description = "Diagnostic snapshot", body = DiagnosticsResponse)
    )
)]
pub async fn diagnostics(State(state): State<Arc<AppState>>) -> Json<DiagnosticsResponse> {
    let config = &state.config;
    Json(DiagnosticsResponse {
        timestamp: Utc::now(),
        uptime_seconds: state.uptime_seconds(),
        agent_id: config.agent_id.clone(),
        api_key_configured: config.elevenlabs_api_key.is_some(),
        provider_api_base: config.provider_api_base.clone(),
        relay_endpoint: config.relay_endpoint.clone(),
        signed_url_requests: state.stats.requests(),
        signed_url_failures: state.stats.failures(),
        last_error: state.stats.last_error(),
    })
}
