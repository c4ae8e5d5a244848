//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, the static browser client, and OpenAPI
//! documentation.

use crate::{
    handlers,
    models::{
        AgentIdResponse, AgentStatus, DiagnosticsResponse, ErrorResponse, HealthResponse,
        SignedUrl, SignedUrlFallback, SignedUrlStatus,
    },
    state::AppState,
};

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::services::ServeDir;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::signed_url,
        handlers::agent_id,
        handlers::health,
        handlers::diagnostics,
    ),
    components(
        schemas(SignedUrl, SignedUrlFallback, SignedUrlStatus, AgentIdResponse, AgentStatus, HealthResponse, DiagnosticsResponse, ErrorResponse)
    ),
    tags(
        (name = "VoxBridge API", description = "Credential intermediary for the conversational voice relay")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let static_dir = app_state.config.static_dir.clone();

    let api_router = Router::new()
        .route("/api/signed-url", get(handlers::signed_url))
        .route("/api/agent-id", get(handlers::agent_id))
        .route("/api/diagnostics", get(handlers::diagnostics))
        .route("/health", get(handlers::health))
        .with_state(app_state);

    // Anything not matched above is looked up in the static directory,
    // so `/` serves the browser client's index.html.
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
        .fallback_service(ServeDir::new(static_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, signer::UrlSigner};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use secrecy::SecretString;
    use serde_json::Value;
    use std::path::PathBuf;
    use tower::util::ServiceExt;
    use voxbridge_core::credentials::SignedUrlResponse;

    const AGENT: &str = "agent_01jzwcew2ferttga9m1zcn3js1";

    struct StaticSigner(Result<String, String>);

    #[async_trait]
    impl UrlSigner for StaticSigner {
        async fn signed_url(&self, agent_id: &str) -> anyhow::Result<String> {
            match &self.0 {
                Ok(url) => Ok(format!("{url}?agent_id={agent_id}&conversation_signature=sig")),
                Err(e) => Err(anyhow!(e.clone())),
            }
        }
    }

    fn test_config(with_key: bool, agent_id: Option<&str>, static_dir: PathBuf) -> Config {
        Config {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            elevenlabs_api_key: with_key.then(|| SecretString::from("sk_test")),
            agent_id: agent_id.map(str::to_string),
            provider_api_base: "https://api.elevenlabs.io".to_string(),
            relay_endpoint: "wss://api.elevenlabs.io/v1/convai/conversation".to_string(),
            static_dir,
            log_level: tracing::Level::INFO,
        }
    }

    fn app(config: Config, signer: Option<StaticSigner>) -> (Router, Arc<AppState>) {
        let signer = signer.map(|s| Arc::new(s) as Arc<dyn UrlSigner>);
        let state = Arc::new(AppState::new(config, signer));
        (create_router(state.clone()), state)
    }

    async fn get(router: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, Value) {
        let (status, body) = get(router, uri).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_signed_url_success() {
        let signer = StaticSigner(Ok("wss://api.elevenlabs.io/v1/convai/conversation".into()));
        let (router, state) = app(test_config(true, Some(AGENT), PathBuf::from(".")), Some(signer));

        let (status, body) = get_json(router, "/api/signed-url").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["agent_id"], AGENT);
        assert!(
            body["signed_url"]
                .as_str()
                .unwrap()
                .contains("conversation_signature=sig")
        );
        assert_eq!(state.stats.requests(), 1);
        assert_eq!(state.stats.failures(), 0);
    }

    #[tokio::test]
    async fn test_signed_url_provider_failure_is_bad_gateway_with_fallback() {
        let signer = StaticSigner(Err("Provider API returned HTTP 401: invalid_api_key".into()));
        let (router, state) = app(test_config(true, Some(AGENT), PathBuf::from(".")), Some(signer));

        let (status, body) = get_json(router, "/api/signed-url").await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["status"], "fallback");
        assert_eq!(body["error"], "Failed to get signed URL");
        assert_eq!(
            body["fallback_url"],
            format!("wss://api.elevenlabs.io/v1/convai/conversation?agent_id={AGENT}")
        );
        assert!(body["details"].as_str().unwrap().contains("401"));
        assert_eq!(state.stats.failures(), 1);
        assert!(state.stats.last_error().unwrap().contains("invalid_api_key"));

        // The client reads the fallback even though the status is not 2xx.
        let parsed: SignedUrlResponse = serde_json::from_value(body).unwrap();
        assert!(parsed.signed_url.is_none());
        assert!(parsed.fallback_url.is_some());
    }

    #[tokio::test]
    async fn test_signed_url_without_key_is_ok_fallback() {
        let (router, _) = app(test_config(false, Some(AGENT), PathBuf::from(".")), None);

        let (status, body) = get_json(router, "/api/signed-url").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "fallback");
        assert_eq!(body["error"], "API key not configured");
        assert!(body.get("signed_url").is_none());
    }

    #[tokio::test]
    async fn test_signed_url_without_agent_is_not_found() {
        let (router, _) = app(test_config(false, None, PathBuf::from(".")), None);

        let (status, body) = get_json(router, "/api/signed-url").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "No agent is configured");
    }

    #[tokio::test]
    async fn test_agent_id_ready_and_missing() {
        let (router, _) = app(test_config(false, Some(AGENT), PathBuf::from(".")), None);
        let (_, body) = get_json(router, "/api/agent-id").await;
        assert_eq!(body["agent_id"], AGENT);
        assert_eq!(body["status"], "ready");

        let (router, _) = app(test_config(false, None, PathBuf::from(".")), None);
        let (_, body) = get_json(router, "/api/agent-id").await;
        assert!(body["agent_id"].is_null());
        assert_eq!(body["status"], "missing");
    }

    #[tokio::test]
    async fn test_health() {
        let (router, _) = app(test_config(true, Some(AGENT), PathBuf::from(".")), None);

        let (status, body) = get_json(router, "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "voxbridge-api");
        assert_eq!(body["api_key_configured"], true);
        assert!(body["uptime_seconds"].is_u64());
    }

    #[tokio::test]
    async fn test_diagnostics_never_leaks_key() {
        let (router, state) = app(test_config(true, Some(AGENT), PathBuf::from(".")), None);
        state.stats.record_request();
        state.stats.record_failure("HTTP 500");

        let (status, raw) = get(router, "/api/diagnostics").await;
        let body: Value = serde_json::from_slice(&raw).unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["signed_url_requests"], 1);
        assert_eq!(body["signed_url_failures"], 1);
        assert_eq!(body["last_error"], "HTTP 500");
        assert_eq!(body["agent_id"], AGENT);
        assert!(body["timestamp"].is_string());
        assert!(!String::from_utf8(raw).unwrap().contains("sk_test"));
    }

    #[tokio::test]
    async fn test_static_index_is_served() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>voice</h1>").unwrap();
        let (router, _) = app(test_config(false, None, dir.path().to_path_buf()), None);

        let (status, body) = get(router, "/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"<h1>voice</h1>");
    }

    #[tokio::test]
    async fn test_bundled_client_replaces_a_live_session_on_connect() {
        let static_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("static");
        let (router, _) = app(test_config(false, None, static_dir), None);

        let (status, body) = get(router, "/").await;
        let page = String::from_utf8(body).unwrap();

        assert_eq!(status, StatusCode::OK);
        assert!(page.contains("if (state !== 'disconnected') teardown();"));
        assert!(page.contains("if (gen !== generation) return;"));
        // Interruption and teardown stop scheduled sources rather than just forgetting them.
        assert!(page.contains("source.stop()"));
        assert!(page.matches("stopPlayback();").count() >= 2);
    }

    #[tokio::test]
    async fn test_openapi_document_lists_endpoints() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        for expected in ["/api/signed-url", "/api/agent-id", "/health", "/api/diagnostics"] {
            assert!(paths.iter().any(|p| p.as_str() == expected), "{expected}");
        }
    }
}
