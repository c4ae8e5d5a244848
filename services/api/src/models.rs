//! API Models
//!
//! Response bodies of the credential intermediary, annotated for OpenAPI
//! generation with `utoipa`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SignedUrlStatus {
    Success,
    Fallback,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Ready,
    Missing,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentStatus::Ready => write!(f, "ready"),
            AgentStatus::Missing => write!(f, "missing"),
        }
    }
}

/// A signed, time-limited relay URL.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct SignedUrl {
    #[schema(example = "wss://api.elevenlabs.io/v1/convai/conversation?agent_id=agent_01jzwcew2ferttga9m1zcn3js1&conversation_signature=...")]
    pub signed_url: String,
    pub agent_id: String,
    #[schema(example = "success")]
    pub status: SignedUrlStatus,
}

/// Returned when no signed URL could be issued. Clients connect to
/// `fallback_url` instead.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct SignedUrlFallback {
    #[schema(example = "Failed to get signed URL")]
    pub error: String,
    #[schema(example = "wss://api.elevenlabs.io/v1/convai/conversation?agent_id=agent_01jzwcew2ferttga9m1zcn3js1")]
    pub fallback_url: String,
    pub agent_id: String,
    pub details: String,
    #[schema(example = "fallback")]
    pub status: SignedUrlStatus,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct AgentIdResponse {
    #[schema(example = "agent_01jzwcew2ferttga9m1zcn3js1")]
    pub agent_id: Option<String>,
    #[schema(example = "ready")]
    pub status: AgentStatus,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
    pub service: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub api_key_configured: bool,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct DiagnosticsResponse {
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub agent_id: Option<String>,
    pub api_key_configured: bool,
    pub provider_api_base: String,
    pub relay_endpoint: String,
    pub signed_url_requests: u64,
    pub signed_url_failures: u64,
    /// Most recent signed-URL failure, if any.
    pub last_error: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxbridge_core::credentials::{AgentIdentity, SignedUrlResponse};

    #[test]
    fn test_statuses_serialize_lowercase() {
        assert_eq!(
            serde_json::to_value(SignedUrlStatus::Fallback).unwrap(),
            "fallback"
        );
        assert_eq!(serde_json::to_value(AgentStatus::Ready).unwrap(), "ready");
        assert_eq!(AgentStatus::Missing.to_string(), "missing");
    }

    #[test]
    fn test_fallback_body_is_readable_by_client() {
        let body = SignedUrlFallback {
            error: "Failed to get signed URL".to_string(),
            fallback_url: "wss://relay.example.com/conv?agent_id=a1".to_string(),
            agent_id: "a1".to_string(),
            details: "Provider API returned HTTP 401".to_string(),
            status: SignedUrlStatus::Fallback,
        };

        let parsed: SignedUrlResponse =
            serde_json::from_value(serde_json::to_value(&body).unwrap()).unwrap();

        assert_eq!(parsed.signed_url, None);
        assert_eq!(
            parsed.fallback_url.as_deref(),
            Some("wss://relay.example.com/conv?agent_id=a1")
        );
        assert_eq!(parsed.status.as_deref(), Some("fallback"));
    }

    #[test]
    fn test_agent_body_is_readable_by_client() {
        let body = AgentIdResponse {
            agent_id: Some("a1".to_string()),
            status: AgentStatus::Ready,
        };

        let parsed: AgentIdentity =
            serde_json::from_value(serde_json::to_value(&body).unwrap()).unwrap();

        assert_eq!(parsed.ready_id(), Some("a1"));
    }
}
