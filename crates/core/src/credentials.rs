//! Connection credential negotiation.
//!
//! The relay address is either a signed, time-limited URL issued by the
//! credential intermediary, the fallback URL the intermediary hands back when
//! signing fails, or a URL built locally from the endpoint template when the
//! intermediary cannot be reached at all.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};
use url::Url;

/// Body of the credential intermediary's `signed-url` response.
///
/// Success and failure share one shape; a missing `signed_url` is a failure
/// regardless of the HTTP status it arrived with.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct SignedUrlResponse {
    #[serde(default)]
    pub signed_url: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub fallback_url: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
}

/// Body of the agent identity provider's response.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct AgentIdentity {
    #[serde(default)]
    pub agent_id: Option<String>,
    pub status: String,
}

impl AgentIdentity {
    /// The agent id, if the provider reports it as ready to take connections.
    pub fn ready_id(&self) -> Option<&str> {
        match (&self.agent_id, self.status.as_str()) {
            (Some(id), "ready") if !id.is_empty() => Some(id),
            _ => None,
        }
    }
}

/// The trusted intermediary that brokers connection credentials.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Requests a signed relay URL. `Err` means the intermediary was unreachable
    /// or answered with something that is not a credential response.
    async fn signed_url(&self) -> Result<SignedUrlResponse>;

    /// Asks which agent this deployment serves and whether it is ready.
    async fn agent_identity(&self) -> Result<AgentIdentity>;
}

/// `CredentialSource` backed by the HTTP glue server.
pub struct HttpCredentialSource {
    client: reqwest::Client,
    credential_endpoint: String,
    agent_endpoint: String,
}

impl HttpCredentialSource {
    pub fn new(credential_endpoint: impl Into<String>, agent_endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            credential_endpoint: credential_endpoint.into(),
            agent_endpoint: agent_endpoint.into(),
        }
    }
}

#[async_trait]
impl CredentialSource for HttpCredentialSource {
    async fn signed_url(&self) -> Result<SignedUrlResponse> {
        let response = self
            .client
            .get(&self.credential_endpoint)
            .send()
            .await
            .context("Credential intermediary unreachable")?;
        let status = response.status();
        let body: SignedUrlResponse = response
            .json()
            .await
            .with_context(|| format!("Unreadable credential response (HTTP {status})"))?;
        Ok(body)
    }

    async fn agent_identity(&self) -> Result<AgentIdentity> {
        let identity = self
            .client
            .get(&self.agent_endpoint)
            .send()
            .await
            .context("Agent identity provider unreachable")?
            .json()
            .await
            .context("Unreadable agent identity response")?;
        Ok(identity)
    }
}

/// Which credential path produced the relay address. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlKind {
    /// Signed URL from the intermediary.
    Signed,
    /// Unsigned URL supplied by the intermediary after a signing failure.
    Fallback,
    /// Built locally because the intermediary could not be used.
    Direct,
}

impl fmt::Display for UrlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlKind::Signed => write!(f, "signed"),
            UrlKind::Fallback => write!(f, "fallback"),
            UrlKind::Direct => write!(f, "direct"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionUrl {
    pub url: String,
    pub kind: UrlKind,
}

/// Builds the unsigned relay URL: the template with `agent_id` set to `agent_id`.
pub fn direct_url(template: &str, agent_id: &str) -> Result<String> {
    let mut url = Url::parse(template)
        .with_context(|| format!("Invalid relay endpoint template '{template}'"))?;
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "agent_id")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair("agent_id", agent_id);
    Ok(url.into())
}

/// Resolves the relay address for one connect attempt.
///
/// Credential failures never fail the attempt; only an unusable endpoint
/// template does.
pub async fn negotiate(
    source: &dyn CredentialSource,
    template: &str,
    agent_id: &str,
) -> Result<ConnectionUrl> {
    match source.signed_url().await {
        Ok(SignedUrlResponse {
            signed_url: Some(url),
            ..
        }) if !url.is_empty() => {
            info!("Using signed relay URL.");
            Ok(ConnectionUrl {
                url,
                kind: UrlKind::Signed,
            })
        }
        Ok(response) => {
            warn!(
                error = response.error.as_deref().unwrap_or("missing signed_url"),
                details = response.details.as_deref().unwrap_or(""),
                "Credential intermediary could not sign a URL."
            );
            match response.fallback_url.filter(|url| !url.is_empty()) {
                Some(url) => Ok(ConnectionUrl {
                    url,
                    kind: UrlKind::Fallback,
                }),
                None => Ok(ConnectionUrl {
                    url: direct_url(template, agent_id)?,
                    kind: UrlKind::Direct,
                }),
            }
        }
        Err(e) => {
            warn!(error = %e, "Credential request failed; building relay URL locally.");
            Ok(ConnectionUrl {
                url: direct_url(template, agent_id)?,
                kind: UrlKind::Direct,
            })
        }
    }
}
