//! Provider Signed-URL Client
//!
//! Exchanges the server-held API key for a short-lived signed relay URL, so
//! the key itself never reaches a browser or native client.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

const SIGNED_URL_PATH: &str = "/v1/convai/conversation/get_signed_url";
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Issues signed relay URLs for an agent.
#[async_trait]
pub trait UrlSigner: Send + Sync {
    async fn signed_url(&self, agent_id: &str) -> Result<String>;
}

#[derive(Deserialize)]
struct ProviderSignedUrl {
    #[serde(default)]
    signed_url: Option<String>,
}

/// `UrlSigner` against the ElevenLabs REST API.
pub struct ElevenLabsSigner {
    client: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
}

impl ElevenLabsSigner {
    pub fn new(api_base: &str, api_key: &SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}{}", api_base.trim_end_matches('/'), SIGNED_URL_PATH),
            api_key: SecretString::from(api_key.expose_secret()),
        }
    }
}

#[async_trait]
impl UrlSigner for ElevenLabsSigner {
    #[instrument(skip(self))]
    async fn signed_url(&self, agent_id: &str) -> Result<String> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("agent_id", agent_id)])
            .header("xi-api-key", self.api_key.expose_secret())
            .timeout(PROVIDER_TIMEOUT)
            .send()
            .await
            .context("Provider API unreachable")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Provider API returned HTTP {}: {}", status.as_u16(), body);
        }

        let body: ProviderSignedUrl = response
            .json()
            .await
            .context("Unreadable provider response")?;
        let signed_url = body
            .signed_url
            .filter(|url| !url.is_empty())
            .context("Provider response carries no signed_url")?;
        debug!("Signed URL issued.");
        Ok(signed_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const AGENT: &str = "agent_01jzwcew2ferttga9m1zcn3js1";

    #[tokio::test]
    async fn test_signed_url_sends_key_and_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SIGNED_URL_PATH))
            .and(query_param("agent_id", AGENT))
            .and(header("xi-api-key", "sk_test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "signed_url": "wss://api.elevenlabs.io/v1/convai/conversation?agent_id=x&conversation_signature=sig"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let signer = ElevenLabsSigner::new(&format!("{}/", server.uri()), &SecretString::from("sk_test"));
        let url = signer.signed_url(AGENT).await.unwrap();

        assert!(url.contains("conversation_signature=sig"));
    }

    #[tokio::test]
    async fn test_signed_url_reports_provider_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SIGNED_URL_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_api_key"))
            .mount(&server)
            .await;

        let signer = ElevenLabsSigner::new(&server.uri(), &SecretString::from("sk_bad"));
        let err = signer.signed_url(AGENT).await.unwrap_err();

        let message = err.to_string();
        assert!(message.contains("401"));
        assert!(message.contains("invalid_api_key"));
    }

    #[tokio::test]
    async fn test_signed_url_missing_from_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SIGNED_URL_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let signer = ElevenLabsSigner::new(&server.uri(), &SecretString::from("sk_test"));

        assert!(signer.signed_url(AGENT).await.is_err());
    }
}
