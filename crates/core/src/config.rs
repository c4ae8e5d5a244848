use crate::codec::DEFAULT_FRAME_SIZE;
use std::time::Duration;

pub const DEFAULT_RELAY_ENDPOINT: &str = "wss://api.elevenlabs.io/v1/convai/conversation";
pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Everything a `SessionController` needs to know up front.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Agent to converse with. When `None` the agent identity provider is asked
    /// on connect and must report the agent as ready.
    pub agent_id: Option<String>,
    /// Relay endpoint used to build an unsigned URL when no credential is available.
    pub ws_endpoint_template: String,
    /// Credential intermediary issuing signed relay URLs.
    pub credential_endpoint: String,
    /// Agent identity provider.
    pub agent_endpoint: String,
    pub keep_alive_interval: Duration,
    /// Optional `conversation_config_override.agent.language` for the initiation message.
    pub language: Option<String>,
    /// Samples per outbound frame.
    pub frame_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            agent_id: None,
            ws_endpoint_template: DEFAULT_RELAY_ENDPOINT.to_string(),
            credential_endpoint: "http://localhost:3000/api/signed-url".to_string(),
            agent_endpoint: "http://localhost:3000/api/agent-id".to_string(),
            keep_alive_interval: DEFAULT_KEEP_ALIVE_INTERVAL,
            language: None,
            frame_size: DEFAULT_FRAME_SIZE,
        }
    }
}
