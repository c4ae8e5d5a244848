use anyhow::{Result, ensure};
use clap::Parser;
use std::time::Duration;
use tracing::Level;
use voxbridge_core::{
    SessionConfig,
    codec::DEFAULT_FRAME_SIZE,
    config::{DEFAULT_KEEP_ALIVE_INTERVAL, DEFAULT_RELAY_ENDPOINT},
};

/// Half-duplex voice client for the conversational relay.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// Credential intermediary issuing signed relay URLs.
    #[arg(
        long,
        env = "CREDENTIAL_ENDPOINT",
        default_value = "http://localhost:3000/api/signed-url"
    )]
    pub credential_endpoint: String,

    /// Agent identity provider, asked when no agent id is given.
    #[arg(
        long,
        env = "AGENT_ENDPOINT",
        default_value = "http://localhost:3000/api/agent-id"
    )]
    pub agent_endpoint: String,

    #[arg(long, env = "AGENT_ID")]
    pub agent_id: Option<String>,

    /// Relay endpoint used when no signed URL can be obtained.
    #[arg(long, env = "RELAY_ENDPOINT", default_value = DEFAULT_RELAY_ENDPOINT)]
    pub ws_endpoint: String,

    /// Conversation language override sent with the initiation message.
    #[arg(long, env = "CONVERSATION_LANGUAGE")]
    pub language: Option<String>,

    #[arg(
        long,
        env = "KEEP_ALIVE_SECS",
        default_value_t = DEFAULT_KEEP_ALIVE_INTERVAL.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub keep_alive_secs: u64,

    /// Samples per transmitted audio frame.
    #[arg(long, env = "FRAME_SIZE", default_value_t = DEFAULT_FRAME_SIZE)]
    pub frame_size: usize,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: Level,
}

impl Args {
    pub fn session_config(&self) -> Result<SessionConfig> {
        ensure!(self.frame_size > 0, "--frame-size must be positive");
        Ok(SessionConfig {
            agent_id: non_empty(&self.agent_id),
            ws_endpoint_template: self.ws_endpoint.clone(),
            credential_endpoint: self.credential_endpoint.clone(),
            agent_endpoint: self.agent_endpoint.clone(),
            keep_alive_interval: Duration::from_secs(self.keep_alive_secs),
            language: non_empty(&self.language),
            frame_size: self.frame_size,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("voxbridge").chain(args.iter().copied()))
            .expect("arguments should parse")
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]).session_config().unwrap();
        assert_eq!(config.credential_endpoint, "http://localhost:3000/api/signed-url");
        assert_eq!(config.ws_endpoint_template, DEFAULT_RELAY_ENDPOINT);
        assert_eq!(config.keep_alive_interval, Duration::from_secs(15));
        assert_eq!(config.frame_size, 4096);
    }

    #[test]
    fn test_flags_map_to_session_config() {
        let config = parse(&[
            "--agent-id",
            "agent_01jzwcew2ferttga9m1zcn3js1",
            "--ws-endpoint",
            "ws://localhost:9001/relay",
            "--language",
            "en",
            "--keep-alive-secs",
            "5",
        ])
        .session_config()
        .unwrap();

        assert_eq!(
            config.agent_id.as_deref(),
            Some("agent_01jzwcew2ferttga9m1zcn3js1")
        );
        assert_eq!(config.ws_endpoint_template, "ws://localhost:9001/relay");
        assert_eq!(config.language.as_deref(), Some("en"));
        assert_eq!(config.keep_alive_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_blank_agent_id_means_lookup() {
        let config = parse(&["--agent-id", "  "]).session_config().unwrap();
        assert_eq!(config.agent_id, None);
    }

    #[test]
    fn test_zero_keep_alive_is_rejected() {
        let result = Args::try_parse_from(["voxbridge", "--keep-alive-secs", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_frame_size_is_rejected() {
        assert!(parse(&["--frame-size", "0"]).session_config().is_err());
    }
}
