use secrecy::SecretString;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;
use url::Url;

pub const DEFAULT_PROVIDER_API_BASE: &str = "https://api.elevenlabs.io";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Provider API key. Without it the server only hands out fallback URLs.
    pub elevenlabs_api_key: Option<SecretString>,
    pub agent_id: Option<String>,
    pub provider_api_base: String,
    /// Relay endpoint the fallback URL is built from.
    pub relay_endpoint: String,
    pub static_dir: PathBuf,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let elevenlabs_api_key = non_empty_var("ELEVENLABS_API_KEY").map(SecretString::from);
        let agent_id = non_empty_var("AGENT_ID");

        let provider_api_base = std::env::var("PROVIDER_API_BASE")
            .unwrap_or_else(|_| DEFAULT_PROVIDER_API_BASE.to_string());
        parse_url("PROVIDER_API_BASE", &provider_api_base, &["http", "https"])?;

        let relay_endpoint = std::env::var("RELAY_ENDPOINT")
            .unwrap_or_else(|_| voxbridge_core::config::DEFAULT_RELAY_ENDPOINT.to_string());
        parse_url("RELAY_ENDPOINT", &relay_endpoint, &["ws", "wss"])?;

        let static_dir = std::env::var("STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./static"));

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            elevenlabs_api_key,
            agent_id,
            provider_api_base,
            relay_endpoint,
            static_dir,
            log_level,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_url(name: &str, value: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("scheme must be one of {:?}", schemes),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::env;
    use tracing::Level;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("BIND_ADDRESS");
            env::remove_var("ELEVENLABS_API_KEY");
            env::remove_var("AGENT_ID");
            env::remove_var("PROVIDER_API_BASE");
            env::remove_var("RELAY_ENDPOINT");
            env::remove_var("STATIC_DIR");
            env::remove_var("RUST_LOG");
        }
    }

    #[test]
    fn test_config_error_display() {
        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_defaults() {
        clear_env_vars();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:3000");
        assert!(config.elevenlabs_api_key.is_none());
        assert_eq!(config.agent_id, None);
        assert_eq!(config.provider_api_base, "https://api.elevenlabs.io");
        assert_eq!(
            config.relay_endpoint,
            "wss://api.elevenlabs.io/v1/convai/conversation"
        );
        assert_eq!(config.static_dir, PathBuf::from("./static"));
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
            env::set_var("ELEVENLABS_API_KEY", "sk_test_key");
            env::set_var("AGENT_ID", "agent_01jzwcew2ferttga9m1zcn3js1");
            env::set_var("PROVIDER_API_BASE", "http://localhost:9000");
            env::set_var("RELAY_ENDPOINT", "ws://localhost:9001/relay");
            env::set_var("STATIC_DIR", "/srv/voxbridge");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(
            config.elevenlabs_api_key.as_ref().map(|k| k.expose_secret()),
            Some("sk_test_key")
        );
        assert_eq!(
            config.agent_id.as_deref(),
            Some("agent_01jzwcew2ferttga9m1zcn3js1")
        );
        assert_eq!(config.provider_api_base, "http://localhost:9000");
        assert_eq!(config.relay_endpoint, "ws://localhost:9001/relay");
        assert_eq!(config.static_dir, PathBuf::from("/srv/voxbridge"));
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn test_config_blank_values_are_unset() {
        clear_env_vars();
        unsafe {
            env::set_var("ELEVENLABS_API_KEY", "   ");
            env::set_var("AGENT_ID", "");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert!(config.elevenlabs_api_key.is_none());
        assert!(config.agent_id.is_none());
    }

    #[test]
    #[serial]
    fn test_config_key_is_redacted_in_debug() {
        clear_env_vars();
        unsafe {
            env::set_var("ELEVENLABS_API_KEY", "sk_super_secret");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert!(!format!("{:?}", config).contains("sk_super_secret"));
    }

    #[test]
    #[serial]
    fn test_config_invalid_bind_address() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "not-a-valid-address");
        }

        let err = Config::from_env().unwrap_err();
        let ConfigError::InvalidValue(var, _) = err;
        assert_eq!(var, "BIND_ADDRESS");
    }

    #[test]
    #[serial]
    fn test_config_invalid_relay_endpoint_scheme() {
        clear_env_vars();
        unsafe {
            env::set_var("RELAY_ENDPOINT", "https://api.elevenlabs.io/v1/convai/conversation");
        }

        let err = Config::from_env().unwrap_err();
        let ConfigError::InvalidValue(var, _) = err;
        assert_eq!(var, "RELAY_ENDPOINT");
    }

    #[test]
    #[serial]
    fn test_config_invalid_provider_base() {
        clear_env_vars();
        unsafe {
            env::set_var("PROVIDER_API_BASE", "not a url");
        }

        let err = Config::from_env().unwrap_err();
        let ConfigError::InvalidValue(var, _) = err;
        assert_eq!(var, "PROVIDER_API_BASE");
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        let ConfigError::InvalidValue(var, _) = err;
        assert_eq!(var, "RUST_LOG");
    }
}
