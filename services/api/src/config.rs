use callbridge_core::session::DEFAULT_PENDING_AUDIO_LIMIT;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Credentials for placing outbound calls through Twilio.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    pub api_base: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Public host (no scheme) the telephony side uses to reach `/media-stream`.
    pub server_url: String,
    pub elevenlabs_api_key: String,
    pub elevenlabs_api_base: String,
    pub default_agent_id: Option<String>,
    pub twilio: Option<TwilioConfig>,
    pub log_level: Level,
    /// Budget for the signed-URL request and, separately, the agent socket handshake.
    pub bootstrap_timeout: Duration,
    pub pending_audio_limit: usize,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str = match (std::env::var("BIND_ADDRESS"), std::env::var("PORT")) {
            (Ok(address), _) => address,
            (Err(_), Ok(port)) => format!("0.0.0.0:{}", port),
            _ => "0.0.0.0:3000".to_string(),
        };
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let server_url = required_var("SERVER_URL").map(|url| normalize_host(&url))?;
        if server_url.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_URL".to_string(),
                "must name a host".to_string(),
            ));
        }

        let elevenlabs_api_key = required_var("ELEVENLABS_API_KEY")?;
        let elevenlabs_api_base = std::env::var("ELEVENLABS_API_BASE")
            .unwrap_or_else(|_| "https://api.elevenlabs.io".to_string());

        let default_agent_id = std::env::var("DEFAULT_AGENT_ID")
            .ok()
            .filter(|id| !id.trim().is_empty());

        let twilio = twilio_from_env()?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let bootstrap_timeout = Duration::from_secs(parse_var("BOOTSTRAP_TIMEOUT_SECS", 10)?);
        if bootstrap_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "BOOTSTRAP_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        let pending_audio_limit = parse_var("PENDING_AUDIO_LIMIT", DEFAULT_PENDING_AUDIO_LIMIT)?;

        Ok(Self {
            bind_address,
            server_url,
            elevenlabs_api_key,
            elevenlabs_api_base,
            default_agent_id,
            twilio,
            log_level,
            bootstrap_timeout,
            pending_audio_limit,
        })
    }
}

fn required_var(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
}

fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

/// Strips any scheme and trailing slash, leaving `host[:port][/path]`.
fn normalize_host(url: &str) -> String {
    let trimmed = url.trim();
    let without_scheme = ["https://", "http://", "wss://", "ws://"]
        .iter()
        .find_map(|scheme| trimmed.strip_prefix(scheme))
        .unwrap_or(trimmed);
    without_scheme.trim_end_matches('/').to_string()
}

/// Twilio credentials are all-or-nothing: outbound calls are simply disabled
/// when none are set.
fn twilio_from_env() -> Result<Option<TwilioConfig>, ConfigError> {
    let names = ["TWILIO_SID", "TWILIO_TOKEN", "FROM_NUMBER"];
    let values: Vec<Option<String>> = names
        .iter()
        .map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()))
        .collect();

    if values.iter().all(Option::is_none) {
        return Ok(None);
    }
    let missing: Vec<&str> = names
        .iter()
        .zip(&values)
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| *name)
        .collect();
    if !missing.is_empty() {
        return Err(ConfigError::MissingVar(format!(
            "{} (Twilio credentials must be set together)",
            missing.join(", ")
        )));
    }

    let mut values = values.into_iter().flatten();
    let (Some(account_sid), Some(auth_token), Some(from_number)) =
        (values.next(), values.next(), values.next())
    else {
        return Err(ConfigError::MissingVar("TWILIO_SID".to_string()));
    };
    let api_base =
        std::env::var("TWILIO_API_BASE").unwrap_or_else(|_| "https://api.twilio.com".to_string());

    Ok(Some(TwilioConfig {
        account_sid,
        auth_token,
        from_number,
        api_base,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tracing::Level;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("BIND_ADDRESS");
            env::remove_var("PORT");
            env::remove_var("SERVER_URL");
            env::remove_var("ELEVENLABS_API_KEY");
            env::remove_var("ELEVENLABS_API_BASE");
            env::remove_var("DEFAULT_AGENT_ID");
            env::remove_var("TWILIO_SID");
            env::remove_var("TWILIO_TOKEN");
            env::remove_var("FROM_NUMBER");
            env::remove_var("TWILIO_API_BASE");
            env::remove_var("RUST_LOG");
            env::remove_var("BOOTSTRAP_TIMEOUT_SECS");
            env::remove_var("PENDING_AUDIO_LIMIT");
        }
    }

    fn set_minimal_env() {
        unsafe {
            env::set_var("SERVER_URL", "relay.example.com");
            env::set_var("ELEVENLABS_API_KEY", "test-elevenlabs-key");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("relay.example.com"), "relay.example.com");
        assert_eq!(normalize_host("https://relay.example.com/"), "relay.example.com");
        assert_eq!(normalize_host(" wss://relay.example.com:8443 "), "relay.example.com:8443");
    }

    #[test]
    #[serial]
    fn test_config_from_env_minimal() {
        clear_env_vars();
        set_minimal_env();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:3000");
        assert_eq!(config.server_url, "relay.example.com");
        assert_eq!(config.elevenlabs_api_key, "test-elevenlabs-key");
        assert_eq!(config.elevenlabs_api_base, "https://api.elevenlabs.io");
        assert_eq!(config.default_agent_id, None);
        assert_eq!(config.twilio, None);
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.bootstrap_timeout, Duration::from_secs(10));
        assert_eq!(config.pending_audio_limit, DEFAULT_PENDING_AUDIO_LIMIT);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
            env::set_var("SERVER_URL", "https://calls.example.org/");
            env::set_var("ELEVENLABS_API_KEY", "custom-key");
            env::set_var("ELEVENLABS_API_BASE", "http://localhost:9000");
            env::set_var("DEFAULT_AGENT_ID", "agent-default");
            env::set_var("TWILIO_SID", "AC123");
            env::set_var("TWILIO_TOKEN", "secret");
            env::set_var("FROM_NUMBER", "+15550001111");
            env::set_var("RUST_LOG", "debug");
            env::set_var("BOOTSTRAP_TIMEOUT_SECS", "3");
            env::set_var("PENDING_AUDIO_LIMIT", "0");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(config.server_url, "calls.example.org");
        assert_eq!(config.elevenlabs_api_base, "http://localhost:9000");
        assert_eq!(config.default_agent_id.as_deref(), Some("agent-default"));
        assert_eq!(
            config.twilio,
            Some(TwilioConfig {
                account_sid: "AC123".to_string(),
                auth_token: "secret".to_string(),
                from_number: "+15550001111".to_string(),
                api_base: "https://api.twilio.com".to_string(),
            })
        );
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.bootstrap_timeout, Duration::from_secs(3));
        assert_eq!(config.pending_audio_limit, 0);
    }

    #[test]
    #[serial]
    fn test_config_port_fallback() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("PORT", "8081");
        }

        let config = Config::from_env().expect("Config should load successfully");
        assert_eq!(config.bind_address.to_string(), "0.0.0.0:8081");
    }

    #[test]
    #[serial]
    fn test_config_missing_api_key() {
        clear_env_vars();
        unsafe {
            env::set_var("SERVER_URL", "relay.example.com");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(var) => assert_eq!(var, "ELEVENLABS_API_KEY"),
            _ => panic!("Expected MissingVar for ELEVENLABS_API_KEY"),
        }
    }

    #[test]
    #[serial]
    fn test_config_missing_server_url() {
        clear_env_vars();
        unsafe {
            env::set_var("ELEVENLABS_API_KEY", "key");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(var) => assert_eq!(var, "SERVER_URL"),
            _ => panic!("Expected MissingVar for SERVER_URL"),
        }
    }

    #[test]
    #[serial]
    fn test_config_partial_twilio_credentials() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("TWILIO_SID", "AC123");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(msg) => {
                assert!(msg.contains("TWILIO_TOKEN"));
                assert!(msg.contains("FROM_NUMBER"));
                assert!(!msg.contains("TWILIO_SID"));
            }
            _ => panic!("Expected MissingVar for Twilio credentials"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_bind_address() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("BIND_ADDRESS", "not-a-valid-address");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "BIND_ADDRESS"),
            _ => panic!("Expected InvalidValue for BIND_ADDRESS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            _ => panic!("Expected InvalidValue for RUST_LOG"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_numeric_values() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("PENDING_AUDIO_LIMIT", "lots");
        }
        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "PENDING_AUDIO_LIMIT"),
            _ => panic!("Expected InvalidValue for PENDING_AUDIO_LIMIT"),
        }

        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("BOOTSTRAP_TIMEOUT_SECS", "0");
        }
        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "BOOTSTRAP_TIMEOUT_SECS"),
            _ => panic!("Expected InvalidValue for BOOTSTRAP_TIMEOUT_SECS"),
        }
    }
}
