use campus_core::agent::DEFAULT_HISTORY_LIMIT;
use campus_core::llm_client::LLMSettings;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    /// Absent means the agent runs on rule-based replies only.
    pub groq_api_key: Option<String>,
    pub agent_model: String,
    pub llm_api_base: String,
    pub llm_timeout: Duration,
    pub history_limit: usize,
    pub log_level: Level,
}

fn parse_var<T>(name: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address = parse_var::<SocketAddr>("BIND_ADDRESS", "0.0.0.0:8000")?;

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://campus.db".to_string());

        let groq_api_key = std::env::var("GROQ_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        let agent_model =
            std::env::var("AGENT_MODEL").unwrap_or_else(|_| "llama-3.1-8b-instant".to_string());

        let llm_api_base = std::env::var("LLM_API_BASE")
            .unwrap_or_else(|_| "https://api.groq.com/openai/v1".to_string());

        let llm_timeout = Duration::from_secs(parse_var::<u64>("LLM_TIMEOUT_SECS", "30")?);

        let history_limit =
            parse_var::<usize>("HISTORY_LIMIT", &DEFAULT_HISTORY_LIMIT.to_string())?;
        if history_limit == 0 {
            return Err(ConfigError::InvalidValue(
                "HISTORY_LIMIT".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            database_url,
            groq_api_key,
            agent_model,
            llm_api_base,
            llm_timeout,
            history_limit,
            log_level,
        })
    }

    /// The subset of the configuration the remote model client needs.
    pub fn llm_settings(&self) -> LLMSettings {
        LLMSettings {
            api_key: self.groq_api_key.clone(),
            api_base: self.llm_api_base.clone(),
            model: self.agent_model.clone(),
            timeout: self.llm_timeout,
        }
    }
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
            env::remove_var("DATABASE_URL");
            env::remove_var("GROQ_API_KEY");
            env::remove_var("AGENT_MODEL");
            env::remove_var("LLM_API_BASE");
            env::remove_var("LLM_TIMEOUT_SECS");
            env::remove_var("HISTORY_LIMIT");
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
    fn test_config_defaults_without_api_key() {
        clear_env_vars();

        let config = Config::from_env().expect("Config should load without any variables");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:8000");
        assert_eq!(config.database_url, "sqlite://campus.db");
        assert_eq!(config.groq_api_key, None);
        assert_eq!(config.agent_model, "llama-3.1-8b-instant");
        assert_eq!(config.llm_api_base, "https://api.groq.com/openai/v1");
        assert_eq!(config.llm_timeout, Duration::from_secs(30));
        assert_eq!(config.history_limit, 10);
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
            env::set_var("DATABASE_URL", "sqlite:///var/lib/campus/campus.db");
            env::set_var("GROQ_API_KEY", "gsk_custom");
            env::set_var("AGENT_MODEL", "llama-3.3-70b-versatile");
            env::set_var("LLM_API_BASE", "http://localhost:11434/v1");
            env::set_var("LLM_TIMEOUT_SECS", "5");
            env::set_var("HISTORY_LIMIT", "4");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(config.database_url, "sqlite:///var/lib/campus/campus.db");
        assert_eq!(config.groq_api_key, Some("gsk_custom".to_string()));
        assert_eq!(config.agent_model, "llama-3.3-70b-versatile");
        assert_eq!(config.llm_api_base, "http://localhost:11434/v1");
        assert_eq!(config.llm_timeout, Duration::from_secs(5));
        assert_eq!(config.history_limit, 4);
        assert_eq!(config.log_level, Level::DEBUG);

        let settings = config.llm_settings();
        assert_eq!(settings.api_key.as_deref(), Some("gsk_custom"));
        assert_eq!(settings.model, "llama-3.3-70b-versatile");
        assert_eq!(settings.timeout, Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn test_config_blank_api_key_is_absent() {
        clear_env_vars();
        unsafe {
            env::set_var("GROQ_API_KEY", "  ");
        }

        let config = Config::from_env().expect("Config should load successfully");
        assert_eq!(config.groq_api_key, None);
    }

    #[test]
    #[serial]
    fn test_config_invalid_bind_address() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "not-a-valid-address");
        }

        let ConfigError::InvalidValue(var, _) = Config::from_env().unwrap_err();
        assert_eq!(var, "BIND_ADDRESS");
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let ConfigError::InvalidValue(var, _) = Config::from_env().unwrap_err();
        assert_eq!(var, "RUST_LOG");
    }

    #[test]
    #[serial]
    fn test_config_invalid_history_limit() {
        clear_env_vars();
        unsafe {
            env::set_var("HISTORY_LIMIT", "0");
        }
        let ConfigError::InvalidValue(var, _) = Config::from_env().unwrap_err();
        assert_eq!(var, "HISTORY_LIMIT");

        unsafe {
            env::set_var("HISTORY_LIMIT", "ten");
        }
        let ConfigError::InvalidValue(var, _) = Config::from_env().unwrap_err();
        assert_eq!(var, "HISTORY_LIMIT");
    }
}
