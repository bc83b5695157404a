use super::ResilioConfig;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid value for {var}: '{value}'")]
    InvalidEnv { var: String, value: String },
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from default locations, then apply environment overrides:
    /// 1. ./resilio.yaml
    /// 2. ~/.resilio/config.yaml
    /// 3. Default configuration
    pub async fn load_default() -> Result<ResilioConfig, ConfigError> {
        let mut config = Self::load_file_default().await?;
        Self::apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
        Ok(config)
    }

    async fn load_file_default() -> Result<ResilioConfig, ConfigError> {
        let local_config = PathBuf::from("./resilio.yaml");
        if local_config.exists() {
            return Self::load_from(&local_config).await;
        }

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".resilio").join("config.yaml");
            if home_config.exists() {
                return Self::load_from(&home_config).await;
            }
        }

        Ok(ResilioConfig::default())
    }

    pub async fn load_from(path: &Path) -> Result<ResilioConfig, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: ResilioConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Overlay environment variables onto `config`. `lookup` resolves a
    /// variable name; empty values are ignored.
    pub fn apply_env_overrides<F>(config: &mut ResilioConfig, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let resilience = &mut config.resilience;
        if let Some(v) = get("RESILIENCE_FAIL_FAST_MS") {
            resilience.fail_fast_ms = parse("RESILIENCE_FAIL_FAST_MS", &v)?;
        }
        if let Some(v) = get("RESILIENCE_POLL_INTERVAL_MS") {
            resilience.poll_interval_ms = parse("RESILIENCE_POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = get("RESILIENCE_MAX_RETRIES") {
            resilience.max_retries = parse("RESILIENCE_MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("RESILIENCE_RETRY_BACKOFF_MS") {
            resilience.retry_backoff_ms = parse("RESILIENCE_RETRY_BACKOFF_MS", &v)?;
        }
        if let Some(v) = get("RESILIENCE_MAX_CANDIDATES") {
            resilience.max_candidates = parse("RESILIENCE_MAX_CANDIDATES", &v)?;
        }

        if let Some(v) = get("SELECTOR_STORE_PATH") {
            config.store.path = PathBuf::from(v);
        }
        if let Some(v) = get("SELECTOR_STORE_DEBOUNCE_MS") {
            config.store.debounce_ms = parse("SELECTOR_STORE_DEBOUNCE_MS", &v)?;
        }

        if let Some(v) = get("AGENT_FALLBACK_ENABLED") {
            config.fallback.enabled = parse_flag("AGENT_FALLBACK_ENABLED", &v)?;
        }
        if let Some(v) = get("AGENT_FALLBACK_MODEL") {
            config.fallback.model = v;
        }
        if let Some(v) = get("ANTHROPIC_API_KEY") {
            config.fallback.api_key = Some(v);
        }
        Ok(())
    }
}

fn parse<T: FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(var, value))
}

fn parse_flag(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, value)),
    }
}

fn invalid(var: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnv {
        var: var.to_string(),
        value: value.to_string(),
    }
}
