use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResilioConfig {
    #[serde(default)]
    pub resilience: ResilienceConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub packs: PacksConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    #[serde(default = "default_fail_fast_ms")]
    pub fail_fast_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
}

impl ResilienceConfig {
    pub fn fail_fast(&self) -> Duration {
        Duration::from_millis(self.fail_fast_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            fail_fast_ms: default_fail_fast_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_candidates: default_max_candidates(),
        }
    }
}

fn default_fail_fast_ms() -> u64 {
    3000
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_max_candidates() -> usize {
    8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_max_learned_per_action")]
    pub max_learned_per_action: usize,
    #[serde(default = "default_prune_max_age_days")]
    pub prune_max_age_days: u64,
}

impl StoreConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn prune_max_age(&self) -> Duration {
        Duration::from_secs(self.prune_max_age_days * 86_400)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            debounce_ms: default_debounce_ms(),
            max_learned_per_action: default_max_learned_per_action(),
            prune_max_age_days: default_prune_max_age_days(),
        }
    }
}

fn default_store_path() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(".resilio").join("selector-cache.json"),
        None => PathBuf::from("./selector-cache.json"),
    }
}

fn default_debounce_ms() -> u64 {
    2000
}

fn default_max_learned_per_action() -> usize {
    8
}

fn default_prune_max_age_days() -> u64 {
    30
}

#[derive(Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_fallback_model")]
    pub model: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_fallback_base_url")]
    pub base_url: String,
    #[serde(default = "default_fallback_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_max_structure_chars")]
    pub max_structure_chars: usize,
    #[serde(default = "default_max_screenshot_bytes")]
    pub max_screenshot_bytes: usize,
}

impl FallbackConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: default_fallback_model(),
            api_key: None,
            base_url: default_fallback_base_url(),
            timeout_ms: default_fallback_timeout_ms(),
            jpeg_quality: default_jpeg_quality(),
            max_structure_chars: default_max_structure_chars(),
            max_screenshot_bytes: default_max_screenshot_bytes(),
        }
    }
}

// Keep the API key out of logs.
impl fmt::Debug for FallbackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackConfig")
            .field("enabled", &self.enabled)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .field("timeout_ms", &self.timeout_ms)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("max_structure_chars", &self.max_structure_chars)
            .field("max_screenshot_bytes", &self.max_screenshot_bytes)
            .finish()
    }
}

fn default_fallback_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_fallback_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_fallback_timeout_ms() -> u64 {
    30000
}

fn default_jpeg_quality() -> u8 {
    50
}

fn default_max_structure_chars() -> usize {
    5000
}

fn default_max_screenshot_bytes() -> usize {
    1024 * 1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacksConfig {
    #[serde(default = "default_pack_paths")]
    pub paths: Vec<PathBuf>,
}

impl Default for PacksConfig {
    fn default() -> Self {
        Self {
            paths: default_pack_paths(),
        }
    }
}

fn default_pack_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".resilio").join("packs"));
    }
    paths.push(PathBuf::from("./packs"));
    paths
}
