// PromptChain — Replay stored prompt workflows into a chat surface
// License: Apache-2.0

use crate::engine::Timing;
use crate::surface::{SurfaceLocator, UrlPattern};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("home directory not found")]
    NoHomeDir,
    #[error("invalid config value: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> String {
    "~/.promptchain/workflows.json".to_string()
}

// ---------------------------------------------------------------------------
// Target page
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Pages whose URL matches one of these globs are eligible targets.
    #[serde(default = "default_url_patterns")]
    pub url_patterns: Vec<String>,
    /// Tried in order; the first match is the input.
    #[serde(default = "default_input_selectors")]
    pub input_selectors: Vec<String>,
    /// Presence of any of these means a reply is still being generated.
    #[serde(default = "default_busy_selectors")]
    pub busy_selectors: Vec<String>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            url_patterns: default_url_patterns(),
            input_selectors: default_input_selectors(),
            busy_selectors: default_busy_selectors(),
        }
    }
}

fn default_url_patterns() -> Vec<String> {
    vec![
        "https://chat.openai.com/*".to_string(),
        "https://chatgpt.com/*".to_string(),
    ]
}
fn default_input_selectors() -> Vec<String> {
    vec![
        r#"textarea[data-id="root"]"#.to_string(),
        "#prompt-textarea".to_string(),
        r#"textarea[placeholder*="Message"]"#.to_string(),
        "main textarea".to_string(),
    ]
}
fn default_busy_selectors() -> Vec<String> {
    vec![
        r#"button[aria-label*="Stop"]"#.to_string(),
        r#"[data-testid*="loading"]"#.to_string(),
    ]
}

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// 0 waits forever.
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            initial_delay_ms: default_initial_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            max_wait_secs: default_max_wait_secs(),
        }
    }
}

fn default_settle_delay_ms() -> u64 {
    500
}
fn default_initial_delay_ms() -> u64 {
    3000
}
fn default_poll_interval_ms() -> u64 {
    2000
}
fn default_max_wait_secs() -> u64 {
    600
}

// ---------------------------------------------------------------------------
// Chat endpoint
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_base: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    /// URL the endpoint is presented under when matching target pages.
    #[serde(default = "default_page_url")]
    pub page_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: String::new(),
            model: default_chat_model(),
            page_url: default_page_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_page_url() -> String {
    "https://chatgpt.com/".to_string()
}
fn default_request_timeout_secs() -> u64 {
    120
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a JSON file, falling back to defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            serde_json::from_str(&contents)?
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Config::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (prefix: PROMPTCHAIN_)
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PROMPTCHAIN_STORE_PATH") {
            self.store.path = v;
        }
        if let Ok(v) = std::env::var("PROMPTCHAIN_CHAT_API_KEY") {
            self.chat.api_key = v;
        }
        if let Ok(v) = std::env::var("PROMPTCHAIN_CHAT_API_BASE") {
            self.chat.api_base = v;
        }
        if let Ok(v) = std::env::var("PROMPTCHAIN_CHAT_MODEL") {
            self.chat.model = v;
        }
        if let Ok(v) = std::env::var("PROMPTCHAIN_TIMING_MAX_WAIT_SECS") {
            if let Ok(n) = v.parse() {
                self.timing.max_wait_secs = n;
            }
        }
        if let Ok(v) = std::env::var("PROMPTCHAIN_TIMING_POLL_INTERVAL_MS") {
            if let Ok(n) = v.parse() {
                self.timing.poll_interval_ms = n;
            }
        }
    }

    /// Get the default config file path: ~/.promptchain/config.json
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".promptchain").join("config.json"))
    }

    /// Resolve the store path, expanding `~` to home directory.
    pub fn store_path(&self) -> Result<PathBuf, ConfigError> {
        let p = &self.store.path;
        if let Some(stripped) = p.strip_prefix('~') {
            let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
            Ok(home.join(p.strip_prefix("~/").unwrap_or(stripped)))
        } else {
            Ok(PathBuf::from(p))
        }
    }

    pub fn timing(&self) -> Timing {
        let t = &self.timing;
        Timing {
            settle_delay: Duration::from_millis(t.settle_delay_ms),
            initial_delay: Duration::from_millis(t.initial_delay_ms),
            poll_interval: Duration::from_millis(t.poll_interval_ms),
            max_wait: (t.max_wait_secs > 0).then(|| Duration::from_secs(t.max_wait_secs)),
        }
    }

    pub fn locator(&self) -> SurfaceLocator {
        SurfaceLocator::new(
            self.target.input_selectors.clone(),
            self.target.busy_selectors.clone(),
        )
    }

    pub fn url_patterns(&self) -> Result<Vec<UrlPattern>, ConfigError> {
        self.target
            .url_patterns
            .iter()
            .map(|p| {
                UrlPattern::new(p)
                    .map_err(|e| ConfigError::Invalid(format!("url pattern '{}': {}", p, e)))
            })
            .collect()
    }

    /// Validate configuration for basic correctness.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.url_patterns.is_empty() {
            return Err(ConfigError::Invalid(
                "target.url_patterns must not be empty".to_string(),
            ));
        }
        if self.target.input_selectors.is_empty() {
            return Err(ConfigError::Invalid(
                "target.input_selectors must not be empty".to_string(),
            ));
        }
        if self.target.busy_selectors.is_empty() {
            return Err(ConfigError::Invalid(
                "target.busy_selectors must not be empty".to_string(),
            ));
        }
        if self.timing.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "timing.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        self.url_patterns()?;

        if self.chat.api_key.is_empty() {
            tracing::warn!("chat.api_key is empty; requests are sent without authorization");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
