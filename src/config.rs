//! Configuration for memo-insight.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (MEMO_INSIGHT_API_URL, MEMO_INSIGHT_MAX_RECONNECTS)
//! 2. Config file (.memo-insight/config.yaml)
//! 3. Defaults
//!
//! Config file discovery:
//! - Searches current directory and parents for .memo-insight/config.yaml
//! - Falls back to ~/.memo-insight/config.yaml

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ingest::RetryPolicy;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const CONFIG_DIR: &str = ".memo-insight";
const CONFIG_FILE: &str = "config.yaml";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub stream: StreamSettings,
    #[serde(default)]
    pub recording: RecordingSettings,
}

/// Backend endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Scheme, host and port of the analysis backend
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Multipart upload endpoint
    #[serde(default = "default_upload_path")]
    pub upload_path: String,

    /// Event stream endpoint; `{session_id}` is substituted
    #[serde(default = "default_stream_path")]
    pub stream_path: String,

    /// Upload request timeout (the stream itself has none)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_upload_path() -> String {
    "/api/audio/capture".to_string()
}
fn default_stream_path() -> String {
    "/api/audio/stream/{session_id}".to_string()
}
fn default_request_timeout() -> u64 {
    120
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            upload_path: default_upload_path(),
            stream_path: default_stream_path(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl ApiSettings {
    pub fn upload_url(&self) -> String {
        join_url(&self.base_url, &self.upload_path)
    }

    pub fn stream_url(&self, session_id: &str) -> String {
        join_url(
            &self.base_url,
            &self.stream_path.replace("{session_id}", session_id),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Reconnect behaviour of the event stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamSettings {
    #[serde(default)]
    pub retry_policy: RetryPolicy,
}

/// Recording limits and timer rates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingSettings {
    /// Hard cap on a single recording (default: 60)
    #[serde(default = "default_max_duration")]
    pub max_duration_seconds: u64,

    /// Waveform window size (default: 40)
    #[serde(default = "default_max_bars")]
    pub max_bars: usize,

    /// Elapsed-time clock period (default: 1000 = 1 Hz)
    #[serde(default = "default_clock_interval")]
    pub clock_interval_ms: u64,

    /// Metering sampler period (default: 100 = 10 Hz)
    #[serde(default = "default_metering_interval")]
    pub metering_interval_ms: u64,
}

fn default_max_duration() -> u64 {
    60
}
fn default_max_bars() -> usize {
    crate::recording::DEFAULT_MAX_BARS
}
fn default_clock_interval() -> u64 {
    1000
}
fn default_metering_interval() -> u64 {
    100
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            max_duration_seconds: default_max_duration(),
            max_bars: default_max_bars(),
            clock_interval_ms: default_clock_interval(),
            metering_interval_ms: default_metering_interval(),
        }
    }
}

/// Resolved configuration
#[derive(Debug, Clone, Default)]
pub struct ResolvedConfig {
    pub api: ApiSettings,
    pub stream: StreamSettings,
    pub recording: RecordingSettings,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

/// Find config file by searching current directory and parents, then home
fn find_config_file() -> Option<PathBuf> {
    if let Ok(mut current) = std::env::current_dir() {
        loop {
            let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
            if config_path.exists() {
                return Some(config_path);
            }

            if !current.pop() {
                break;
            }
        }
    }

    let home_config = dirs::home_dir()?.join(CONFIG_DIR).join(CONFIG_FILE);
    home_config.exists().then_some(home_config)
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse YAML config content
pub fn parse_config(content: &str) -> Result<ConfigFile> {
    if content.trim().is_empty() {
        return Ok(ConfigFile::default());
    }
    Ok(serde_yaml::from_str(content)?)
}

/// Apply environment overrides on top of file values
fn apply_env(config: &mut ResolvedConfig) -> Result<()> {
    if let Ok(url) = std::env::var("MEMO_INSIGHT_API_URL") {
        config.api.base_url = url;
    }

    if let Ok(value) = std::env::var("MEMO_INSIGHT_MAX_RECONNECTS") {
        config.stream.retry_policy.max_attempts = value
            .parse()
            .with_context(|| format!("Invalid MEMO_INSIGHT_MAX_RECONNECTS: {}", value))?;
    }

    Ok(())
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let config_file = find_config_file();

    let file = match config_file {
        Some(ref path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    let mut config = ResolvedConfig {
        api: file.api,
        stream: file.stream,
        recording: file.recording,
        config_file,
    };
    apply_env(&mut config)?;

    Ok(config)
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}
