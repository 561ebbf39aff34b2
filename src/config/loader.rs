//! Configuration structures and loading logic.

use crate::config::modes::DeliveryMode;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub download: DownloadConfig,

    #[serde(default)]
    pub request: RequestConfig,

    #[serde(default)]
    pub aria2: Aria2Config,
}

/// Download engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Directory the final files are written to.
    #[serde(default)]
    pub output_directory: Option<PathBuf>,

    /// How parts are fetched (segmented, single, delegate).
    #[serde(default)]
    pub mode: DeliveryMode,

    /// Number of concurrent segments per part.
    #[serde(default = "default_thread_number")]
    pub thread_number: usize,

    /// Attempts per chunk before a segment gives up.
    #[serde(default = "default_retry_times")]
    pub retry_times: u32,

    /// Size of each ranged request in MiB. 0 fetches the whole remaining range at once.
    #[serde(default)]
    pub chunk_size_mb: u64,

    /// Delay between attempts of the same chunk.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Maximum length of generated file names. 0 means unlimited.
    #[serde(default)]
    pub file_name_length: usize,

    /// Whether to download captions next to the media.
    #[serde(default)]
    pub caption: bool,

    /// Only download the best audio stream.
    #[serde(default)]
    pub audio_only: bool,

    /// Explicit stream id to download instead of the largest one.
    #[serde(default)]
    pub stream: Option<String>,

    /// Number of playlist items downloaded at the same time.
    #[serde(default = "default_playlist_concurrency")]
    pub playlist_concurrency: usize,

    /// Hide progress bars and merge notices.
    #[serde(default)]
    pub silent: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_directory: None,
            mode: DeliveryMode::default(),
            thread_number: default_thread_number(),
            retry_times: default_retry_times(),
            chunk_size_mb: 0,
            retry_delay_ms: default_retry_delay_ms(),
            file_name_length: 0,
            caption: false,
            audio_only: false,
            stream: None,
            playlist_concurrency: default_playlist_concurrency(),
            silent: false,
        }
    }
}

/// HTTP request configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Attempts per request before giving up.
    #[serde(default = "default_retry_times")]
    pub retry_times: u32,

    /// Delay between request attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Cookie header sent with every request.
    #[serde(default)]
    pub cookie: Option<String>,

    /// User agent overriding the built-in one.
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Referer overriding the per-request one.
    #[serde(default)]
    pub refer: Option<String>,

    /// Overall timeout of one request.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connect and TLS handshake timeout.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            retry_times: default_retry_times(),
            retry_delay_ms: default_retry_delay_ms(),
            cookie: None,
            user_agent: None,
            refer: None,
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// aria2 JSON-RPC daemon used in delegate mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aria2Config {
    /// RPC secret token.
    #[serde(default)]
    pub token: String,

    /// `http` or `https`.
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// `host:port` of the daemon.
    #[serde(default)]
    pub addr: Option<String>,
}

impl Default for Aria2Config {
    fn default() -> Self {
        Self {
            token: String::new(),
            scheme: default_scheme(),
            addr: None,
        }
    }
}

impl Aria2Config {
    /// The daemon's JSON-RPC endpoint.
    pub fn endpoint(&self) -> Result<String> {
        let addr = self
            .addr
            .as_deref()
            .filter(|a| !a.is_empty())
            .ok_or_else(|| Error::MissingConfig("aria2.addr".to_string()))?;
        Ok(format!("{}://{}/jsonrpc", self.scheme, addr))
    }
}

fn default_thread_number() -> usize {
    4
}

fn default_retry_times() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_playlist_concurrency() -> usize {
    2
}

fn default_timeout_secs() -> u64 {
    15 * 60
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_scheme() -> String {
    "http".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Config(format!(
                    "Configuration file not found: {}. Create one from config.example.toml",
                    path.display()
                ))
            } else {
                Error::Io(e)
            }
        })?;

        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the effective output directory.
    pub fn output_directory(&self) -> PathBuf {
        self.download
            .output_directory
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}

impl DownloadConfig {
    /// Size of one ranged request, or `None` for the whole remaining range.
    pub fn chunk_size(&self) -> Option<u64> {
        (self.chunk_size_mb > 0).then(|| self.chunk_size_mb * 1024 * 1024)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
