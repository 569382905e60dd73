use anyhow::{Context, Result};
use directories::ProjectDirs;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::{Backoff, OutputFormat, RetryPolicy, MAX_UPLOAD_BYTES};

/// Environment variable holding the upstream credential
pub const API_KEY_ENV: &str = "FAL_KEY";

/// Environment variable overriding `client.gateway_url`
pub const GATEWAY_URL_ENV: &str = "MAGIC_GATEWAY_URL";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub output: OutputConfig,

    #[serde(skip)]
    pub config_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_submit_url")]
    pub submit_url: String,
    #[serde(default = "default_requests_url")]
    pub requests_url: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub gateway_url: Option<String>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Extra wait added after each poll; 0 keeps the interval fixed
    #[serde(default)]
    pub poll_backoff_ms: u64,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    #[serde(default)]
    pub output_format: OutputFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_directory")]
    pub directory: String,
    #[serde(default = "default_true")]
    pub auto_download: bool,
    #[serde(default = "default_display")]
    pub display: DisplayMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Terminal,
    None,
}

impl DisplayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayMode::Terminal => "terminal",
            DisplayMode::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "terminal" => Some(DisplayMode::Terminal),
            "none" => Some(DisplayMode::None),
            _ => None,
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &["terminal", "none"]
    }
}

// Default value functions
fn default_listen() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_submit_url() -> String {
    "https://queue.fal.run/fal-ai/nano-banana/edit".to_string()
}

fn default_requests_url() -> String {
    "https://queue.fal.run/fal-ai/nano-banana/requests".to_string()
}

fn default_max_body_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_max_attempts() -> u32 {
    crate::core::poll::DEFAULT_MAX_ATTEMPTS
}

fn default_poll_interval_ms() -> u64 {
    crate::core::poll::DEFAULT_POLL_INTERVAL.as_millis() as u64
}

fn default_max_upload_bytes() -> u64 {
    MAX_UPLOAD_BYTES
}

fn default_output_directory() -> String {
    "./picture-magic-output".to_string()
}

fn default_true() -> bool {
    true
}

fn default_display() -> DisplayMode {
    DisplayMode::Terminal
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            submit_url: default_submit_url(),
            requests_url: default_requests_url(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            gateway_url: None,
            max_attempts: default_max_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_backoff_ms: 0,
            max_upload_bytes: default_max_upload_bytes(),
            output_format: OutputFormat::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            auto_download: true,
            display: DisplayMode::Terminal,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            client: ClientConfig::default(),
            output: OutputConfig::default(),
            config_path: PathBuf::new(),
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "picture-magic", "picture-magic")
            .context("Failed to determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get the config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from file or create default
    pub fn load_or_create() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            let mut config: Config = toml::from_str(&content)
                .context("Failed to parse config file")?;
            config.config_path = config_path;
            config
        } else {
            let mut config = Config::default();
            config.config_path = config_path;
            config.save()?;
            config
        };

        // Environment variable takes precedence
        if let Ok(url) = std::env::var(GATEWAY_URL_ENV) {
            if !url.trim().is_empty() {
                config.client.gateway_url = Some(url);
            }
        }

        Ok(config)
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;
        fs::write(&self.config_path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Upstream credential, read from the process environment only
    pub fn api_key() -> Option<SecretString> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from)
    }

    /// Gateway base URL with any trailing slash removed
    pub fn gateway_url(&self) -> Option<&str> {
        self.client
            .gateway_url
            .as_deref()
            .map(|u| u.trim().trim_end_matches('/'))
            .filter(|u| !u.is_empty())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::new(
            self.client.max_attempts,
            Duration::from_millis(self.client.poll_interval_ms),
        );
        match self.client.poll_backoff_ms {
            0 => policy,
            step => policy.with_backoff(Backoff::Linear {
                step: Duration::from_millis(step),
            }),
        }
    }

    /// Set a config value by key path (e.g., "client.gateway_url")
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "gateway.listen" => {
                value
                    .parse::<std::net::SocketAddr>()
                    .context("Invalid listen address (expected host:port)")?;
                self.gateway.listen = value.to_string();
            }
            "gateway.submit_url" => self.gateway.submit_url = value.to_string(),
            "gateway.requests_url" => self.gateway.requests_url = value.to_string(),
            "gateway.max_body_bytes" => {
                self.gateway.max_body_bytes = value.parse()
                    .context("Invalid byte count")?;
            }
            "client.gateway_url" => {
                self.client.gateway_url = if value.trim().is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "client.max_attempts" => {
                let attempts: u32 = value.parse().context("Invalid attempt count")?;
                if attempts == 0 {
                    anyhow::bail!("client.max_attempts must be at least 1");
                }
                self.client.max_attempts = attempts;
            }
            "client.poll_interval_ms" => {
                self.client.poll_interval_ms = value.parse()
                    .context("Invalid interval")?;
            }
            "client.poll_backoff_ms" => {
                self.client.poll_backoff_ms = value.parse()
                    .context("Invalid interval")?;
            }
            "client.max_upload_bytes" => {
                self.client.max_upload_bytes = value.parse()
                    .context("Invalid byte count")?;
            }
            "client.output_format" => {
                self.client.output_format = OutputFormat::parse(value).with_context(|| {
                    format!("Invalid output format. Valid values: {}", OutputFormat::variants().join(", "))
                })?;
            }
            "output.directory" => self.output.directory = value.to_string(),
            "output.auto_download" => {
                self.output.auto_download = value.parse()
                    .context("Invalid boolean value")?;
            }
            "output.display" => {
                self.output.display = DisplayMode::parse(value).with_context(|| {
                    format!("Invalid display mode. Valid values: {}", DisplayMode::variants().join(", "))
                })?;
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        Ok(())
    }

    /// Get a config value by key path
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "gateway.listen" => Some(self.gateway.listen.clone()),
            "gateway.submit_url" => Some(self.gateway.submit_url.clone()),
            "gateway.requests_url" => Some(self.gateway.requests_url.clone()),
            "gateway.max_body_bytes" => Some(self.gateway.max_body_bytes.to_string()),
            "client.gateway_url" => Some(self.client.gateway_url.clone().unwrap_or_default()),
            "client.max_attempts" => Some(self.client.max_attempts.to_string()),
            "client.poll_interval_ms" => Some(self.client.poll_interval_ms.to_string()),
            "client.poll_backoff_ms" => Some(self.client.poll_backoff_ms.to_string()),
            "client.max_upload_bytes" => Some(self.client.max_upload_bytes.to_string()),
            "client.output_format" => Some(self.client.output_format.to_string()),
            "output.directory" => Some(self.output.directory.clone()),
            "output.auto_download" => Some(self.output.auto_download.to_string()),
            "output.display" => Some(self.output.display.as_str().to_string()),
            _ => None,
        }
    }

    /// Get all config keys
    pub fn keys() -> &'static [&'static str] {
        &[
            "gateway.listen",
            "gateway.submit_url",
            "gateway.requests_url",
            "gateway.max_body_bytes",
            "client.gateway_url",
            "client.max_attempts",
            "client.poll_interval_ms",
            "client.poll_backoff_ms",
            "client.max_upload_bytes",
            "client.output_format",
            "output.directory",
            "output.auto_download",
            "output.display",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.client.max_attempts, 60);
        assert_eq!(parsed.client.poll_interval_ms, 2000);
        assert_eq!(parsed.gateway.listen, "127.0.0.1:8787");
        assert!(parsed.client.gateway_url.is_none());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str("[client]\ngateway_url = \"http://x\"\n").unwrap();
        assert_eq!(parsed.gateway_url(), Some("http://x"));
        assert_eq!(parsed.client.max_upload_bytes, MAX_UPLOAD_BYTES);
        assert_eq!(parsed.output.display, DisplayMode::Terminal);
    }

    #[test]
    fn set_and_get_every_key() {
        let mut config = Config::default();
        config.set("client.gateway_url", "https://magic.example/").unwrap();
        config.set("client.output_format", "jpg").unwrap();
        config.set("client.max_attempts", "5").unwrap();
        config.set("output.display", "none").unwrap();

        assert_eq!(config.gateway_url(), Some("https://magic.example"));
        assert_eq!(config.get("client.output_format").as_deref(), Some("jpeg"));
        assert_eq!(config.retry_policy().max_attempts, 5);
        assert_eq!(config.get("output.display").as_deref(), Some("none"));

        for key in Config::keys() {
            assert!(config.get(key).is_some(), "missing getter for {}", key);
        }
    }

    #[test]
    fn backoff_setting_shapes_retry_policy() {
        let mut config = Config::default();
        assert_eq!(config.retry_policy().backoff, Backoff::None);

        config.set("client.poll_backoff_ms", "250").unwrap();
        let policy = config.retry_policy();
        assert_eq!(
            policy.backoff,
            Backoff::Linear {
                step: Duration::from_millis(250)
            }
        );
        assert_eq!(policy.delay_after(2), Duration::from_millis(2500));
    }

    #[test]
    fn set_rejects_bad_values() {
        let mut config = Config::default();
        assert!(config.set("client.max_attempts", "0").is_err());
        assert!(config.set("client.output_format", "tiff").is_err());
        assert!(config.set("gateway.listen", "nowhere").is_err());
        assert!(config.set("api.key", "secret").is_err());
    }

    #[test]
    fn blank_gateway_url_counts_as_unset() {
        let mut config = Config::default();
        config.set("client.gateway_url", "  ").unwrap();
        assert_eq!(config.gateway_url(), None);
    }

    #[test]
    fn save_writes_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.config_path = dir.path().join("nested").join("config.toml");
        config.save().unwrap();

        let text = std::fs::read_to_string(&config.config_path).unwrap();
        assert!(text.contains("[gateway]"));
        assert!(text.contains("[client]"));
    }
}
