use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::DEFAULT_API_URL;
use crate::client::{DEFAULT_POLL_INTERVAL, DEFAULT_RETRY_DELAY};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    #[serde(default = "default_polling_config")]
    pub polling: PollingConfig,
    /// Presence of this section selects webhook mode
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_retry_secs")]
    pub retry_secs: u64,
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    /// Externally reachable URL; its first path segment is the served path
    pub url: String,
    pub certificate: PathBuf,
    pub key: PathBuf,
    #[serde(default = "default_webhook_port")]
    pub port: u16,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

fn default_retry_secs() -> u64 {
    DEFAULT_RETRY_DELAY.as_secs()
}

fn default_webhook_port() -> u16 {
    8443
}

fn default_polling_config() -> PollingConfig {
    PollingConfig {
        interval_secs: default_interval_secs(),
        retry_secs: default_retry_secs(),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config")?;

        if config.telegram.bot_token.trim().is_empty() {
            anyhow::bail!("telegram.bot_token must not be empty");
        }

        Ok(config)
    }
}
