use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::types::NotificationKind;

/// Top-level configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[cfg(feature = "nats")]
    #[serde(default)]
    pub nats: NatsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_hostname")]
    pub name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_hostname(),
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

/// Anomaly thresholds handed to every session's analyzers
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct ThresholdConfig {
    /// Largest specific-humidity jump between samples that is not a spike
    #[serde(default = "default_sh_spike")]
    pub sh_spike: f64,
    /// Heat index above which a warning is raised; half of it bounds spikes
    #[serde(default = "default_heat_index")]
    pub heat_index: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            sh_spike: default_sh_spike(),
            heat_index: default_heat_index(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_rate_per_min")]
    pub rate_limit_per_minute: u32,
    #[serde(default = "default_dedup_window")]
    pub dedup_window_secs: u64,
    #[serde(default = "default_true")]
    pub log: bool,
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
    #[serde(default)]
    pub slack: Option<SlackConfig>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            rate_limit_per_minute: default_rate_per_min(),
            dedup_window_secs: default_dedup_window(),
            log: true,
            webhook: None,
            slack: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    #[serde(default)]
    pub enabled: bool,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Notification kinds to forward; empty forwards everything
    #[serde(default)]
    pub events: Vec<NotificationKind>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SlackConfig {
    #[serde(default)]
    pub enabled: bool,
    pub webhook_url: String,
    pub channel: Option<String>,
    #[serde(default = "default_slack_events")]
    pub events: Vec<NotificationKind>,
}

#[cfg(feature = "nats")]
#[derive(Debug, Deserialize, Clone)]
pub struct NatsConfig {
    #[serde(default = "default_nats_url")]
    pub url: String,
    #[serde(default = "default_nats_prefix")]
    pub subject_prefix: String,
    #[serde(default)]
    pub credential_file: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[cfg(feature = "nats")]
impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: default_nats_url(),
            subject_prefix: default_nats_prefix(),
            credential_file: None,
            token: None,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        // Expand environment variables
        let expanded = expand_env_vars(content)?;

        let config: Config = toml::from_str(&expanded)
            .with_context(|| "Failed to parse configuration")?;

        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        let t = &self.thresholds;
        if !(t.sh_spike.is_finite() && t.sh_spike >= 0.0) {
            anyhow::bail!("thresholds.sh_spike must be a non-negative number");
        }
        if !(t.heat_index.is_finite() && t.heat_index > 0.0) {
            anyhow::bail!("thresholds.heat_index must be a positive number");
        }
        if self.notifications.queue_capacity == 0 {
            anyhow::bail!("notifications.queue_capacity must be greater than 0");
        }
        Ok(())
    }
}

/// Expand ${ENV_VAR} references in config string
fn expand_env_vars(input: &str) -> Result<String> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")?;
    Ok(re
        .replace_all(input, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_default()
        })
        .to_string())
}

// Default value functions
fn default_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}
fn default_log_level() -> String { "info".to_string() }
fn default_data_dir() -> PathBuf { PathBuf::from("/var/lib/weather-ingest") }
fn default_sh_spike() -> f64 { 2.0 }
fn default_heat_index() -> f64 { 32.0 }
fn default_queue_capacity() -> usize { 1024 }
fn default_rate_per_min() -> u32 { 60 }
fn default_dedup_window() -> u64 { 30 }
fn default_true() -> bool { true }
fn default_slack_events() -> Vec<NotificationKind> {
    vec![
        NotificationKind::WarningRaised,
        NotificationKind::TransferCompleted,
        NotificationKind::SinkFailure,
    ]
}
#[cfg(feature = "nats")]
fn default_nats_url() -> String { "nats://localhost:4222".to_string() }
#[cfg(feature = "nats")]
fn default_nats_prefix() -> String { "weather".to_string() }
