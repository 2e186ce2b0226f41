use serde::Deserialize;

use crate::utils::constants::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_DOCKER_BINARY, DEFAULT_IDLE_INTERVAL_SECS,
    DEFAULT_PUBLISH_TIMEOUT_MS, DEFAULT_SUBSCRIBE_TIMEOUT_MS,
};

/// ================================
/// Settings file (optional)
/// ================================
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SettingsFile {
    #[serde(default)]
    pub settings: SettingsConfig,
}

/// ================================
/// Global service-wide settings
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct SettingsConfig {
    pub logging: Option<LoggingConfig>,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub source: SourceSettings,
    /// main task wake-up period while the broker runs
    #[serde(default = "default_idle_interval_secs")]
    pub idle_interval_secs: u64,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            logging: None,
            transport: TransportConfig::default(),
            source: SourceSettings::default(),
            idle_interval_secs: DEFAULT_IDLE_INTERVAL_SECS,
            metrics: MetricsConfig::default(),
        }
    }
}

/// ================================
/// Pub/sub transport
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct TransportConfig {
    /// falls back to the IPC daemon environment when absent
    pub socket_path: Option<String>,
    pub auth_token: Option<String>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_subscribe_timeout_ms")]
    pub subscribe_timeout_ms: u64,
    /// bounded wait for the publish acknowledgement
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            auth_token: None,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            subscribe_timeout_ms: DEFAULT_SUBSCRIBE_TIMEOUT_MS,
            publish_timeout_ms: DEFAULT_PUBLISH_TIMEOUT_MS,
        }
    }
}

/// ================================
/// Token source
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct SourceSettings {
    #[serde(default = "default_docker_binary")]
    pub docker_binary: String,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            docker_binary: default_docker_binary(),
        }
    }
}

/// ================================
/// Metrics
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_path")]
    pub path: String,
    #[serde(default)]
    pub is_enabled: bool,
    #[serde(default = "default_metrics_host")]
    pub host: String,
    #[serde(default = "default_metrics_port")]
    pub port: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            path: default_metrics_path(),
            is_enabled: false,
            host: default_metrics_host(),
            port: default_metrics_port(),
        }
    }
}

/// ================================
/// Logging
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String, // allowed: trace, debug, info, warn, error
    pub format: LogFormat,
}

impl LoggingConfig {
    pub fn new(level: String, format: LogFormat) -> Self {
        Self { level, format }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new("info".to_owned(), LogFormat::from_env())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Compact,
}

impl LogFormat {
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT")
            .unwrap_or_else(|_| "compact".to_string())
            .to_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_metrics_host() -> String {
    "127.0.0.1".to_string()
}

fn default_metrics_port() -> String {
    "9100".to_string()
}

fn default_docker_binary() -> String {
    DEFAULT_DOCKER_BINARY.to_string()
}

fn default_idle_interval_secs() -> u64 {
    DEFAULT_IDLE_INTERVAL_SECS
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_subscribe_timeout_ms() -> u64 {
    DEFAULT_SUBSCRIBE_TIMEOUT_MS
}

fn default_publish_timeout_ms() -> u64 {
    DEFAULT_PUBLISH_TIMEOUT_MS
}
