use std::{fs, path::Path};

use anyhow::{anyhow, Result};
use regex::Regex;
use tracing::{debug, error};

use crate::config::proc_validator;
use crate::config::settings::{LoggingConfig, SettingsConfig, SettingsFile};
use crate::observability::metrics::get_metrics;

/// Settings from an optional YAML file; defaults when no path is given.
pub async fn load(path: Option<&str>) -> Result<SettingsConfig> {
    match path {
        Some(path) => file_to_settings(Path::new(path))
            .await
            .map_err(|e| anyhow!("Invalid settings file '{}': {}", path, e)),
        None => parse_settings(String::new()).await,
    }
}

/// Load and validate settings from YAML file
pub async fn file_to_settings(path: &Path) -> Result<SettingsConfig> {
    let content = fs::read_to_string(path)?;

    let expanded = expand_env_vars(&content)?;
    parse_settings(expanded).await
}

pub async fn parse_settings(content: String) -> Result<SettingsConfig> {
    let metrics = get_metrics().await;
    let settings_file: SettingsFile = if content.trim().is_empty() {
        SettingsFile::default()
    } else {
        serde_yaml::from_str(&content).inspect_err(|e| {
            error!("parse settings error: {}", e);
            metrics.config_validation_errors.inc();
        })?
    };
    let mut settings = settings_file.settings;

    // Apply defaults
    if settings.logging.is_none() {
        settings.logging = Some(LoggingConfig::default());
    }

    debug!("validating settings ...");
    proc_validator::validate_settings(&settings).map_err(|errors| {
        metrics.config_validation_errors.inc_by(errors.len() as u64);
        anyhow!("settings are not valid: {}", errors.join("; "))
    })?;

    Ok(settings)
}

/// Replace `${VAR}` and `${VAR:default}` with environment values.
fn expand_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{(\w+)(?::([^\}]+))?\}")?;
    Ok(re
        .replace_all(input, |caps: &regex::Captures| {
            let var = &caps[1];
            let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(var).unwrap_or_else(|_| default.to_string())
        })
        .to_string())
}
