//! Configuration validation with aggregated errors.
//! - Aggregates all issues into Vec<String>
//! - Launch parameters: required values, protocol, truth-value flags
//! - Settings: timeouts, logging level, metrics endpoint

use tracing::error;

use crate::config::launch::{parse_bool, LaunchArgs, ServerProtocol};
use crate::config::settings::{LoggingConfig, MetricsConfig, SettingsConfig, TransportConfig};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Returns Ok(()) or Err(Vec<String>) containing all issues.
pub fn validate_launch_args(args: &LaunchArgs) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = Vec::new();

    let required = [
        ("subscribe_topic", &args.subscribe_topic),
        ("publish_topic", &args.publish_topic),
        ("influxdb_container_name", &args.influxdb_container_name),
        ("influxdb_org", &args.influxdb_org),
        ("influxdb_bucket", &args.influxdb_bucket),
        ("influxdb_port", &args.influxdb_port),
        ("influxdb_interface", &args.influxdb_interface),
    ];
    for (name, value) in required {
        if value.trim().is_empty() {
            errors.push(format!("launch: '{}' must not be empty", name));
        }
    }

    if args.subscribe_topic == args.publish_topic && !args.subscribe_topic.is_empty() {
        errors.push(format!(
            "launch: subscribe_topic and publish_topic are both '{}'; responses would be read back as requests",
            args.subscribe_topic
        ));
    }

    if let Err(e) = args.server_protocol.parse::<ServerProtocol>() {
        errors.push(format!("launch: {}", e));
    }
    if let Err(e) = parse_bool(&args.skip_tls_verify) {
        errors.push(format!("launch: skip_tls_verify: {}", e));
    }

    finish(errors)
}

pub fn validate_settings(settings: &SettingsConfig) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = Vec::new();

    if settings.idle_interval_secs == 0 {
        errors.push("settings: 'idle_interval_secs' must be > 0".to_string());
    }
    if settings.source.docker_binary.trim().is_empty() {
        errors.push("settings.source: 'docker_binary' must not be empty".to_string());
    }
    validate_transport(&settings.transport, &mut errors);
    if let Some(logging) = &settings.logging {
        validate_logging(logging, &mut errors);
    }
    validate_metrics(&settings.metrics, &mut errors);

    finish(errors)
}

fn validate_transport(transport: &TransportConfig, errors: &mut Vec<String>) {
    let timeouts = [
        ("connect_timeout_ms", transport.connect_timeout_ms),
        ("subscribe_timeout_ms", transport.subscribe_timeout_ms),
        ("publish_timeout_ms", transport.publish_timeout_ms),
    ];
    for (name, value) in timeouts {
        if value == 0 {
            errors.push(format!("settings.transport: '{}' must be > 0", name));
        }
    }
    if let Some(path) = &transport.socket_path {
        if !path.starts_with('/') {
            errors.push(format!(
                "settings.transport: socket_path '{}' must be absolute (start with '/')",
                path
            ));
        }
    }
}

fn validate_logging(logging: &LoggingConfig, errors: &mut Vec<String>) {
    if !LOG_LEVELS.contains(&logging.level.to_lowercase().as_str()) {
        errors.push(format!(
            "settings.logging: level '{}' is not one of {:?}",
            logging.level, LOG_LEVELS
        ));
    }
}

fn validate_metrics(metrics: &MetricsConfig, errors: &mut Vec<String>) {
    if !metrics.is_enabled {
        return;
    }
    if !metrics.path.starts_with('/') {
        errors.push(format!(
            "settings.metrics: path '{}' must start with '/'",
            metrics.path
        ));
    }
    if metrics.port.parse::<u16>().is_err() {
        errors.push(format!(
            "settings.metrics: port '{}' is not a valid port",
            metrics.port
        ));
    }
}

fn finish(errors: Vec<String>) -> Result<(), Vec<String>> {
    if errors.is_empty() {
        return Ok(());
    }
    for e in &errors {
        error!("config validation: {}", e);
    }
    Err(errors)
}
