use anyhow::Result;
use clap::ValueEnum;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::settings::{LogFormat, LoggingConfig, SettingsConfig};

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum LogLevel {
    TRACE,
    DEBUG,
    INFO,
    WARN,
    ERROR,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match *self {
            LogLevel::TRACE => "trace",
            LogLevel::DEBUG => "debug",
            LogLevel::INFO => "info",
            LogLevel::WARN => "warn",
            LogLevel::ERROR => "error",
        }
    }
}

/// CLI level wins over the settings file, which wins over `info`.
pub fn effective_config(settings: &SettingsConfig, arg_log_level: Option<LogLevel>) -> LoggingConfig {
    let configured = settings.logging.clone().unwrap_or_default();
    let level = arg_log_level
        .map(|level| level.as_str().to_owned())
        .unwrap_or(configured.level);
    LoggingConfig::new(level, configured.format)
}

pub fn run(settings: &SettingsConfig, arg_log_level: Option<LogLevel>) -> Result<()> {
    init_logging(&effective_config(settings, arg_log_level));
    Ok(())
}

/// Initialize tracing with the desired config. Later calls are no-ops.
pub fn init_logging(cfg: &LoggingConfig) {
    let env_filter = EnvFilter::try_new(&cfg.level).unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout is reserved for command output (retrieve-secret)
    let registry = tracing_subscriber::registry().with(env_filter);

    // Choose format layer
    match cfg.format {
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_timer(UtcTime::rfc_3339())
                .flatten_event(true) // flattens fields, good for CRI log parsers
                .with_ansi(false) // CRI parsers dislike ANSI color codes
                .with_writer(std::io::stderr);

            let _ = registry.with(layer).try_init();
        }
        LogFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_timer(UtcTime::rfc_3339())
                .with_ansi(true)
                .with_writer(std::io::stderr);

            let _ = registry.with(layer).try_init();
        }
    };
}
