use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use clap::Args;

use crate::config::proc_validator::validate_launch_args;
use crate::resolver::payload::ConnectionMetadata;

/// Process launch parameters. All are required and string typed, exactly as
/// the component recipe passes them.
#[derive(Debug, Clone, Args)]
pub struct LaunchArgs {
    #[arg(long = "subscribe_topic")]
    pub subscribe_topic: String,
    #[arg(long = "publish_topic")]
    pub publish_topic: String,
    #[arg(long = "influxdb_container_name")]
    pub influxdb_container_name: String,
    #[arg(long = "influxdb_org")]
    pub influxdb_org: String,
    #[arg(long = "influxdb_bucket")]
    pub influxdb_bucket: String,
    #[arg(long = "influxdb_port")]
    pub influxdb_port: String,
    #[arg(long = "influxdb_interface")]
    pub influxdb_interface: String,
    /// http | https
    #[arg(long = "server_protocol")]
    pub server_protocol: String,
    /// true / false (also yes/no, on/off, 1/0)
    #[arg(long = "skip_tls_verify")]
    pub skip_tls_verify: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerProtocol {
    Http,
    Https,
}

impl ServerProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerProtocol::Http => "http",
            ServerProtocol::Https => "https",
        }
    }
}

impl FromStr for ServerProtocol {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "http" => Ok(ServerProtocol::Http),
            "https" => Ok(ServerProtocol::Https),
            other => Err(anyhow!(
                "server_protocol must be 'http' or 'https', got '{}'",
                other
            )),
        }
    }
}

impl fmt::Display for ServerProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated launch configuration.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub subscribe_topic: String,
    pub publish_topic: String,
    pub container_name: String,
    pub port: String,
    pub server_protocol: ServerProtocol,
    pub skip_tls_verify: bool,
    /// static fields echoed in every response
    pub metadata: ConnectionMetadata,
}

impl LaunchConfig {
    pub fn from_args(args: &LaunchArgs) -> Result<Self> {
        validate_launch_args(args)
            .map_err(|errors| anyhow!("launch parameters are not valid: {}", errors.join("; ")))?;

        Ok(Self {
            subscribe_topic: args.subscribe_topic.to_owned(),
            publish_topic: args.publish_topic.to_owned(),
            container_name: args.influxdb_container_name.to_owned(),
            port: args.influxdb_port.to_owned(),
            server_protocol: args.server_protocol.parse()?,
            skip_tls_verify: parse_bool(&args.skip_tls_verify)?,
            metadata: ConnectionMetadata {
                container_name: args.influxdb_container_name.to_owned(),
                org: args.influxdb_org.to_owned(),
                bucket: args.influxdb_bucket.to_owned(),
                port: args.influxdb_port.to_owned(),
                interface: args.influxdb_interface.to_owned(),
                server_protocol: args.server_protocol.to_owned(),
                skip_tls_verify: args.skip_tls_verify.to_owned(),
            },
        })
    }
}

/// Truth values accepted for string flags, case-insensitive.
pub fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "y" | "yes" | "t" | "true" | "on" | "1" => Ok(true),
        "n" | "no" | "f" | "false" | "off" | "0" => Ok(false),
        other => Err(anyhow!("invalid truth value '{}'", other)),
    }
}
