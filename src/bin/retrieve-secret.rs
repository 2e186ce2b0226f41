use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use influx_token_broker::config::proc_loader;
use influx_token_broker::secrets::retrieve_secret;
use influx_token_broker::transport::socket::SocketConnector;
use influx_token_broker::utils::constants::DEFAULT_SECRET_TIMEOUT_MS;
use influx_token_broker::utils::logging::{self, LogLevel};

/// Prints the InfluxDB credentials stored in a secret as `<username> <password>`.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long = "secret_arn")]
    secret_arn: String,
    #[arg(long, env = "BROKER_SETTINGS")]
    settings: Option<String>,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = proc_loader::load(args.settings.as_deref()).await?;
    logging::run(&settings, args.log_level)?;

    let connector = SocketConnector::from_settings(&settings.transport)?;
    let credentials = retrieve_secret(
        &connector,
        &args.secret_arn,
        Duration::from_millis(DEFAULT_SECRET_TIMEOUT_MS),
    )
    .await?;

    // stdout carries only the credentials; logs go to stderr
    println!("{}", credentials);
    Ok(())
}
