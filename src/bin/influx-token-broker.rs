use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use influx_token_broker::app::{idle_until_shutdown, start_broker};
use influx_token_broker::broker::BrokerSettings;
use influx_token_broker::config::launch::{LaunchArgs, LaunchConfig};
use influx_token_broker::config::proc_loader;
use influx_token_broker::server;
use influx_token_broker::sources::command::SystemCommandRunner;
use influx_token_broker::sources::influx_cli::{InfluxCliSource, InfluxConnectionParams};
use influx_token_broker::transport::socket::SocketConnector;
use influx_token_broker::utils::logging::{self, LogLevel};
use tracing::{error, info};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(flatten)]
    launch: LaunchArgs,
    /// optional YAML settings file
    #[arg(long, env = "BROKER_SETTINGS")]
    settings: Option<String>,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Load settings, start logging
    // -------------------------------

    let args = Args::parse();
    let settings = proc_loader::load(args.settings.as_deref()).await?;
    logging::run(&settings, args.log_level)?;

    // -------------------------------
    // 2. Validate launch parameters
    // -------------------------------

    let launch = LaunchConfig::from_args(&args.launch).inspect_err(|e| error!("{}", e))?;

    // -------------------------------
    // 3. Metrics endpoint (optional)
    // -------------------------------

    let metrics_config = settings.metrics.clone();
    tokio::spawn(async move {
        if let Err(e) = server::server::start(&metrics_config).await {
            error!("metrics endpoint stopped: {}", e);
        }
    });

    // -------------------------------
    // 4. Fetch tokens, then subscribe
    // -------------------------------

    let source = InfluxCliSource::new(
        InfluxConnectionParams::from(&launch),
        settings.source.docker_binary.to_owned(),
        SystemCommandRunner,
    );
    let connector = SocketConnector::from_settings(&settings.transport)?;
    let running = start_broker(
        &launch,
        BrokerSettings::from(&settings.transport),
        &source,
        connector,
    )
    .await
    .inspect_err(|e| error!("{}", e))?;

    // -------------------------------
    // 5. Idle until interrupted
    // -------------------------------

    info!("Service started");
    idle_until_shutdown(Duration::from_secs(settings.idle_interval_secs)).await;
    running.shutdown().await;

    Ok(())
}
