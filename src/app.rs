//! Startup wiring shared by the broker binary and the scenario tests.

use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::broker::{Broker, BrokerError, BrokerSettings, RunningBroker};
use crate::config::launch::LaunchConfig;
use crate::observability::metrics::get_metrics;
use crate::resolver::Resolver;
use crate::sources::{FetchTokens, SourceError};
use crate::transport::Connector;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Fetch the token set, then subscribe. No connection is opened when the
/// fetch fails.
pub async fn start_broker<S, C>(
    launch: &LaunchConfig,
    settings: BrokerSettings,
    source: &S,
    connector: C,
) -> Result<RunningBroker<C::Conn>, StartupError>
where
    S: FetchTokens,
    C: Connector,
{
    let tokens = source.fetch_tokens().await?;
    info!("Retrieved {} InfluxDB token records", tokens.len());
    get_metrics().await.tokens_loaded.set(tokens.len() as i64);

    let resolver = Resolver::new(tokens, launch.metadata.clone());
    let running = Broker::new(connector, resolver, settings)
        .start(&launch.subscribe_topic, &launch.publish_topic)
        .await?;
    info!(
        "InfluxDB token broker listening on {} and publishing to {}",
        launch.subscribe_topic, launch.publish_topic
    );
    Ok(running)
}

/// Keep the process alive until interrupted.
pub async fn idle_until_shutdown(interval: Duration) {
    loop {
        tokio::select! {
            _ = sleep(interval) => debug!("broker idle"),
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                break;
            }
        }
    }
}
