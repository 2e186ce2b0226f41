use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::settings::MetricsConfig;
use crate::observability::metrics::get_metrics;
use crate::observability::routes::MetricsState;

pub async fn router(metrics_config: &MetricsConfig) -> Router {
    let metrics = get_metrics().await;
    MetricsState::new(metrics.registry.clone()).router(metrics_config)
}

/// Serve the metrics endpoint until the process ends. No-op when disabled.
pub async fn start(metrics_config: &MetricsConfig) -> Result<()> {
    if !metrics_config.is_enabled {
        return Ok(());
    }
    let bind_addr = format!("{}:{}", metrics_config.host, metrics_config.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind metrics endpoint on {}", bind_addr))?;
    serve(listener, router(metrics_config).await).await
}

pub async fn serve(listener: TcpListener, app: Router) -> Result<()> {
    info!(
        "metrics endpoint listening on {}",
        listener.local_addr().context("metrics listener address")?
    );
    axum::serve(listener, app).await?;
    Ok(())
}
