use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

// Declare the static OnceCell to hold the Metrics.
static METRICS_INSTANCE: OnceCell<Arc<Metrics>> = OnceCell::const_new();

/// Asynchronously initializes and gets a reference to the static `Metrics`.
pub async fn get_metrics() -> &'static Arc<Metrics> {
    METRICS_INSTANCE
        .get_or_init(|| async {
            info!("Initializing Metrics ...");
            Metrics::new()
        })
        .await
}

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Source metrics
    pub tokens_loaded: IntGauge,

    // Broker metrics
    pub token_requests: IntCounterVec,
    pub resolve_duration: HistogramVec,
    pub publishes: IntCounterVec,
    pub publish_failures: IntCounterVec,
    pub stream_errors: IntCounterVec,

    // Config/runtime
    pub config_validation_errors: IntCounter,
    pub up: IntGauge,
}

impl Metrics {
    fn new() -> Arc<Self> {
        let registry = Registry::new_custom(Some("tokenbroker".into()), None)
            .expect("metrics registry prefix is valid");

        let metrics: Arc<Metrics> = Arc::new(Self {
            // Source
            tokens_loaded: IntGauge::new("tokens_loaded", "Token records fetched at startup").expect("metric"),

            // Broker
            token_requests: IntCounterVec::new(Opts::new("token_requests_total", "Token requests by access level and outcome"), &["access_level", "outcome"]).expect("metric"),
            resolve_duration: HistogramVec::new(HistogramOpts::new("request_handling_duration_seconds", "Time from request receipt to publish acknowledgement").buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]), &["access_level"]).expect("metric"),
            publishes: IntCounterVec::new(Opts::new("publishes_total", "Responses published"), &["topic"]).expect("metric"),
            publish_failures: IntCounterVec::new(Opts::new("publish_failures_total", "Publish failures by reason"), &["topic", "reason"]).expect("metric"),
            stream_errors: IntCounterVec::new(Opts::new("stream_errors_total", "Subscription stream errors by kind"), &["reason"]).expect("metric"),

            // Config/runtime
            config_validation_errors: IntCounter::new("config_validation_errors_total", "Validation errors during startup").expect("metric"),
            up: IntGauge::new("up", "1 if the broker is listening").expect("metric"),

            registry,
        });

        // Register all metrics in the registry
        let reg = &metrics.registry;
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(metrics.tokens_loaded.clone()),
            Box::new(metrics.token_requests.clone()),
            Box::new(metrics.resolve_duration.clone()),
            Box::new(metrics.publishes.clone()),
            Box::new(metrics.publish_failures.clone()),
            Box::new(metrics.stream_errors.clone()),
            Box::new(metrics.config_validation_errors.clone()),
            Box::new(metrics.up.clone()),
        ];
        for collector in collectors {
            reg.register(collector).expect("metric names are unique");
        }

        metrics
    }
}
