#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::app::{start_broker, StartupError};
    use crate::broker::BrokerState;
    use crate::sources::influx_cli::{InfluxCliSource, InfluxConnectionParams};
    use crate::sources::SourceError;
    use crate::tests::common::*;
    use crate::transport::local::LocalBus;

    fn source(runner: CannedRunner) -> InfluxCliSource<CannedRunner> {
        InfluxCliSource::new(InfluxConnectionParams::from(&launch_config()), "docker", runner)
    }

    #[tokio::test]
    async fn no_output_fails_before_any_connection() {
        let bus = LocalBus::new();
        let runner = CannedRunner::with_stdout("  \n");

        let err = start_broker(&launch_config(), fast_settings(), &source(runner.clone()), bus.clone())
            .await
            .err()
            .expect("startup must fail");

        assert!(matches!(err, StartupError::Source(SourceError::SourceUnavailable { .. })), "{}", err);
        assert_eq!(runner.calls(), 1);
        assert_eq!(bus.connection_count(), 0);
    }

    #[tokio::test]
    async fn empty_first_token_fails_before_any_connection() {
        let bus = LocalBus::new();
        let listing = json!([
            {"description": "admin's Token", "token": ""},
            {"description": "greengrass_readwrite", "token": "T-RW"}
        ]);

        let err = start_broker(
            &launch_config(),
            fast_settings(),
            &source(CannedRunner::with_listing(&listing)),
            bus.clone(),
        )
        .await
        .err()
        .expect("startup must fail");

        assert!(matches!(err, StartupError::Source(SourceError::MalformedSource(_))), "{}", err);
        assert_eq!(bus.connection_count(), 0);
    }

    #[tokio::test]
    async fn unreachable_transport_fails_after_fetch() {
        let bus = LocalBus::new();
        bus.set_unreachable(true);
        let runner = CannedRunner::with_listing(&three_token_listing());

        let err = start_broker(&launch_config(), fast_settings(), &source(runner.clone()), bus)
            .await
            .err()
            .expect("startup must fail");

        assert!(matches!(err, StartupError::Broker(ref e) if e.is_subscription_error()), "{}", err);
        assert_eq!(runner.calls(), 1);
    }

    #[tokio::test]
    async fn tokens_are_fetched_once() {
        let bus = LocalBus::new();
        let runner = CannedRunner::with_listing(&three_token_listing());

        let running = start_broker(&launch_config(), fast_settings(), &source(runner.clone()), bus)
            .await
            .unwrap();

        assert_eq!(running.state(), BrokerState::Listening);
        assert_eq!(running.inbound_topic(), INBOUND_TOPIC);
        assert_eq!(runner.calls(), 1);
        running.shutdown().await;
    }
}
