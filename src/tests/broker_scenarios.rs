#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use crate::app::{start_broker, StartupError};
    use crate::broker::{BrokerError, BrokerState, RunningBroker};
    use crate::sources::influx_cli::{InfluxCliSource, InfluxConnectionParams};
    use crate::tests::common::*;
    use crate::transport::local::{LocalBus, LocalConnection};
    use crate::transport::{Connection, Connector, Subscription, TransportError};

    const QUIET: Duration = Duration::from_millis(400);
    const WAIT: Duration = Duration::from_secs(3);

    struct Harness {
        bus: LocalBus,
        requester: LocalConnection,
        responses: Subscription,
        broker: RunningBroker<LocalConnection>,
    }

    impl Harness {
        async fn start(listing: serde_json::Value) -> Self {
            let bus = LocalBus::new();
            let requester = bus.connect().await.unwrap();
            let responses = requester.subscribe(OUTBOUND_TOPIC).await.unwrap();

            let launch = launch_config();
            let source = InfluxCliSource::new(
                InfluxConnectionParams::from(&launch),
                "docker",
                CannedRunner::with_listing(&listing),
            );
            let broker = start_broker(&launch, fast_settings(), &source, bus.clone())
                .await
                .unwrap();

            Self {
                bus,
                requester,
                responses,
                broker,
            }
        }

        async fn request(&self, body: &[u8]) {
            self.requester
                .publish(INBOUND_TOPIC, body.to_vec())
                .await
                .unwrap();
        }

        async fn request_level(&self, level: &str) {
            let body = json!({"action": "RetrieveToken", "accessLevel": level});
            self.request(&serde_json::to_vec(&body).unwrap()).await;
        }
    }

    #[tokio::test]
    async fn sequential_requests_are_answered_in_order() {
        let mut h = Harness::start(three_token_listing()).await;

        h.request_level("RW").await;
        h.request_level("RO").await;
        h.request_level("Admin").await;

        let mut answers = Vec::new();
        for _ in 0..3 {
            let response = next_json(&mut h.responses, WAIT).await.expect("response");
            answers.push((
                response["InfluxDBTokenAccessType"].as_str().unwrap().to_owned(),
                response["InfluxDBToken"].as_str().unwrap().to_owned(),
            ));
        }
        assert_eq!(
            answers,
            [
                ("RW".to_owned(), "T-RW".to_owned()),
                ("RO".to_owned(), "T-RO".to_owned()),
                ("Admin".to_owned(), "T-ADMIN".to_owned()),
            ]
        );
        assert!(next_json(&mut h.responses, QUIET).await.is_none());
        h.broker.shutdown().await;
    }

    #[tokio::test]
    async fn response_carries_launch_metadata() {
        let mut h = Harness::start(three_token_listing()).await;

        h.request_level("RW").await;
        let response = next_json(&mut h.responses, WAIT).await.expect("response");

        assert_eq!(
            response,
            json!({
                "InfluxDBContainerName": "greengrass_InfluxDB",
                "InfluxDBOrg": "greengrass",
                "InfluxDBBucket": "greengrass-telemetry",
                "InfluxDBPort": "8086",
                "InfluxDBInterface": "127.0.0.1",
                "InfluxDBServerProtocol": "https",
                "InfluxDBSkipTLSVerify": "true",
                "InfluxDBTokenAccessType": "RW",
                "InfluxDBToken": "T-RW"
            })
        );
        h.broker.shutdown().await;
    }

    #[tokio::test]
    async fn legacy_request_returns_rw_bundle() {
        let mut h = Harness::start(three_token_listing()).await;

        h.request(b"GetInfluxDBData").await;
        let response = next_json(&mut h.responses, WAIT).await.expect("response");

        assert_eq!(response["InfluxDBRWToken"], "T-RW");
        assert!(response.get("InfluxDBToken").is_none());
        assert!(response.get("InfluxDBTokenAccessType").is_none());
        h.broker.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_requests_get_no_response() {
        let mut h = Harness::start(three_token_listing()).await;

        h.request(br#"{"action":"DeleteToken","accessLevel":"RW"}"#).await;
        h.request_level("SuperUser").await;
        h.request(b"not json at all").await;
        assert!(next_json(&mut h.responses, QUIET).await.is_none());

        h.request_level("RO").await;
        let response = next_json(&mut h.responses, WAIT).await.expect("response");
        assert_eq!(response["InfluxDBToken"], "T-RO");
        assert_eq!(h.broker.state(), BrokerState::Listening);
        h.broker.shutdown().await;
    }

    #[tokio::test]
    async fn admin_without_operator_record_gets_no_response() {
        let listing = json!([
            {"description": "greengrass_readwrite", "token": "T-RW"},
            {"description": "admin's Token", "token": "T-ADMIN"}
        ]);
        let mut h = Harness::start(listing).await;

        h.request_level("Admin").await;
        assert!(next_json(&mut h.responses, QUIET).await.is_none());
        assert_eq!(h.broker.state(), BrokerState::Listening);
        h.broker.shutdown().await;
    }

    #[tokio::test]
    async fn empty_token_does_not_close_the_stream() {
        let listing = json!([
            {"description": "admin's Token", "token": "T-ADMIN"},
            {"description": "greengrass_readwrite", "token": "T-RW"},
            {"description": "greengrass_read", "token": ""}
        ]);
        let mut h = Harness::start(listing).await;

        h.request_level("RO").await;
        assert!(next_json(&mut h.responses, QUIET).await.is_none());

        h.request_level("RW").await;
        let response = next_json(&mut h.responses, WAIT).await.expect("response");
        assert_eq!(response["InfluxDBToken"], "T-RW");
        h.broker.shutdown().await;
    }

    #[tokio::test]
    async fn stream_errors_keep_the_subscription() {
        let mut h = Harness::start(three_token_listing()).await;

        h.bus
            .inject_stream_error(INBOUND_TOPIC, TransportError::Io("connection reset".into()))
            .await;
        h.bus
            .inject_stream_error(INBOUND_TOPIC, TransportError::Unauthorized("revoked".into()))
            .await;

        h.request_level("Admin").await;
        let response = next_json(&mut h.responses, WAIT).await.expect("response");
        assert_eq!(response["InfluxDBToken"], "T-ADMIN");
        h.broker.shutdown().await;
    }

    #[tokio::test]
    async fn publish_failures_are_per_message() {
        let mut h = Harness::start(three_token_listing()).await;

        h.bus.deny_topic(OUTBOUND_TOPIC).await;
        h.request_level("RW").await;
        tokio::time::sleep(QUIET).await;
        h.bus.allow_topic(OUTBOUND_TOPIC).await;
        assert!(next_json(&mut h.responses, QUIET).await.is_none());

        // the delay also holds back the request itself; the broker's
        // publish then gives up after 300ms
        h.bus.set_publish_delay(Some(Duration::from_secs(1))).await;
        h.request_level("RW").await;
        tokio::time::sleep(Duration::from_millis(600)).await;
        h.bus.set_publish_delay(None).await;
        assert!(next_json(&mut h.responses, QUIET).await.is_none());

        h.request_level("RO").await;
        let response = next_json(&mut h.responses, WAIT).await.expect("response");
        assert_eq!(response["InfluxDBToken"], "T-RO");
        h.broker.shutdown().await;
    }

    #[tokio::test]
    async fn broker_holds_two_connections() {
        let h = Harness::start(three_token_listing()).await;
        // one for the requester, two for the broker
        assert_eq!(h.bus.connection_count(), 3);
        h.broker.shutdown().await;
    }

    #[tokio::test]
    async fn closed_stream_stops_the_listener() {
        let h = Harness::start(three_token_listing()).await;

        h.bus.close_topic(INBOUND_TOPIC).await;
        let mut state = h.broker.state();
        for _ in 0..50 {
            if state == BrokerState::Stopped {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            state = h.broker.state();
        }
        assert_eq!(state, BrokerState::Stopped);
        h.broker.shutdown().await;
    }

    #[tokio::test]
    async fn unauthorized_subscription_fails_startup() {
        let bus = LocalBus::new();
        bus.deny_topic(INBOUND_TOPIC).await;
        let launch = launch_config();
        let source = InfluxCliSource::new(
            InfluxConnectionParams::from(&launch),
            "docker",
            CannedRunner::with_listing(&three_token_listing()),
        );

        let err = start_broker(&launch, fast_settings(), &source, bus)
            .await
            .err()
            .expect("startup must fail");

        match err {
            StartupError::Broker(err @ BrokerError::SubscriptionUnauthorized { .. }) => {
                assert!(err.is_subscription_error());
                assert!(err.to_string().contains(INBOUND_TOPIC));
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
