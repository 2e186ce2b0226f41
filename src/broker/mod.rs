//! # Request/response broker
//!
//! Lifecycle: `Broker` (idle) → `start` → `RunningBroker` (listening).
//!
//! `start` opens two independent connections, one that owns the
//! subscription stream and one used only for publishing, then spawns a
//! single task that handles inbound messages one at a time in arrival order.
//!
//! Per message:
//! - decode → resolve → publish
//! - dropped requests (unknown action or access level, malformed admin
//!   token, missing record) are logged as warnings and never answered
//! - an empty resolved token and publish failures are logged as errors
//! - none of these end the stream

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::broker::message::InboundMessage;
use crate::broker::policy::{
    stream_error_disposition, StreamDisposition, StreamErrorPolicy, STREAM_ERROR_POLICY,
};
use crate::config::settings::TransportConfig;
use crate::observability::metrics::get_metrics;
use crate::resolver::{AccessLevel, ResolutionError, Resolver};
use crate::transport::{Connection, Connector, StreamEvent, Subscription, TransportError};

pub mod message;
pub mod policy;

static LEGACY_LABEL: &str = "legacy";
static UNKNOWN_LABEL: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerSettings {
    pub connect_timeout: Duration,
    pub subscribe_timeout: Duration,
    /// bounded wait for the publish acknowledgement
    pub publish_timeout: Duration,
}

impl From<&TransportConfig> for BrokerSettings {
    fn from(config: &TransportConfig) -> Self {
        Self {
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            subscribe_timeout: Duration::from_millis(config.subscribe_timeout_ms),
            publish_timeout: Duration::from_millis(config.publish_timeout_ms),
        }
    }
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self::from(&TransportConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerState {
    Idle,
    Listening,
    /// the stream task ended (stream closed or broker shut down)
    Stopped,
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("timeout occurred while subscribing to topic: {topic}")]
    SubscriptionTimeout { topic: String },
    #[error("unauthorized error while subscribing to topic: {topic}: {message}")]
    SubscriptionUnauthorized { topic: String, message: String },
    #[error("exception while subscribing to topic: {topic}: {source}")]
    Subscription {
        topic: String,
        #[source]
        source: TransportError,
    },
    #[error("failed to open publishing connection: {0}")]
    PublisherConnection(#[source] TransportError),
    #[error("timeout occurred while publishing to topic: {topic}")]
    PublishTimeout { topic: String },
    #[error("unauthorized error while publishing to topic: {topic}: {message}")]
    PublishUnauthorized { topic: String, message: String },
    #[error("exception while publishing to topic: {topic}: {source}")]
    Publish {
        topic: String,
        #[source]
        source: TransportError,
    },
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error("failed to encode response payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl BrokerError {
    fn subscription(topic: &str, err: TransportError) -> Self {
        let topic = topic.to_owned();
        match err {
            TransportError::Timeout => BrokerError::SubscriptionTimeout { topic },
            TransportError::Unauthorized(message) => {
                BrokerError::SubscriptionUnauthorized { topic, message }
            }
            source => BrokerError::Subscription { topic, source },
        }
    }

    fn publish(topic: &str, err: TransportError) -> Self {
        let topic = topic.to_owned();
        match err {
            TransportError::Timeout => BrokerError::PublishTimeout { topic },
            TransportError::Unauthorized(message) => {
                BrokerError::PublishUnauthorized { topic, message }
            }
            source => BrokerError::Publish { topic, source },
        }
    }

    /// Subscription setup failures; fatal at startup.
    pub fn is_subscription_error(&self) -> bool {
        matches!(
            self,
            BrokerError::SubscriptionTimeout { .. }
                | BrokerError::SubscriptionUnauthorized { .. }
                | BrokerError::Subscription { .. }
                | BrokerError::PublisherConnection(_)
        )
    }

    fn reason(&self) -> &'static str {
        match self {
            BrokerError::PublishTimeout { .. } => "timeout",
            BrokerError::PublishUnauthorized { .. } => "unauthorized",
            BrokerError::Resolution(err) => err.reason(),
            BrokerError::Encode(_) => "encode",
            _ => "error",
        }
    }
}

/// Result of a message that was handled without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// `None` for the legacy bundle.
    Published(Option<AccessLevel>),
    Dropped(ResolutionError),
}

/// Publishes responses on the outbound topic with a bounded wait.
pub struct Publisher<P> {
    connection: Arc<P>,
    topic: String,
    timeout: Duration,
}

impl<P: Connection> Publisher<P> {
    pub fn new(connection: Arc<P>, topic: &str, timeout: Duration) -> Self {
        Self {
            connection,
            topic: topic.to_owned(),
            timeout,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn publish(&self, body: Vec<u8>) -> Result<(), BrokerError> {
        let metrics = get_metrics().await;
        let result = match timeout(self.timeout, self.connection.publish(&self.topic, body)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(BrokerError::publish(&self.topic, err)),
            Err(_) => Err(BrokerError::PublishTimeout {
                topic: self.topic.to_owned(),
            }),
        };
        match &result {
            Ok(()) => {
                metrics.publishes.with_label_values(&[self.topic.as_str()]).inc();
                info!("Successfully published InfluxDB token response to topic: {}", self.topic);
            }
            Err(err) => {
                metrics
                    .publish_failures
                    .with_label_values(&[self.topic.as_str(), err.reason()])
                    .inc();
            }
        }
        result
    }
}

/// Handles one subscription's events. Holds no mutable state.
pub struct MessageHandler<P> {
    resolver: Arc<Resolver>,
    publisher: Publisher<P>,
    stream_policy: StreamErrorPolicy,
}

impl<P: Connection> MessageHandler<P> {
    pub fn new(resolver: Arc<Resolver>, publisher: Publisher<P>) -> Self {
        Self {
            resolver,
            publisher,
            stream_policy: STREAM_ERROR_POLICY,
        }
    }

    pub fn with_stream_policy(mut self, policy: StreamErrorPolicy) -> Self {
        self.stream_policy = policy;
        self
    }

    /// Returns whether the subscription should stay open.
    pub async fn on_stream_event(&self, event: StreamEvent) -> StreamDisposition {
        match event {
            StreamEvent::Message(body) => {
                if let Err(err) = self.on_message(&body).await {
                    error!("Received an error while handling a token request: {}", err);
                }
                StreamDisposition::KeepOpen
            }
            StreamEvent::Error(err) => self.on_stream_error(&err).await,
            StreamEvent::Closed => {
                info!("Subscribe to topic stream closed.");
                StreamDisposition::KeepOpen
            }
        }
    }

    pub async fn on_stream_error(&self, err: &TransportError) -> StreamDisposition {
        get_metrics()
            .await
            .stream_errors
            .with_label_values(&[err.kind().as_str()])
            .inc();
        let disposition = stream_error_disposition(self.stream_policy, err.kind());
        error!(
            "Received an error with the InfluxDB token request stream: {} ({:?})",
            err, disposition
        );
        disposition
    }

    /// Decode, resolve and publish one inbound message.
    pub async fn on_message(&self, body: &[u8]) -> Result<MessageOutcome, BrokerError> {
        let start = Instant::now();
        let metrics = get_metrics().await;

        let (label, resolved) = match InboundMessage::decode(body) {
            InboundMessage::Legacy => {
                info!("Sending InfluxDB RW Token on the response topic (legacy request)");
                (
                    LEGACY_LABEL,
                    self.resolver
                        .resolve_legacy()
                        .map(|payload| (None, payload.to_bytes())),
                )
            }
            InboundMessage::Request(request) => {
                let label = AccessLevel::from_wire(&request.access_level)
                    .map(|level| level.as_str())
                    .unwrap_or(UNKNOWN_LABEL);
                debug!("token request: action '{}', access level '{}'", request.action, request.access_level);
                (
                    label,
                    self.resolver
                        .resolve(&request)
                        .map(|payload| (Some(payload.access_type), payload.to_bytes())),
                )
            }
            InboundMessage::Unrecognized(reason) => {
                (UNKNOWN_LABEL, Err(ResolutionError::UnknownAction(reason)))
            }
        };

        let (access_type, encoded) = match resolved {
            Ok(resolved) => resolved,
            Err(err) if !err.is_surfaced() => {
                warn!("Dropping token request received over pub/sub: {}", err);
                metrics.token_requests.with_label_values(&[label, err.reason()]).inc();
                return Ok(MessageOutcome::Dropped(err));
            }
            Err(err) => {
                metrics.token_requests.with_label_values(&[label, err.reason()]).inc();
                return Err(err.into());
            }
        };

        if let Some(level) = access_type {
            info!("Sending InfluxDB {} token on the response topic", level);
        }
        let published = match encoded {
            Ok(encoded) => self.publisher.publish(encoded).await,
            Err(err) => Err(BrokerError::Encode(err)),
        };
        metrics
            .token_requests
            .with_label_values(&[label, request_outcome(&published)])
            .inc();
        metrics
            .resolve_duration
            .with_label_values(&[label])
            .observe(start.elapsed().as_secs_f64());

        published.map(|_| MessageOutcome::Published(access_type))
    }
}

/// `outcome` label for a message that got as far as encoding.
fn request_outcome(published: &Result<(), BrokerError>) -> &'static str {
    match published {
        Ok(()) => "published",
        Err(BrokerError::Encode(_)) => "encode_failed",
        Err(_) => "publish_failed",
    }
}

pub struct Broker<C> {
    connector: C,
    resolver: Arc<Resolver>,
    settings: BrokerSettings,
}

impl<C: Connector> Broker<C> {
    pub fn new(connector: C, resolver: Resolver, settings: BrokerSettings) -> Self {
        Self {
            connector,
            resolver: Arc::new(resolver),
            settings,
        }
    }

    pub fn state(&self) -> BrokerState {
        BrokerState::Idle
    }

    /// Subscribe to `inbound_topic` and answer on `outbound_topic`.
    pub async fn start(
        self,
        inbound_topic: &str,
        outbound_topic: &str,
    ) -> Result<RunningBroker<C::Conn>, BrokerError> {
        let subscriber = self
            .connect()
            .await
            .map_err(|err| BrokerError::subscription(inbound_topic, err))?;
        let publisher = self.connect().await.map_err(BrokerError::PublisherConnection)?;

        let subscription = match timeout(self.settings.subscribe_timeout, subscriber.subscribe(inbound_topic)).await {
            Ok(Ok(subscription)) => subscription,
            Ok(Err(err)) => return Err(BrokerError::subscription(inbound_topic, err)),
            Err(_) => return Err(BrokerError::subscription(inbound_topic, TransportError::Timeout)),
        };
        info!("Successfully subscribed to topic: {}", inbound_topic);

        let publisher = Arc::new(publisher);
        let handler = MessageHandler::new(
            self.resolver.clone(),
            Publisher::new(publisher.clone(), outbound_topic, self.settings.publish_timeout),
        );
        let task = tokio::spawn(listen(subscription, handler));
        get_metrics().await.up.set(1);

        Ok(RunningBroker {
            subscriber,
            publisher,
            task,
            inbound_topic: inbound_topic.to_owned(),
        })
    }

    async fn connect(&self) -> Result<C::Conn, TransportError> {
        match timeout(self.settings.connect_timeout, self.connector.connect()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

async fn listen<P: Connection>(mut subscription: Subscription, handler: MessageHandler<P>) {
    while let Some(event) = subscription.next().await {
        if handler.on_stream_event(event).await == StreamDisposition::Close {
            warn!("closing subscription to topic: {}", subscription.topic());
            break;
        }
    }
    debug!("subscription to topic {} ended", subscription.topic());
}

/// A broker that holds an active subscription.
pub struct RunningBroker<P> {
    subscriber: P,
    publisher: Arc<P>,
    task: JoinHandle<()>,
    inbound_topic: String,
}

impl<P: Connection> RunningBroker<P> {
    pub fn state(&self) -> BrokerState {
        if self.task.is_finished() {
            BrokerState::Stopped
        } else {
            BrokerState::Listening
        }
    }

    pub fn inbound_topic(&self) -> &str {
        &self.inbound_topic
    }

    /// Abandon in-flight handling and close both connections.
    pub async fn shutdown(self) {
        self.task.abort();
        let _ = self.task.await;
        self.subscriber.close().await;
        self.publisher.close().await;
        get_metrics().await.up.set(0);
        info!("token broker for topic {} shut down", self.inbound_topic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::token::TokenRecord;
    use crate::cache::token_set::TokenSet;
    use crate::resolver::payload::ConnectionMetadata;
    use crate::transport::local::LocalBus;
    use crate::transport::TransportErrorKind;

    fn resolver() -> Arc<Resolver> {
        Arc::new(Resolver::new(
            TokenSet::new(vec![
                TokenRecord::new("admin's Token", "T-ADMIN"),
                TokenRecord::new("greengrass_readwrite", "T-RW"),
                TokenRecord::new("greengrass_read", ""),
            ]),
            ConnectionMetadata {
                container_name: "influxdb".into(),
                org: "org".into(),
                bucket: "bucket".into(),
                port: "8086".into(),
                interface: "127.0.0.1".into(),
                server_protocol: "http".into(),
                skip_tls_verify: "false".into(),
            },
        ))
    }

    async fn handler(bus: &LocalBus) -> MessageHandler<crate::transport::local::LocalConnection> {
        let conn = Arc::new(bus.connect().await.unwrap());
        MessageHandler::new(resolver(), Publisher::new(conn, "out", Duration::from_millis(200)))
    }

    #[tokio::test]
    async fn valid_request_is_published() {
        let bus = LocalBus::new();
        let mut out = bus.connect().await.unwrap().subscribe("out").await.unwrap();
        let handler = handler(&bus).await;

        let outcome = handler
            .on_message(br#"{"action":"RetrieveToken","accessLevel":"RW"}"#)
            .await
            .unwrap();

        assert_eq!(outcome, MessageOutcome::Published(Some(AccessLevel::ReadWrite)));
        let Some(StreamEvent::Message(body)) = out.next().await else {
            panic!("expected a published message");
        };
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["InfluxDBToken"], "T-RW");
    }

    #[tokio::test]
    async fn dropped_requests_are_not_errors() {
        let bus = LocalBus::new();
        let handler = handler(&bus).await;

        let outcome = handler.on_message(b"hello").await.unwrap();
        assert!(matches!(outcome, MessageOutcome::Dropped(ResolutionError::UnknownAction(_))));

        let outcome = handler
            .on_message(br#"{"action":"RetrieveToken","accessLevel":"XX"}"#)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            MessageOutcome::Dropped(ResolutionError::UnknownAccessLevel("XX".into()))
        );
    }

    #[tokio::test]
    async fn empty_token_is_surfaced() {
        let bus = LocalBus::new();
        let handler = handler(&bus).await;

        let err = handler
            .on_message(br#"{"action":"RetrieveToken","accessLevel":"RO"}"#)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BrokerError::Resolution(ResolutionError::EmptyToken(AccessLevel::ReadOnly))
        ));
        assert!(err.to_string().contains("RO"));
    }

    #[tokio::test]
    async fn publish_errors_are_classified() {
        let bus = LocalBus::new();
        let handler = handler(&bus).await;

        bus.deny_topic("out").await;
        let err = handler.on_message(b"GetInfluxDBData").await.unwrap_err();
        assert!(matches!(err, BrokerError::PublishUnauthorized { .. }), "{}", err);

        bus.allow_topic("out").await;
        bus.set_publish_delay(Some(Duration::from_secs(2))).await;
        let err = handler.on_message(b"GetInfluxDBData").await.unwrap_err();
        assert!(matches!(err, BrokerError::PublishTimeout { .. }), "{}", err);
    }

    #[tokio::test]
    async fn stream_errors_and_close_keep_the_stream() {
        let bus = LocalBus::new();
        let handler = handler(&bus).await;

        let disposition = handler
            .on_stream_event(StreamEvent::Error(TransportError::Unauthorized("x".into())))
            .await;
        assert_eq!(disposition, StreamDisposition::KeepOpen);
        assert_eq!(
            handler.on_stream_event(StreamEvent::Closed).await,
            StreamDisposition::KeepOpen
        );
        // a failing message is logged, not propagated
        let disposition = handler
            .on_stream_event(StreamEvent::Message(
                br#"{"action":"RetrieveToken","accessLevel":"RO"}"#.to_vec(),
            ))
            .await;
        assert_eq!(disposition, StreamDisposition::KeepOpen);
    }

    #[tokio::test]
    async fn broker_starts_idle_and_listens_after_start() {
        let bus = LocalBus::new();
        let broker = Broker::new(bus.clone(), (*resolver()).clone(), BrokerSettings::default());
        assert_eq!(broker.state(), BrokerState::Idle);

        let running = broker.start("in", "out").await.unwrap();
        assert_eq!(running.state(), BrokerState::Listening);
        assert_eq!(bus.connection_count(), 2);
        assert_eq!(running.inbound_topic(), "in");
        running.shutdown().await;
    }

    #[tokio::test]
    async fn subscription_failures_are_typed() {
        let bus = LocalBus::new();
        bus.deny_topic("in").await;
        let broker = Broker::new(bus.clone(), (*resolver()).clone(), BrokerSettings::default());
        let err = broker.start("in", "out").await.err().unwrap();
        assert!(matches!(err, BrokerError::SubscriptionUnauthorized { .. }));
        assert!(err.is_subscription_error());

        let unreachable = LocalBus::new();
        unreachable.set_unreachable(true);
        let broker = Broker::new(unreachable, (*resolver()).clone(), BrokerSettings::default());
        let err = broker.start("in", "out").await.err().unwrap();
        assert!(matches!(err, BrokerError::SubscriptionTimeout { .. }));
    }

    #[test]
    fn encode_failures_have_their_own_outcome() {
        let encode = serde_json::from_str::<u8>("not a number").unwrap_err();
        assert_eq!(request_outcome(&Err(BrokerError::Encode(encode))), "encode_failed");
        assert_eq!(
            request_outcome(&Err(BrokerError::PublishTimeout { topic: "out".into() })),
            "publish_failed"
        );
        assert_eq!(request_outcome(&Ok(())), "published");
    }

    #[tokio::test]
    async fn closing_policy_ends_the_listener() {
        let bus = LocalBus::new();
        let handler = handler(&bus)
            .await
            .with_stream_policy(&[(TransportErrorKind::Io, StreamDisposition::Close)]);
        let (tx, subscription) = Subscription::channel("in");
        let task = tokio::spawn(listen(subscription, handler));

        tx.send(StreamEvent::Error(TransportError::Timeout)).await.unwrap();
        tx.send(StreamEvent::Error(TransportError::Io("reset".into()))).await.unwrap();

        // the sender is still alive, so only the policy can end the loop
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("listener should stop")
            .unwrap();
        assert!(tx.is_closed());
    }
}
