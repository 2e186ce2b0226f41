use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{watch, RwLock};
use tracing::debug;

use crate::transport::{Connection, Connector, StreamEvent, Subscription, TransportError};

const TOPIC_BUFFER_SIZE: usize = 50;

/// What travels on a topic inside the bus.
#[derive(Debug, Clone)]
enum BusEvent {
    Message(Vec<u8>),
    Error(TransportError),
}

#[derive(Default)]
struct LocalBusInner {
    topics: RwLock<HashMap<String, broadcast::Sender<BusEvent>>>,
    denied_topics: RwLock<HashSet<String>>,
    secrets: RwLock<HashMap<String, String>>,
    publish_delay: RwLock<Option<Duration>>,
    connections: AtomicUsize,
    unreachable: AtomicBool,
}

/// In-process pub/sub bus.
///
/// Every clone refers to the same bus. Each `connect` yields an independent
/// [`LocalConnection`]; topics are created lazily on first use.
#[derive(Clone, Default)]
pub struct LocalBus {
    inner: Arc<LocalBusInner>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribing to or publishing on `topic` is rejected as unauthorized.
    pub async fn deny_topic(&self, topic: &str) {
        self.inner.denied_topics.write().await.insert(topic.to_owned());
    }

    pub async fn allow_topic(&self, topic: &str) {
        self.inner.denied_topics.write().await.remove(topic);
    }

    pub async fn insert_secret(&self, secret_id: &str, secret_string: &str) {
        self.inner
            .secrets
            .write()
            .await
            .insert(secret_id.to_owned(), secret_string.to_owned());
    }

    /// Delay applied before a publish is acknowledged.
    pub async fn set_publish_delay(&self, delay: Option<Duration>) {
        *self.inner.publish_delay.write().await = delay;
    }

    /// While set, `connect` fails with a timeout.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Number of connections opened so far.
    pub fn connection_count(&self) -> usize {
        self.inner.connections.load(Ordering::SeqCst)
    }

    /// Deliver a transport error to every subscriber of `topic`.
    pub async fn inject_stream_error(&self, topic: &str, error: TransportError) {
        let sender = self.sender(topic).await;
        let _ = sender.send(BusEvent::Error(error));
    }

    /// Drop the topic; current subscribers observe a closed stream.
    pub async fn close_topic(&self, topic: &str) {
        self.inner.topics.write().await.remove(topic);
    }

    async fn sender(&self, topic: &str) -> broadcast::Sender<BusEvent> {
        if let Some(sender) = self.inner.topics.read().await.get(topic) {
            return sender.clone();
        }
        self.inner
            .topics
            .write()
            .await
            .entry(topic.to_owned())
            .or_insert_with(|| broadcast::channel(TOPIC_BUFFER_SIZE).0)
            .clone()
    }

    async fn ensure_allowed(&self, topic: &str) -> Result<(), TransportError> {
        if self.inner.denied_topics.read().await.contains(topic) {
            return Err(TransportError::Unauthorized(format!(
                "not authorized for topic '{}'",
                topic
            )));
        }
        Ok(())
    }
}

impl Connector for LocalBus {
    type Conn = LocalConnection;

    async fn connect(&self) -> Result<LocalConnection, TransportError> {
        if self.inner.unreachable.load(Ordering::SeqCst) {
            return Err(TransportError::Timeout);
        }
        let id = self.inner.connections.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("local bus connection {} opened", id);
        Ok(LocalConnection {
            id,
            bus: self.clone(),
            closed: watch::Sender::new(false),
        })
    }
}

pub struct LocalConnection {
    id: usize,
    bus: LocalBus,
    /// subscription forwarders watch this to end on `close`
    closed: watch::Sender<bool>,
}

impl LocalConnection {
    pub fn id(&self) -> usize {
        self.id
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if *self.closed.borrow() {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

impl Connection for LocalConnection {
    async fn subscribe(&self, topic: &str) -> Result<Subscription, TransportError> {
        self.ensure_open()?;
        self.bus.ensure_allowed(topic).await?;

        let mut receiver = self.bus.sender(topic).await.subscribe();
        let (tx, subscription) = Subscription::channel(topic);
        let mut closed = self.closed.subscribe();

        tokio::spawn(async move {
            // false once the connection itself is dropped without `close`
            let mut watching = true;
            loop {
                let event = tokio::select! {
                    biased;
                    changed = closed.changed(), if watching => {
                        if changed.is_err() {
                            watching = false;
                            continue;
                        }
                        if !*closed.borrow() {
                            continue;
                        }
                        let _ = tx.send(StreamEvent::Closed).await;
                        break;
                    }
                    received = receiver.recv() => match received {
                        Ok(BusEvent::Message(body)) => StreamEvent::Message(body),
                        Ok(BusEvent::Error(err)) => StreamEvent::Error(err),
                        Err(RecvError::Lagged(skipped)) => StreamEvent::Error(TransportError::Io(
                            format!("subscriber lagged, {} messages skipped", skipped),
                        )),
                        Err(RecvError::Closed) => {
                            let _ = tx.send(StreamEvent::Closed).await;
                            break;
                        }
                    },
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        Ok(subscription)
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.bus.ensure_allowed(topic).await?;

        let delay = *self.bus.inner.publish_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        // no subscribers is not an error for a bus
        let _ = self.bus.sender(topic).await.send(BusEvent::Message(payload));
        Ok(())
    }

    async fn get_secret_value(&self, secret_id: &str) -> Result<String, TransportError> {
        self.ensure_open()?;
        self.bus
            .inner
            .secrets
            .read()
            .await
            .get(secret_id)
            .cloned()
            .ok_or_else(|| TransportError::Service(format!("secret '{}' not found", secret_id)))
    }

    async fn close(&self) {
        self.closed.send_replace(true);
        debug!("local bus connection {} closed", self.id);
    }
}
