//! # Transport
//!
//! The broker never talks to a concrete pub/sub implementation directly.
//! It goes through two seams:
//! - [`Connector`] opens independent connections (the broker holds two: one
//!   for the subscription stream and one for publishing)
//! - [`Connection`] subscribes, publishes and fetches secrets
//!
//! Implementations:
//! - `local`: in-process bus on `tokio::sync::broadcast`
//! - `socket`: newline-delimited JSON frames over a Unix domain socket

use std::future::Future;

use thiserror::Error;
use tokio::sync::mpsc;

pub mod frame;
pub mod local;
pub mod socket;

/// Capacity of the per-subscription event queue.
pub const SUBSCRIPTION_BUFFER_SIZE: usize = 64;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("operation timed out")]
    Timeout,
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("connection closed")]
    Closed,
    #[error("io error: {0}")]
    Io(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("service error: {0}")]
    Service(String),
}

/// Coarse classification used by the stream error policy and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    Timeout,
    Unauthorized,
    Closed,
    Io,
    Protocol,
    Service,
}

impl TransportErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Unauthorized => "unauthorized",
            TransportErrorKind::Closed => "closed",
            TransportErrorKind::Io => "io",
            TransportErrorKind::Protocol => "protocol",
            TransportErrorKind::Service => "service",
        }
    }
}

impl TransportError {
    pub fn kind(&self) -> TransportErrorKind {
        match self {
            TransportError::Timeout => TransportErrorKind::Timeout,
            TransportError::Unauthorized(_) => TransportErrorKind::Unauthorized,
            TransportError::Closed => TransportErrorKind::Closed,
            TransportError::Io(_) => TransportErrorKind::Io,
            TransportError::Protocol(_) => TransportErrorKind::Protocol,
            TransportError::Service(_) => TransportErrorKind::Service,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

/// What a subscription stream delivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Raw message body as published on the topic.
    Message(Vec<u8>),
    /// Transport-level problem on the stream (not a decode problem).
    Error(TransportError),
    /// The transport will deliver nothing more.
    Closed,
}

/// Receiving half of an active topic subscription.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    events: mpsc::Receiver<StreamEvent>,
}

impl Subscription {
    pub fn new(topic: String, events: mpsc::Receiver<StreamEvent>) -> Self {
        Self { topic, events }
    }

    /// Build a subscription together with the sender that feeds it.
    pub fn channel(topic: &str) -> (mpsc::Sender<StreamEvent>, Self) {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER_SIZE);
        (tx, Self::new(topic.to_owned(), rx))
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next event in arrival order. `None` once the feeding side is gone.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }
}

pub trait Connection: Send + Sync + 'static {
    fn subscribe(
        &self,
        topic: &str,
    ) -> impl Future<Output = Result<Subscription, TransportError>> + Send;

    /// Resolves once the transport acknowledged the publish.
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn get_secret_value(
        &self,
        secret_id: &str,
    ) -> impl Future<Output = Result<String, TransportError>> + Send;

    fn close(&self) -> impl Future<Output = ()> + Send;
}

pub trait Connector: Send + Sync {
    type Conn: Connection;

    fn connect(&self) -> impl Future<Output = Result<Self::Conn, TransportError>> + Send;
}
