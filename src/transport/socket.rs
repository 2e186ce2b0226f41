use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::settings::TransportConfig;
use crate::transport::frame::{decode_line, encode_line, Event, Reply, Request};
use crate::transport::{Connection, Connector, StreamEvent, Subscription, TransportError};
use crate::utils::constants::{ENV_IPC_AUTH_TOKEN, ENV_IPC_SOCKET_PATH};

/// One request/reply channel on top of a Unix stream.
struct FramedStream {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl FramedStream {
    async fn open(path: &Path, auth_token: Option<&str>) -> Result<Self, TransportError> {
        let stream = UnixStream::connect(path).await?;
        let (read_half, writer) = stream.into_split();
        let mut framed = Self {
            lines: BufReader::new(read_half).lines(),
            writer,
        };
        framed
            .call(&Request::Connect {
                auth_token: auth_token.map(str::to_owned),
            })
            .await?;
        Ok(framed)
    }

    async fn call(&mut self, request: &Request) -> Result<Option<String>, TransportError> {
        self.writer.write_all(&encode_line(request)?).await?;
        self.writer.flush().await?;
        let line = self.lines.next_line().await?.ok_or(TransportError::Closed)?;
        decode_line::<Reply>(&line)?.into_result()
    }
}

/// Connects to the local IPC daemon over a Unix domain socket.
#[derive(Debug, Clone)]
pub struct SocketConnector {
    socket_path: PathBuf,
    auth_token: Option<String>,
}

impl SocketConnector {
    pub fn new(socket_path: impl Into<PathBuf>, auth_token: Option<String>) -> Self {
        Self {
            socket_path: socket_path.into(),
            auth_token,
        }
    }

    /// Socket path and auth token come from settings, falling back to the
    /// environment the IPC daemon exports to its components.
    pub fn from_settings(config: &TransportConfig) -> anyhow::Result<Self> {
        let socket_path = config
            .socket_path
            .clone()
            .or_else(|| std::env::var(ENV_IPC_SOCKET_PATH).ok())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "IPC socket path is not configured; set transport.socket_path or {}",
                    ENV_IPC_SOCKET_PATH
                )
            })?;
        let auth_token = config
            .auth_token
            .clone()
            .or_else(|| std::env::var(ENV_IPC_AUTH_TOKEN).ok());
        if auth_token.is_none() {
            warn!("no IPC auth token configured, connecting anonymously");
        }
        Ok(Self::new(socket_path, auth_token))
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Connector for SocketConnector {
    type Conn = SocketConnection;

    async fn connect(&self) -> Result<SocketConnection, TransportError> {
        let framed = FramedStream::open(&self.socket_path, self.auth_token.as_deref()).await?;
        debug!("connected to IPC socket {}", self.socket_path.display());
        Ok(SocketConnection {
            socket_path: self.socket_path.clone(),
            auth_token: self.auth_token.clone(),
            framed: Mutex::new(Some(framed)),
            closed: AtomicBool::new(false),
        })
    }
}

pub struct SocketConnection {
    socket_path: PathBuf,
    auth_token: Option<String>,
    /// `None` after an interrupted call; the next call reconnects.
    framed: Mutex<Option<FramedStream>>,
    closed: AtomicBool,
}

impl SocketConnection {
    /// One request/reply exchange. The stream is only put back once its
    /// reply has been read; a cancelled call leaves `None` behind.
    async fn call(&self, request: &Request) -> Result<Option<String>, TransportError> {
        let mut guard = self.framed.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let mut framed = match guard.take() {
            Some(framed) => framed,
            None => {
                warn!(
                    "reconnecting to IPC socket {} after an interrupted call",
                    self.socket_path.display()
                );
                FramedStream::open(&self.socket_path, self.auth_token.as_deref()).await?
            }
        };

        let result = framed.call(request).await;
        match &result {
            Err(TransportError::Io(_)) | Err(TransportError::Closed) | Err(TransportError::Protocol(_)) => {
                debug!("dropping IPC stream after failed exchange");
            }
            _ => *guard = Some(framed),
        }
        result
    }
}

impl Connection for SocketConnection {
    /// Opens a dedicated socket that carries only this topic's events.
    async fn subscribe(&self, topic: &str) -> Result<Subscription, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let mut framed = FramedStream::open(&self.socket_path, self.auth_token.as_deref()).await?;
        framed
            .call(&Request::Subscribe {
                topic: topic.to_owned(),
            })
            .await?;

        let (tx, subscription) = Subscription::channel(topic);
        let topic = topic.to_owned();
        tokio::spawn(async move {
            let FramedStream { mut lines, writer } = framed;
            loop {
                let event = match lines.next_line().await {
                    Ok(Some(line)) => match decode_line::<Event>(&line) {
                        Ok(event) => event.into_stream_event(),
                        Err(err) => StreamEvent::Error(err),
                    },
                    Ok(None) => StreamEvent::Closed,
                    Err(err) => {
                        // the socket is unusable after a read error
                        let _ = tx.send(StreamEvent::Error(err.into())).await;
                        StreamEvent::Closed
                    }
                };
                let closed = event == StreamEvent::Closed;
                if tx.send(event).await.is_err() || closed {
                    break;
                }
            }
            drop(writer);
            info!("subscription socket for topic '{}' finished", topic);
        });

        Ok(subscription)
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.call(&Request::publish(topic, &payload)).await.map(|_| ())
    }

    async fn get_secret_value(&self, secret_id: &str) -> Result<String, TransportError> {
        self.call(&Request::GetSecretValue {
            secret_id: secret_id.to_owned(),
        })
        .await?
        .ok_or_else(|| TransportError::Protocol("reply carried no secret_string".to_owned()))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(mut framed) = self.framed.lock().await.take() {
            let _ = framed.writer.shutdown().await;
        }
    }
}
