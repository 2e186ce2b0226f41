//! Wire frames for the Unix socket transport.
//!
//! One JSON object per line. A client sends [`Request`] frames and reads
//! one [`Reply`] per request; a subscription socket then streams [`Event`]
//! frames until it closes. Message bodies are base64 encoded.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::transport::{StreamEvent, TransportError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Connect {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        auth_token: Option<String>,
    },
    Subscribe {
        topic: String,
    },
    Publish {
        topic: String,
        payload: String,
    },
    GetSecretValue {
        secret_id: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
    Ok {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        secret_string: Option<String>,
    },
    Unauthorized {
        #[serde(default)]
        message: String,
    },
    Timeout,
    Error {
        #[serde(default)]
        message: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    Message {
        payload: String,
    },
    Error {
        #[serde(default)]
        message: String,
    },
    Closed,
}

impl Request {
    pub fn publish(topic: &str, body: &[u8]) -> Self {
        Request::Publish {
            topic: topic.to_owned(),
            payload: STANDARD.encode(body),
        }
    }
}

impl Reply {
    /// Success carries the optional secret string.
    pub fn into_result(self) -> Result<Option<String>, TransportError> {
        match self {
            Reply::Ok { secret_string } => Ok(secret_string),
            Reply::Unauthorized { message } => Err(TransportError::Unauthorized(message)),
            Reply::Timeout => Err(TransportError::Timeout),
            Reply::Error { message } => Err(TransportError::Service(message)),
        }
    }
}

impl Event {
    pub fn message(body: &[u8]) -> Self {
        Event::Message {
            payload: STANDARD.encode(body),
        }
    }

    pub fn into_stream_event(self) -> StreamEvent {
        match self {
            Event::Message { payload } => match STANDARD.decode(payload.as_bytes()) {
                Ok(body) => StreamEvent::Message(body),
                Err(err) => StreamEvent::Error(TransportError::Protocol(format!(
                    "message payload is not base64: {}",
                    err
                ))),
            },
            Event::Error { message } => StreamEvent::Error(TransportError::Service(message)),
            Event::Closed => StreamEvent::Closed,
        }
    }
}

/// Serialize a frame as one line, newline included.
pub fn encode_line<T: Serialize>(frame: &T) -> Result<Vec<u8>, TransportError> {
    let mut line = serde_json::to_vec(frame)
        .map_err(|e| TransportError::Protocol(format!("failed to encode frame: {}", e)))?;
    line.push(b'\n');
    Ok(line)
}

pub fn decode_line<'a, T: Deserialize<'a>>(line: &'a str) -> Result<T, TransportError> {
    serde_json::from_str(line)
        .map_err(|e| TransportError::Protocol(format!("invalid frame '{}': {}", line, e)))
}
