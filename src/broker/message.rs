use crate::resolver::TokenRequest;
use crate::utils::constants::LEGACY_REQUEST;

/// Inbound message decoded at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// Bare `GetInfluxDBData` body from older clients.
    Legacy,
    Request(TokenRequest),
    /// Anything else; handled as an unknown action.
    Unrecognized(String),
}

impl InboundMessage {
    pub fn decode(body: &[u8]) -> Self {
        if body == LEGACY_REQUEST {
            return InboundMessage::Legacy;
        }
        match serde_json::from_slice::<TokenRequest>(body) {
            Ok(request) => InboundMessage::Request(request),
            Err(err) => InboundMessage::Unrecognized(format!(
                "{} byte message is not a token request: {}",
                body.len(),
                err
            )),
        }
    }
}
