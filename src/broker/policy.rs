use crate::transport::TransportErrorKind;

/// What the broker does with its subscription after a stream error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDisposition {
    KeepOpen,
    /// stop listening; the broker then reports `Stopped`
    Close,
}

/// Error kind → disposition. Kinds missing from a table keep the stream open.
pub type StreamErrorPolicy = &'static [(TransportErrorKind, StreamDisposition)];

/// Policy the broker runs with. Availability wins: no kind closes the stream.
pub const STREAM_ERROR_POLICY: StreamErrorPolicy = &[
    (TransportErrorKind::Timeout, StreamDisposition::KeepOpen),
    (TransportErrorKind::Unauthorized, StreamDisposition::KeepOpen),
    (TransportErrorKind::Closed, StreamDisposition::KeepOpen),
    (TransportErrorKind::Io, StreamDisposition::KeepOpen),
    (TransportErrorKind::Protocol, StreamDisposition::KeepOpen),
    (TransportErrorKind::Service, StreamDisposition::KeepOpen),
];

pub fn stream_error_disposition(policy: StreamErrorPolicy, kind: TransportErrorKind) -> StreamDisposition {
    policy
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, disposition)| *disposition)
        .unwrap_or(StreamDisposition::KeepOpen)
}
