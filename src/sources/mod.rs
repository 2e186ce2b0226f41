/// Sources module
///
/// Token sources are read once at startup. `influx_cli` lists tokens through
/// the InfluxDB CLI inside the database container; `command` is the seam
/// that actually runs the external process.

use std::future::Future;

use thiserror::Error;

use crate::cache::token_set::TokenSet;

pub mod command;
pub mod influx_cli;

pub trait FetchTokens {
    fn fetch_tokens(&self) -> impl Future<Output = Result<TokenSet, SourceError>> + Send;
}

/// Every variant is fatal at startup.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to retrieve InfluxDB token data: `{command}` produced no output")]
    SourceUnavailable { command: String },
    #[error("malformed InfluxDB token data: {0}")]
    MalformedSource(String),
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}
