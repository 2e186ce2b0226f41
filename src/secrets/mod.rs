//! # Secret retrieval
//!
//! Fetches the database credentials secret over the same transport the
//! broker uses and renders it as `"<username> <password>"` for the
//! container start script.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{error, info};

use crate::transport::{Connection, Connector, TransportError};

pub const USERNAME_KEY: &str = "influxdb_username";
pub const PASSWORD_KEY: &str = "influxdb_password";

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("timeout occurred while getting secret: {secret_id}")]
    Timeout { secret_id: String },
    #[error("unauthorized error while getting secret: {secret_id}: {message}")]
    Unauthorized { secret_id: String, message: String },
    #[error("exception while getting secret: {secret_id}: {source}")]
    Transport {
        secret_id: String,
        #[source]
        source: TransportError,
    },
    #[error("secret string is not a JSON object: {0}")]
    Decode(String),
    #[error("secret is missing key '{0}'")]
    MissingKey(&'static str),
}

/// Fetch the raw secret string, bounded by `wait`.
pub async fn get_secret_over_ipc<C: Connector>(
    connector: &C,
    secret_id: &str,
    wait: Duration,
) -> Result<String, SecretError> {
    let result = match timeout(wait, fetch_secret(connector, secret_id)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout),
    };

    result.map_err(|err| {
        let secret_id = secret_id.to_owned();
        let err = match err {
            TransportError::Timeout => SecretError::Timeout { secret_id },
            TransportError::Unauthorized(message) => SecretError::Unauthorized { secret_id, message },
            source => SecretError::Transport { secret_id, source },
        };
        error!("{}", err);
        err
    })
}

async fn fetch_secret<C: Connector>(connector: &C, secret_id: &str) -> Result<String, TransportError> {
    let connection = connector.connect().await?;
    let secret = connection.get_secret_value(secret_id).await;
    connection.close().await;
    secret
}

/// `{"influxdb_username": .., "influxdb_password": ..}` → `"user pass"`.
/// The username is checked first.
pub fn parse_credentials(secret_string: &str) -> Result<String, SecretError> {
    let secret: Value =
        serde_json::from_str(secret_string).map_err(|err| SecretError::Decode(err.to_string()))?;
    let object = secret
        .as_object()
        .ok_or_else(|| SecretError::Decode(format!("found {}", kind_of(&secret))))?;

    let field = |key: &'static str| -> Result<String, SecretError> {
        match object.get(key) {
            Some(Value::String(s)) => Ok(s.to_owned()),
            Some(Value::Null) | None => Err(SecretError::MissingKey(key)),
            Some(other) => Ok(other.to_string()),
        }
    };

    let username = field(USERNAME_KEY)?;
    let password = field(PASSWORD_KEY)?;
    Ok(format!("{} {}", username, password))
}

pub async fn retrieve_secret<C: Connector>(
    connector: &C,
    secret_id: &str,
    wait: Duration,
) -> Result<String, SecretError> {
    info!("retrieving secret {}", secret_id);
    let secret_string = get_secret_over_ipc(connector, secret_id, wait).await?;
    parse_credentials(&secret_string).inspect_err(|err| {
        error!("Exception while retrieving secret: {}: {}", secret_id, err);
    })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::local::LocalBus;

    const ARN: &str = "arn:aws:secretsmanager:us-east-1:000000000000:secret:influxdb";
    const WAIT: Duration = Duration::from_secs(2);

    #[test]
    fn credentials_are_joined_with_a_space() {
        let out = parse_credentials(r#"{"influxdb_username":"admin","influxdb_password":"p@ss word"}"#);
        assert_eq!(out.unwrap(), "admin p@ss word");
    }

    #[test]
    fn missing_username_is_reported_before_password() {
        let err = parse_credentials("{}").unwrap_err();
        assert!(matches!(err, SecretError::MissingKey(USERNAME_KEY)));

        let err = parse_credentials(r#"{"influxdb_username":"admin"}"#).unwrap_err();
        assert!(matches!(err, SecretError::MissingKey(PASSWORD_KEY)));
        assert_eq!(err.to_string(), "secret is missing key 'influxdb_password'");
    }

    #[test]
    fn non_object_secrets_fail_to_decode() {
        assert!(matches!(parse_credentials("not json"), Err(SecretError::Decode(_))));
        assert!(matches!(parse_credentials("[1,2]"), Err(SecretError::Decode(_))));
    }

    #[tokio::test]
    async fn retrieves_over_the_bus() {
        let bus = LocalBus::new();
        bus.insert_secret(ARN, r#"{"influxdb_username":"u","influxdb_password":"p"}"#)
            .await;

        assert_eq!(retrieve_secret(&bus, ARN, WAIT).await.unwrap(), "u p");
    }

    #[tokio::test]
    async fn transport_failures_are_classified() {
        let bus = LocalBus::new();
        let err = retrieve_secret(&bus, ARN, WAIT).await.unwrap_err();
        assert!(matches!(err, SecretError::Transport { .. }), "{}", err);

        bus.set_unreachable(true);
        let err = retrieve_secret(&bus, ARN, WAIT).await.unwrap_err();
        assert!(matches!(err, SecretError::Timeout { .. }), "{}", err);
    }
}
