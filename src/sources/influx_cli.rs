use tracing::{error, info};

use crate::cache::token::TokenRecord;
use crate::cache::token_set::TokenSet;
use crate::config::launch::{LaunchConfig, ServerProtocol};
use crate::sources::command::{render_command, CommandRunner};
use crate::sources::{FetchTokens, SourceError};

/// Where and how to reach the InfluxDB instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfluxConnectionParams {
    pub container_name: String,
    pub port: String,
    pub server_protocol: ServerProtocol,
    pub skip_tls_verify: bool,
}

impl From<&LaunchConfig> for InfluxConnectionParams {
    fn from(config: &LaunchConfig) -> Self {
        Self {
            container_name: config.container_name.to_owned(),
            port: config.port.to_owned(),
            server_protocol: config.server_protocol,
            skip_tls_verify: config.skip_tls_verify,
        }
    }
}

/// Lists tokens with `influx auth list --json` inside the database container.
#[derive(Debug, Clone)]
pub struct InfluxCliSource<R> {
    params: InfluxConnectionParams,
    docker_binary: String,
    runner: R,
}

impl<R: CommandRunner> InfluxCliSource<R> {
    pub fn new(params: InfluxConnectionParams, docker_binary: impl Into<String>, runner: R) -> Self {
        Self {
            params,
            docker_binary: docker_binary.into(),
            runner,
        }
    }

    pub fn auth_list_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["exec", "-t", self.params.container_name.as_str(), "influx", "auth", "list", "--json"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        if self.params.server_protocol == ServerProtocol::Https {
            args.push("--host".to_owned());
            args.push(format!(
                "https://{}:{}",
                self.params.container_name, self.params.port
            ));
        }
        if self.params.skip_tls_verify {
            args.push("--skip-verify".to_owned());
        }
        args
    }
}

impl<R: CommandRunner> FetchTokens for InfluxCliSource<R> {
    async fn fetch_tokens(&self) -> Result<TokenSet, SourceError> {
        let args = self.auth_list_args();
        let command = render_command(&self.docker_binary, &args);
        info!("Running the following command to retrieve the InfluxDB tokens: {}", command);

        let output = self
            .runner
            .run(&self.docker_binary, &args)
            .await
            .map_err(|source| SourceError::Spawn {
                command: command.to_owned(),
                source,
            })?;

        if !output.stderr.is_empty() {
            error!("{}", String::from_utf8_lossy(&output.stderr).trim_end());
        }
        if output.stdout.iter().all(u8::is_ascii_whitespace) {
            error!("Failed to retrieve InfluxDB token data from Docker, no output received");
            return Err(SourceError::SourceUnavailable { command });
        }

        let tokens = decode_token_list(&output.stdout)?;
        info!("retrieved {} InfluxDB token records", tokens.len());
        Ok(tokens)
    }
}

/// Decode CLI output. The first record is the operator token created with
/// the instance; an empty value there means the listing is unusable.
pub fn decode_token_list(stdout: &[u8]) -> Result<TokenSet, SourceError> {
    let records: Vec<TokenRecord> = serde_json::from_slice(stdout)
        .map_err(|e| SourceError::MalformedSource(format!("token list is not valid JSON: {}", e)))?;

    let first = records
        .first()
        .ok_or_else(|| SourceError::MalformedSource("token list is empty".to_owned()))?;
    if !first.has_token() {
        error!(
            "Failed to parse InfluxDB token list, first record '{}' has an empty token",
            first.description
        );
        return Err(SourceError::MalformedSource(format!(
            "first token record '{}' has an empty token",
            first.description
        )));
    }

    Ok(TokenSet::new(records))
}
