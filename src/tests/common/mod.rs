// tests/common/mod.rs
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::timeout;

use crate::broker::BrokerSettings;
use crate::config::launch::{LaunchArgs, LaunchConfig};
use crate::sources::command::{CommandOutput, CommandRunner};
use crate::transport::{StreamEvent, Subscription};

pub const INBOUND_TOPIC: &str = "greengrass/influxdb/token/request";
pub const OUTBOUND_TOPIC: &str = "greengrass/influxdb/token/response";

pub fn launch_config() -> LaunchConfig {
    LaunchConfig::from_args(&LaunchArgs {
        subscribe_topic: INBOUND_TOPIC.into(),
        publish_topic: OUTBOUND_TOPIC.into(),
        influxdb_container_name: "greengrass_InfluxDB".into(),
        influxdb_org: "greengrass".into(),
        influxdb_bucket: "greengrass-telemetry".into(),
        influxdb_port: "8086".into(),
        influxdb_interface: "127.0.0.1".into(),
        server_protocol: "https".into(),
        skip_tls_verify: "true".into(),
    })
    .expect("fixture launch args are valid")
}

/// Admin, RW and RO records, in the order `influx auth list` prints them.
pub fn three_token_listing() -> Value {
    json!([
        {"id": "0a1", "description": "admin's Token", "token": "T-ADMIN", "status": "active"},
        {"id": "0a2", "description": "greengrass_readwrite", "token": "T-RW", "status": "active"},
        {"id": "0a3", "description": "greengrass_read", "token": "T-RO", "status": "active"}
    ])
}

/// Short timeouts so failure paths finish quickly.
pub fn fast_settings() -> BrokerSettings {
    BrokerSettings {
        connect_timeout: Duration::from_millis(500),
        subscribe_timeout: Duration::from_millis(500),
        publish_timeout: Duration::from_millis(300),
    }
}

/// Command runner returning canned output and counting invocations.
#[derive(Clone, Default)]
pub struct CannedRunner {
    pub output: CommandOutput,
    pub calls: Arc<AtomicUsize>,
}

impl CannedRunner {
    pub fn with_stdout(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            output: CommandOutput {
                stdout: stdout.into(),
                stderr: Vec::new(),
            },
            ..Default::default()
        }
    }

    pub fn with_listing(listing: &Value) -> Self {
        Self::with_stdout(serde_json::to_vec(listing).expect("listing encodes"))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CommandRunner for CannedRunner {
    async fn run(&self, _program: &str, _args: &[String]) -> std::io::Result<CommandOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }
}

/// Next message body on `subscription` as JSON, or `None` when nothing
/// arrives within `wait`.
pub async fn next_json(subscription: &mut Subscription, wait: Duration) -> Option<Value> {
    loop {
        match timeout(wait, subscription.next()).await {
            Ok(Some(StreamEvent::Message(body))) => {
                return Some(serde_json::from_slice(&body).expect("response is JSON"))
            }
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => return None,
        }
    }
}
