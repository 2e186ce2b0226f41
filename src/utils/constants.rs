//! Shared constants and invariants

pub const DEFAULT_PUBLISH_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_SUBSCRIBE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_SECRET_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_IDLE_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_DOCKER_BINARY: &str = "docker";

// Request protocol
pub const RETRIEVE_TOKEN_ACTION: &str = "RetrieveToken";
pub const LEGACY_REQUEST: &[u8] = b"GetInfluxDBData";

// Token naming conventions in `influx auth list`
pub const READ_WRITE_TOKEN_DESCRIPTION: &str = "greengrass_readwrite";
pub const READ_ONLY_TOKEN_DESCRIPTION: &str = "greengrass_read";
/// Operator tokens are named "<user>'s Token" by the InfluxDB setup.
pub const ADMIN_TOKEN_DESCRIPTION_MARKER: &str = "'s Token";

// Environment exported by the IPC daemon to its components
pub const ENV_IPC_SOCKET_PATH: &str = "AWS_GG_NUCLEUS_DOMAIN_SOCKET_FILEPATH_FOR_COMPONENT";
pub const ENV_IPC_AUTH_TOKEN: &str = "SVCUID";
