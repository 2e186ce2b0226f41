use serde::Serialize;

use crate::resolver::AccessLevel;

/// Connection details every response repeats. Fixed at launch.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConnectionMetadata {
    #[serde(rename = "InfluxDBContainerName")]
    pub container_name: String,
    #[serde(rename = "InfluxDBOrg")]
    pub org: String,
    #[serde(rename = "InfluxDBBucket")]
    pub bucket: String,
    #[serde(rename = "InfluxDBPort")]
    pub port: String,
    #[serde(rename = "InfluxDBInterface")]
    pub interface: String,
    #[serde(rename = "InfluxDBServerProtocol")]
    pub server_protocol: String,
    #[serde(rename = "InfluxDBSkipTLSVerify")]
    pub skip_tls_verify: String,
}

/// Response to a structured token request.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResponsePayload {
    #[serde(flatten)]
    pub metadata: ConnectionMetadata,
    #[serde(rename = "InfluxDBTokenAccessType")]
    pub access_type: AccessLevel,
    #[serde(rename = "InfluxDBToken")]
    pub token: String,
}

/// Response to the legacy `GetInfluxDBData` request: always the RW token.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LegacyPayload {
    #[serde(flatten)]
    pub metadata: ConnectionMetadata,
    #[serde(rename = "InfluxDBRWToken")]
    pub rw_token: String,
}

impl ResponsePayload {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl LegacyPayload {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
