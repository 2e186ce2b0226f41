use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One entry of `influx auth list --json`.
///
/// Only `description` and `token` drive resolution; the rest is carried
/// as-is. Fields the CLI adds in newer versions land in `extra`.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TokenRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, rename = "userName")]
    pub user_name: String,
    #[serde(default, rename = "userID")]
    pub user_id: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenRecord {
    pub fn new(description: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            token: token.into(),
            ..Default::default()
        }
    }

    pub fn has_token(&self) -> bool {
        !self.token.is_empty()
    }
}

// secret material never reaches logs
impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("token", &if self.has_token() { "<redacted>" } else { "<empty>" })
            .field("status", &self.status)
            .field("user_name", &self.user_name)
            .finish_non_exhaustive()
    }
}
