//! # Token resolution
//!
//! Maps a decoded token request to exactly one token record, or to an
//! outcome that is either dropped silently or surfaced as an error.
//!
//! Selection policy:
//! - action must be `RetrieveToken`
//! - `RW` → first record described `greengrass_readwrite`
//! - `RO` → first record described `greengrass_read`
//! - `Admin` → record at index 0, only when its description names an
//!   operator token (`<user>'s Token`)
//! - the selected token must be non-empty

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::token::TokenRecord;
use crate::cache::token_set::TokenSet;
use crate::resolver::payload::{ConnectionMetadata, LegacyPayload, ResponsePayload};
use crate::utils::constants::{
    ADMIN_TOKEN_DESCRIPTION_MARKER, READ_ONLY_TOKEN_DESCRIPTION, READ_WRITE_TOKEN_DESCRIPTION,
    RETRIEVE_TOKEN_ACTION,
};

pub mod payload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AccessLevel {
    #[serde(rename = "RW")]
    ReadWrite,
    #[serde(rename = "RO")]
    ReadOnly,
    #[serde(rename = "Admin")]
    Admin,
}

impl AccessLevel {
    /// Wire name → level. Names are case sensitive.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "RW" => Some(AccessLevel::ReadWrite),
            "RO" => Some(AccessLevel::ReadOnly),
            "Admin" => Some(AccessLevel::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::ReadWrite => "RW",
            AccessLevel::ReadOnly => "RO",
            AccessLevel::Admin => "Admin",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request as it arrives on the wire; both fields are unchecked.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TokenRequest {
    pub action: String,
    #[serde(rename = "accessLevel")]
    pub access_level: String,
}

impl TokenRequest {
    pub fn new(action: impl Into<String>, access_level: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            access_level: access_level.into(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("unknown action '{0}'")]
    UnknownAction(String),
    #[error("unknown access level '{0}'")]
    UnknownAccessLevel(String),
    #[error("first token record '{description}' is not an admin token")]
    MalformedAdminToken { description: String },
    #[error("no token record described '{description}' for access level {access_level}")]
    TokenNotFound {
        access_level: AccessLevel,
        description: &'static str,
    },
    #[error("resolved InfluxDB token for access level {0} is empty")]
    EmptyToken(AccessLevel),
}

impl ResolutionError {
    /// Surfaced errors are reported as failures; everything else is a
    /// request that is dropped with a warning and never answered.
    pub fn is_surfaced(&self) -> bool {
        matches!(self, ResolutionError::EmptyToken(_))
    }

    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            ResolutionError::UnknownAction(_) => "unknown_action",
            ResolutionError::UnknownAccessLevel(_) => "unknown_access_level",
            ResolutionError::MalformedAdminToken { .. } => "malformed_admin_token",
            ResolutionError::TokenNotFound { .. } => "token_not_found",
            ResolutionError::EmptyToken(_) => "empty_token",
        }
    }
}

/// Holds the startup token set and static metadata for the process lifetime.
#[derive(Debug, Clone)]
pub struct Resolver {
    tokens: TokenSet,
    metadata: Arc<ConnectionMetadata>,
}

impl Resolver {
    pub fn new(tokens: TokenSet, metadata: ConnectionMetadata) -> Self {
        Self {
            tokens,
            metadata: Arc::new(metadata),
        }
    }

    pub fn tokens(&self) -> &TokenSet {
        &self.tokens
    }

    pub fn metadata(&self) -> &ConnectionMetadata {
        &self.metadata
    }

    pub fn resolve(&self, request: &TokenRequest) -> Result<ResponsePayload, ResolutionError> {
        if request.action != RETRIEVE_TOKEN_ACTION {
            return Err(ResolutionError::UnknownAction(request.action.to_owned()));
        }
        let access_level = AccessLevel::from_wire(&request.access_level)
            .ok_or_else(|| ResolutionError::UnknownAccessLevel(request.access_level.to_owned()))?;

        let record = self.select(access_level)?;
        if !record.has_token() {
            return Err(ResolutionError::EmptyToken(access_level));
        }

        Ok(ResponsePayload {
            metadata: (*self.metadata).clone(),
            access_type: access_level,
            token: record.token.to_owned(),
        })
    }

    /// Static bundle for the legacy request form.
    pub fn resolve_legacy(&self) -> Result<LegacyPayload, ResolutionError> {
        let record = self.select(AccessLevel::ReadWrite)?;
        if !record.has_token() {
            return Err(ResolutionError::EmptyToken(AccessLevel::ReadWrite));
        }
        Ok(LegacyPayload {
            metadata: (*self.metadata).clone(),
            rw_token: record.token.to_owned(),
        })
    }

    fn select(&self, access_level: AccessLevel) -> Result<&TokenRecord, ResolutionError> {
        match access_level {
            AccessLevel::ReadWrite => self.find(access_level, READ_WRITE_TOKEN_DESCRIPTION),
            AccessLevel::ReadOnly => self.find(access_level, READ_ONLY_TOKEN_DESCRIPTION),
            AccessLevel::Admin => {
                let first = self.tokens.first().ok_or_else(|| {
                    ResolutionError::MalformedAdminToken {
                        description: String::new(),
                    }
                })?;
                if !first.description.contains(ADMIN_TOKEN_DESCRIPTION_MARKER) {
                    return Err(ResolutionError::MalformedAdminToken {
                        description: first.description.to_owned(),
                    });
                }
                Ok(first)
            }
        }
    }

    fn find(
        &self,
        access_level: AccessLevel,
        description: &'static str,
    ) -> Result<&TokenRecord, ResolutionError> {
        self.tokens
            .find_by_description(description)
            .ok_or(ResolutionError::TokenNotFound {
                access_level,
                description,
            })
    }
}
