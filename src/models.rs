//! Caller-facing record types for validation, discovery, and credentials.
//!
//! Serialized field names follow the RP's external contract
//! (`camelCase` for validation results and credential documents; OIDC
//! metadata keeps its standard `snake_case` member names).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classified reasons a trust validation can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorCode {
    /// The OP's entity configuration could not be fetched at all.
    OpUnreachable,
    /// A statement in the chain carries a signature that does not verify.
    InvalidSignature,
    /// An entity in the chain names no superior authority to continue
    /// resolution through.
    MissingAuthorityHints,
    /// The chain is incomplete or terminates at an authority other than
    /// the configured trust anchor.
    TrustChainInvalid,
    /// Resolution lost the race against the validation deadline.
    Timeout,
    /// A network-level failure distinct from the OP simply being absent.
    NetworkError,
    /// Catch-all for failures outside the classified cases.
    ValidationError,
}

impl ValidationErrorCode {
    /// The wire code for this error.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpUnreachable => "op_unreachable",
            Self::InvalidSignature => "invalid_signature",
            Self::MissingAuthorityHints => "missing_authority_hints",
            Self::TrustChainInvalid => "trust_chain_invalid",
            Self::Timeout => "timeout",
            Self::NetworkError => "network_error",
            Self::ValidationError => "validation_error",
        }
    }
}

impl std::fmt::Display for ValidationErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context attached to every validation error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationErrorDetails {
    /// The OP the failure concerns.
    pub op_entity_id: String,
    /// When the failure was observed.
    pub timestamp: DateTime<Utc>,
}

/// One classified failure in a validation outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub code: ValidationErrorCode,
    pub message: String,
    pub details: ValidationErrorDetails,
}

impl ValidationError {
    /// Build an error for `op_entity_id` observed now.
    pub fn new(
        code: ValidationErrorCode,
        message: impl Into<String>,
        op_entity_id: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            details: ValidationErrorDetails {
                op_entity_id: op_entity_id.into(),
                timestamp: Utc::now(),
            },
        }
    }
}

/// Outcome of a trust validation, positive or negative.
///
/// `timestamp` is when the verdict was computed; a cached verdict keeps
/// its original timestamp (expiry never slides on read).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub op_entity_id: String,
    pub is_valid: bool,
    /// The anchor the chain terminated at, present only on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_anchor: Option<String>,
    pub errors: Vec<ValidationError>,
    /// Whether this verdict was served from cache.
    pub cached: bool,
    pub timestamp: DateTime<Utc>,
}

/// An OP's discovered protocol metadata.
///
/// The four required endpoints are promoted to fields; everything else the
/// OP published passes through untouched in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredMetadata {
    pub op_entity_id: String,
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    /// Pass-through of all other metadata members.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
    pub discovered_at: DateTime<Utc>,
    /// Whether this document was served from cache.
    pub cached: bool,
}

/// A registration secret held for one OP.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub op_entity_id: String,
    pub client_secret: String,
    pub registered_at: DateTime<Utc>,
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("op_entity_id", &self.op_entity_id)
            .field("client_secret", &"[REDACTED]")
            .field("registered_at", &self.registered_at)
            .finish()
    }
}
