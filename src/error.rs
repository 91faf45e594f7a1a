//! Error types for the federation trust layer.

use thiserror::Error;

/// Result type for federation trust operations.
pub type FedResult<T> = Result<T, FederationError>;

/// Errors surfaced by the discovery service, credential store, and
/// component construction.
///
/// Trust-validation outcomes are deliberately *not* represented here:
/// [`crate::TrustValidator::validate`] never fails, it returns a
/// [`crate::ValidationResult`] whose `errors` list carries the taxonomy
/// of validation failures.
#[derive(Debug, Error)]
pub enum FederationError {
    /// Component construction rejected its configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // Discovery errors
    /// The OP could not be reached at all (DNS failure, connection refused).
    #[error("OP unreachable at {op_entity_id}: {detail}")]
    OpUnreachable { op_entity_id: String, detail: String },

    /// The discovery request did not complete within the deadline.
    #[error("Discovery timed out for {op_entity_id} after {timeout_secs}s")]
    DiscoveryTimeout {
        op_entity_id: String,
        timeout_secs: u64,
    },

    /// The OP answered, but the metadata document is unusable: non-success
    /// status, unparseable body, or required fields absent.
    #[error("Invalid discovery response from {op_entity_id}: {detail}")]
    InvalidDiscoveryResponse {
        op_entity_id: String,
        detail: String,
        /// Exactly the required fields absent from the document, when that
        /// is the reason for rejection.
        missing_fields: Vec<String>,
    },

    /// Discovery failed for a reason outside the classified cases.
    #[error("Discovery failed for {op_entity_id}: {detail}")]
    DiscoveryFailed { op_entity_id: String, detail: String },

    // Credential store errors
    /// Persisting the credential file failed. There is no degraded response
    /// for "could not persist a secret", so this propagates to the caller.
    #[error("Failed to persist credentials to {path}: {detail}")]
    CredentialsStorageFailed { path: String, detail: String },

    /// An existing credential file could not be read or parsed.
    #[error("Failed to load credentials from {path}: {detail}")]
    CredentialsLoadFailed { path: String, detail: String },
}

impl FederationError {
    /// Stable machine-readable code for each error, for callers that map
    /// failures to remediation guidance or API responses.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            Self::OpUnreachable { .. } => "OP_UNREACHABLE",
            Self::DiscoveryTimeout { .. } => "DISCOVERY_TIMEOUT",
            Self::InvalidDiscoveryResponse { .. } => "INVALID_DISCOVERY_RESPONSE",
            Self::DiscoveryFailed { .. } => "DISCOVERY_FAILED",
            Self::CredentialsStorageFailed { .. } => "CREDENTIALS_STORAGE_FAILED",
            Self::CredentialsLoadFailed { .. } => "CREDENTIALS_LOAD_FAILED",
        }
    }
}
