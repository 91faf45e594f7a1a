//! Federation trust layer configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{FedResult, FederationError};

/// Hard deadline for a single trust-chain resolution. The resolver is
/// raced against this; losing the race yields a `timeout` validation
/// error rather than an open-ended wait on a slow or hostile OP.
pub const VALIDATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Default TTL for cached validation results (1 hour).
pub const DEFAULT_VALIDATION_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Default TTL for cached discovery metadata (1 hour).
pub const DEFAULT_DISCOVERY_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Default deadline for a discovery fetch (10 seconds).
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between periodic cache sweeps (10 minutes).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

/// Configuration for the RP's trust validation and discovery layer.
#[derive(Debug, Clone)]
pub struct FederationConfig {
    /// Entity identifier of the trust anchor every OP's chain must
    /// terminate at. Must be `https`, or `http://localhost[:port]` for
    /// development.
    pub trust_anchor: String,

    /// How long a validation verdict (positive or negative) stays cached.
    pub validation_cache_ttl: Duration,

    /// How long discovered OP metadata stays cached.
    pub discovery_cache_ttl: Duration,

    /// Deadline for fetching an OP's metadata document.
    pub discovery_timeout: Duration,

    /// Interval between background sweeps of expired cache entries.
    pub sweep_interval: Duration,

    /// Where the per-OP credential file lives.
    pub credentials_path: PathBuf,
}

impl FederationConfig {
    /// Build a configuration with spec defaults for the given trust anchor
    /// and credential file location.
    pub fn new(trust_anchor: impl Into<String>, credentials_path: impl Into<PathBuf>) -> Self {
        Self {
            trust_anchor: trust_anchor.into(),
            validation_cache_ttl: DEFAULT_VALIDATION_CACHE_TTL,
            discovery_cache_ttl: DEFAULT_DISCOVERY_CACHE_TTL,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            credentials_path: credentials_path.into(),
        }
    }

    /// Check the configuration is usable. Called by component constructors;
    /// a missing or insecure trust anchor fails construction immediately.
    pub fn validate(&self) -> FedResult<()> {
        if self.trust_anchor.trim().is_empty() {
            return Err(FederationError::InvalidConfiguration(
                "trust anchor is required".to_string(),
            ));
        }
        if !is_secure_url(&self.trust_anchor) {
            return Err(FederationError::InvalidConfiguration(format!(
                "trust anchor must be an https URL (or http://localhost for development), got: {}",
                self.trust_anchor
            )));
        }
        Ok(())
    }
}

/// Whether a string is an absolute URL acceptable as an entity identifier:
/// `https`, with `http` allowed only for literal `localhost` (optionally
/// with a port) during development.
#[must_use]
pub fn is_secure_url(value: &str) -> bool {
    let Ok(parsed) = url::Url::parse(value) else {
        return false;
    };
    match parsed.scheme() {
        "https" => parsed.host_str().is_some(),
        "http" => matches!(parsed.host_str(), Some("localhost")),
        _ => false,
    }
}
