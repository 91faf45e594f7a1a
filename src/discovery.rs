//! OP protocol-metadata discovery with caching.
//!
//! Discovery is independent of trust validation: an OP can be previewed
//! before being declared trustworthy. Documents are cached under the same
//! TTL scheme as validation verdicts.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheStats, CacheSweeper, ExpiringCache};
use crate::config::FederationConfig;
use crate::error::{FedResult, FederationError};
use crate::models::DiscoveredMetadata;

/// Conventional well-known suffix for OP metadata.
const WELL_KNOWN_SUFFIX: &str = "/.well-known/openid-configuration";

/// Raw metadata document as the OP publishes it. Required members are
/// promoted so their absence can be reported by name; everything else is
/// collected for pass-through.
#[derive(Debug, Deserialize)]
struct MetadataDocument {
    issuer: Option<String>,
    authorization_endpoint: Option<String>,
    token_endpoint: Option<String>,
    jwks_uri: Option<String>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl MetadataDocument {
    /// Exactly the required members absent from this document.
    fn missing_required_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.issuer.is_none() {
            missing.push("issuer");
        }
        if self.authorization_endpoint.is_none() {
            missing.push("authorization_endpoint");
        }
        if self.token_endpoint.is_none() {
            missing.push("token_endpoint");
        }
        if self.jwks_uri.is_none() {
            missing.push("jwks_uri");
        }
        missing
    }
}

/// Fetches and caches OP protocol-metadata documents.
#[derive(Debug, Clone)]
pub struct DiscoveryService {
    http_client: reqwest::Client,
    cache: Arc<ExpiringCache<DiscoveredMetadata>>,
    timeout: Duration,
    sweeper: Arc<CacheSweeper>,
}

impl DiscoveryService {
    /// Create a discovery service using the configured cache TTL, fetch
    /// deadline, and sweep interval.
    ///
    /// Must be called from within a tokio runtime (the sweeper task is
    /// spawned here).
    pub fn new(config: &FederationConfig) -> FedResult<Self> {
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.discovery_timeout)
            .build()
            .map_err(|e| {
                FederationError::InvalidConfiguration(format!("failed to build HTTP client: {e}"))
            })?;
        let cache = Arc::new(ExpiringCache::new(config.discovery_cache_ttl));
        let sweeper = CacheSweeper::spawn(Arc::clone(&cache), config.sweep_interval, "discovery");
        Ok(Self {
            http_client,
            cache,
            timeout: config.discovery_timeout,
            sweeper: Arc::new(sweeper),
        })
    }

    /// The well-known metadata URL for an OP: trailing path separators are
    /// stripped, then the conventional suffix is appended.
    #[must_use]
    pub fn well_known_url(op_entity_id: &str) -> String {
        format!("{}{WELL_KNOWN_SUFFIX}", op_entity_id.trim_end_matches('/'))
    }

    /// Fetch the OP's metadata, served from cache when an unexpired
    /// document is held (`cached = true` on the result).
    #[instrument(skip(self))]
    pub async fn discover(&self, op_entity_id: &str) -> FedResult<DiscoveredMetadata> {
        let op_entity_id = op_entity_id.trim_end_matches('/');

        if let Some(mut hit) = self.cache.get(op_entity_id).await {
            debug!(op_entity_id, "discovery cache hit");
            hit.cached = true;
            return Ok(hit);
        }

        let metadata = self.fetch(op_entity_id).await?;
        self.cache.insert(op_entity_id, metadata.clone()).await;
        info!(
            op_entity_id,
            issuer = %metadata.issuer,
            token_endpoint = %metadata.token_endpoint,
            "OP metadata discovered"
        );
        Ok(metadata)
    }

    /// The cached document for an OP, if unexpired. Read-only apart from
    /// lazy eviction of an expired entry.
    pub async fn cached_metadata(&self, op_entity_id: &str) -> Option<DiscoveredMetadata> {
        let op_entity_id = op_entity_id.trim_end_matches('/');
        self.cache.get(op_entity_id).await.map(|mut hit| {
            hit.cached = true;
            hit
        })
    }

    /// Clear one OP's cached document, or the whole cache when no OP is
    /// given.
    pub async fn clear_cache(&self, op_entity_id: Option<&str>) {
        match op_entity_id {
            Some(op) => {
                self.cache.remove(op.trim_end_matches('/')).await;
            }
            None => self.cache.clear().await,
        }
    }

    /// Occupancy of the metadata cache, for diagnostics.
    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Stop the background sweeper. Also happens when the last clone of
    /// this service is dropped.
    pub fn stop(&self) {
        self.sweeper.stop();
    }

    async fn fetch(&self, op_entity_id: &str) -> FedResult<DiscoveredMetadata> {
        let url = Self::well_known_url(op_entity_id);
        debug!(op_entity_id, url, "fetching OP metadata");

        let response = self.http_client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                FederationError::DiscoveryTimeout {
                    op_entity_id: op_entity_id.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                }
            } else if e.is_connect() {
                FederationError::OpUnreachable {
                    op_entity_id: op_entity_id.to_string(),
                    detail: e.to_string(),
                }
            } else {
                FederationError::DiscoveryFailed {
                    op_entity_id: op_entity_id.to_string(),
                    detail: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(op_entity_id, status = %status, "discovery returned non-success status");
            return Err(FederationError::InvalidDiscoveryResponse {
                op_entity_id: op_entity_id.to_string(),
                detail: format!("HTTP status {status}"),
                missing_fields: Vec::new(),
            });
        }

        let document: MetadataDocument = response.json().await.map_err(|e| {
            FederationError::InvalidDiscoveryResponse {
                op_entity_id: op_entity_id.to_string(),
                detail: format!("metadata document is not valid JSON: {e}"),
                missing_fields: Vec::new(),
            }
        })?;

        let missing = document.missing_required_fields();
        if !missing.is_empty() {
            warn!(op_entity_id, ?missing, "discovery document missing required fields");
            return Err(FederationError::InvalidDiscoveryResponse {
                op_entity_id: op_entity_id.to_string(),
                detail: format!("missing required fields: {}", missing.join(", ")),
                missing_fields: missing.into_iter().map(str::to_string).collect(),
            });
        }

        // missing_required_fields just confirmed all four are present.
        Ok(DiscoveredMetadata {
            op_entity_id: op_entity_id.to_string(),
            issuer: document.issuer.unwrap_or_default(),
            authorization_endpoint: document.authorization_endpoint.unwrap_or_default(),
            token_endpoint: document.token_endpoint.unwrap_or_default(),
            jwks_uri: document.jwks_uri.unwrap_or_default(),
            extra: document.extra,
            discovered_at: Utc::now(),
            cached: false,
        })
    }
}
