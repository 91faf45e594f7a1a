//! Trust validation with caching, a hard deadline, and error
//! classification.
//!
//! The validator answers "is this OP trusted under our configured trust
//! anchor" before any authentication flow starts, and remembers the
//! verdict. Negative verdicts are cached exactly like positive ones:
//! staleness is traded for resistance to retry storms against a broken or
//! hostile OP. Cached verdicts keep their original timestamp; expiry
//! never slides on read.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheStats, CacheSweeper, ExpiringCache};
use crate::config::{is_secure_url, FederationConfig, VALIDATION_TIMEOUT};
use crate::error::FedResult;
use crate::models::{ValidationError, ValidationErrorCode, ValidationResult};
use crate::resolver::{classify_error_text, ResolveError, TrustChainResolver};

/// Decides whether remote OPs are trustworthy under one trust anchor.
///
/// Construction fails immediately on a missing or insecure anchor and
/// starts a periodic sweep of expired verdicts, so one-shot OPs that are
/// never re-queried do not accumulate. [`validate`](Self::validate) never
/// fails: every failure path funnels into the result's `errors` list.
#[derive(Clone)]
pub struct TrustValidator {
    trust_anchor: String,
    resolver: Arc<dyn TrustChainResolver>,
    cache: Arc<ExpiringCache<ValidationResult>>,
    /// In-flight resolutions keyed by OP id. A second concurrent caller
    /// for the same uncached key awaits the first caller's result instead
    /// of issuing a duplicate resolution.
    pending: Arc<Mutex<HashMap<String, watch::Receiver<Option<ValidationResult>>>>>,
    sweeper: Arc<CacheSweeper>,
}

enum FlightRole {
    Leader(watch::Sender<Option<ValidationResult>>),
    Follower(watch::Receiver<Option<ValidationResult>>),
}

impl TrustValidator {
    /// Create a validator for the configured trust anchor.
    ///
    /// Must be called from within a tokio runtime (the sweeper task is
    /// spawned here).
    pub fn new(config: &FederationConfig, resolver: Arc<dyn TrustChainResolver>) -> FedResult<Self> {
        config.validate()?;
        let cache = Arc::new(ExpiringCache::new(config.validation_cache_ttl));
        let sweeper = CacheSweeper::spawn(Arc::clone(&cache), config.sweep_interval, "validation");
        Ok(Self {
            trust_anchor: config.trust_anchor.clone(),
            resolver,
            cache,
            pending: Arc::new(Mutex::new(HashMap::new())),
            sweeper: Arc::new(sweeper),
        })
    }

    /// Validate `op_entity_id` against the configured trust anchor.
    ///
    /// Returns an unexpired cached verdict as-is (with `cached = true` and
    /// the original timestamp); otherwise races the resolver against the
    /// fixed validation deadline and caches whatever comes out, pass or
    /// fail.
    #[instrument(skip(self), fields(trust_anchor = %self.trust_anchor))]
    pub async fn validate(&self, op_entity_id: &str) -> ValidationResult {
        if let Some(mut hit) = self.cache.get(op_entity_id).await {
            debug!(op_entity_id, is_valid = hit.is_valid, "validation cache hit");
            hit.cached = true;
            return hit;
        }

        let role = {
            let mut pending = self.pending.lock().await;
            if let Some(rx) = pending.get(op_entity_id) {
                FlightRole::Follower(rx.clone())
            } else {
                let (tx, rx) = watch::channel(None);
                pending.insert(op_entity_id.to_string(), rx);
                FlightRole::Leader(tx)
            }
        };

        match role {
            FlightRole::Leader(tx) => {
                let result = self.resolve_and_cache(op_entity_id).await;
                // Order matters: the verdict is already cached, so the key
                // can leave the pending table before followers are woken.
                self.pending.lock().await.remove(op_entity_id);
                let _ = tx.send(Some(result.clone()));
                result
            }
            FlightRole::Follower(mut rx) => {
                debug!(op_entity_id, "awaiting in-flight validation");
                if rx.changed().await.is_ok() {
                    if let Some(result) = rx.borrow().clone() {
                        return result;
                    }
                }
                // The leading call was cancelled before completing; clean
                // up its pending slot and resolve ourselves.
                self.pending.lock().await.remove(op_entity_id);
                self.resolve_and_cache(op_entity_id).await
            }
        }
    }

    /// Whether an unexpired cached verdict says `op_entity_id` is valid.
    ///
    /// Cache-only: never triggers resolution. Its only side effect is lazy
    /// eviction of an expired entry.
    pub async fn is_validated(&self, op_entity_id: &str) -> bool {
        self.cache
            .get(op_entity_id)
            .await
            .is_some_and(|result| result.is_valid)
    }

    /// Drop every cached verdict immediately.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        info!("validation cache cleared");
    }

    /// Occupancy of the verdict cache, for diagnostics.
    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Stop the background sweeper. Also happens when the last clone of
    /// this validator is dropped.
    pub fn stop(&self) {
        self.sweeper.stop();
    }

    async fn resolve_and_cache(&self, op_entity_id: &str) -> ValidationResult {
        let result = self.run_resolution(op_entity_id).await;
        self.cache.insert(op_entity_id, result.clone()).await;
        if result.is_valid {
            info!(op_entity_id, trust_anchor = %self.trust_anchor, "OP validated");
        } else {
            let codes: Vec<&str> = result.errors.iter().map(|e| e.code.as_str()).collect();
            warn!(op_entity_id, errors = ?codes, "OP validation failed");
        }
        result
    }

    async fn run_resolution(&self, op_entity_id: &str) -> ValidationResult {
        if !is_secure_url(op_entity_id) {
            return self.failure(
                op_entity_id,
                ValidationErrorCode::ValidationError,
                format!(
                    "OP identifier must be an absolute https URL (or http://localhost), got: {op_entity_id}"
                ),
            );
        }

        // Racing the resolver against the deadline stops the *wait*, not
        // the call; a late result is discarded, which is safe because the
        // resolver is side-effect-free for the RP.
        let raced = tokio::time::timeout(
            VALIDATION_TIMEOUT,
            self.resolver.resolve(op_entity_id, &self.trust_anchor),
        )
        .await;

        match raced {
            Err(_elapsed) => self.failure(
                op_entity_id,
                ValidationErrorCode::Timeout,
                format!(
                    "trust chain resolution did not complete within {}s",
                    VALIDATION_TIMEOUT.as_secs()
                ),
            ),
            Ok(Ok(chain)) => {
                if chain.terminus == self.trust_anchor {
                    ValidationResult {
                        op_entity_id: op_entity_id.to_string(),
                        is_valid: true,
                        trust_anchor: Some(self.trust_anchor.clone()),
                        errors: Vec::new(),
                        cached: false,
                        timestamp: Utc::now(),
                    }
                } else {
                    self.failure(
                        op_entity_id,
                        ValidationErrorCode::TrustChainInvalid,
                        format!(
                            "trust chain terminates at {} instead of the configured anchor",
                            chain.terminus
                        ),
                    )
                }
            }
            Ok(Err(err)) => {
                let code = match &err {
                    ResolveError::Unreachable(_) => ValidationErrorCode::OpUnreachable,
                    ResolveError::InvalidSignature(_) => ValidationErrorCode::InvalidSignature,
                    ResolveError::MissingAuthorityHints(_) => {
                        ValidationErrorCode::MissingAuthorityHints
                    }
                    ResolveError::IncompleteChain(_) => ValidationErrorCode::TrustChainInvalid,
                    ResolveError::Network(_) => ValidationErrorCode::NetworkError,
                    ResolveError::Other(text) => classify_error_text(text),
                };
                self.failure(op_entity_id, code, err.to_string())
            }
        }
    }

    fn failure(
        &self,
        op_entity_id: &str,
        code: ValidationErrorCode,
        message: String,
    ) -> ValidationResult {
        ValidationResult {
            op_entity_id: op_entity_id.to_string(),
            is_valid: false,
            trust_anchor: None,
            errors: vec![ValidationError::new(code, message, op_entity_id)],
            cached: false,
            timestamp: Utc::now(),
        }
    }
}

impl std::fmt::Debug for TrustValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustValidator")
            .field("trust_anchor", &self.trust_anchor)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ResolvedChain;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const ANCHOR: &str = "https://ta.example.com";
    const OP: &str = "https://op.example.com";

    /// Resolver with a programmable outcome, optional delay, and a call
    /// counter.
    struct MockResolver {
        outcome: Result<ResolvedChain, ResolveError>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl MockResolver {
        fn terminating_at(terminus: &str) -> Self {
            Self {
                outcome: Ok(ResolvedChain {
                    terminus: terminus.to_string(),
                    chain: vec![OP.to_string(), terminus.to_string()],
                }),
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing_with(err: ResolveError) -> Self {
            Self {
                outcome: Err(err),
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TrustChainResolver for MockResolver {
        async fn resolve(
            &self,
            _op_entity_id: &str,
            _trust_anchor: &str,
        ) -> Result<ResolvedChain, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.outcome.clone()
        }
    }

    fn config() -> FederationConfig {
        FederationConfig::new(ANCHOR, "/tmp/creds.json")
    }

    fn validator(resolver: Arc<MockResolver>) -> TrustValidator {
        TrustValidator::new(&config(), resolver).expect("valid config")
    }

    #[tokio::test]
    async fn test_chain_terminating_at_anchor_is_valid() {
        let v = validator(Arc::new(MockResolver::terminating_at(ANCHOR)));
        let result = v.validate(OP).await;

        assert!(result.is_valid);
        assert_eq!(result.trust_anchor.as_deref(), Some(ANCHOR));
        assert!(result.errors.is_empty());
        assert!(!result.cached);
        assert_eq!(result.op_entity_id, OP);
    }

    #[tokio::test]
    async fn test_chain_terminating_elsewhere_is_invalid() {
        let v = validator(Arc::new(MockResolver::terminating_at(
            "https://other.example.com",
        )));
        let first = v.validate(OP).await;

        assert!(!first.is_valid);
        assert!(first.trust_anchor.is_none());
        assert_eq!(first.errors.len(), 1);
        assert_eq!(
            first.errors[0].code,
            ValidationErrorCode::TrustChainInvalid
        );

        // Negative verdicts are cached too: identical error list, original
        // timestamp.
        let second = v.validate(OP).await;
        assert!(second.cached);
        assert_eq!(second.errors, first.errors);
        assert_eq!(second.timestamp, first.timestamp);
    }

    #[tokio::test]
    async fn test_cache_idempotence_within_ttl() {
        let resolver = Arc::new(MockResolver::terminating_at(ANCHOR));
        let v = validator(Arc::clone(&resolver));

        let first = v.validate(OP).await;
        let second = v.validate(OP).await;

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(second.is_valid, first.is_valid);
        assert_eq!(second.errors, first.errors);
        assert_eq!(second.timestamp, first.timestamp);
        assert_eq!(resolver.call_count(), 1);
    }

    #[tokio::test]
    async fn test_expired_verdict_revalidated() {
        let resolver = Arc::new(MockResolver::terminating_at(ANCHOR));
        let mut cfg = config();
        cfg.validation_cache_ttl = Duration::from_millis(30);
        let v = TrustValidator::new(&cfg, resolver.clone()).unwrap();

        let first = v.validate(OP).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = v.validate(OP).await;

        assert!(!second.cached);
        assert!(second.timestamp > first.timestamp);
        assert_eq!(resolver.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_resolver_yields_timeout_not_network_error() {
        let resolver = Arc::new(
            MockResolver::terminating_at(ANCHOR).with_delay(Duration::from_secs(60)),
        );
        let v = validator(Arc::clone(&resolver));

        let result = v.validate(OP).await;

        assert!(!result.is_valid);
        assert_eq!(result.errors[0].code, ValidationErrorCode::Timeout);

        // The timeout verdict is cached like any other.
        let repeat = v.validate(OP).await;
        assert!(repeat.cached);
        assert_eq!(resolver.call_count(), 1);
    }

    #[tokio::test]
    async fn test_typed_resolver_errors_map_to_codes() {
        let cases = [
            (
                ResolveError::Unreachable("no entity configuration".into()),
                ValidationErrorCode::OpUnreachable,
            ),
            (
                ResolveError::InvalidSignature("bad RS256 signature".into()),
                ValidationErrorCode::InvalidSignature,
            ),
            (
                ResolveError::MissingAuthorityHints("leaf names no superior".into()),
                ValidationErrorCode::MissingAuthorityHints,
            ),
            (
                ResolveError::IncompleteChain("stopped below the anchor".into()),
                ValidationErrorCode::TrustChainInvalid,
            ),
            (
                ResolveError::Network("tls handshake failed".into()),
                ValidationErrorCode::NetworkError,
            ),
            (
                ResolveError::Other("connection refused".into()),
                ValidationErrorCode::NetworkError,
            ),
            (
                ResolveError::Other("something exploded".into()),
                ValidationErrorCode::ValidationError,
            ),
        ];

        for (err, expected) in cases {
            let v = validator(Arc::new(MockResolver::failing_with(err)));
            let result = v.validate(OP).await;
            assert!(!result.is_valid);
            assert_eq!(result.errors[0].code, expected);
            assert_eq!(result.errors[0].details.op_entity_id, OP);
        }
    }

    #[tokio::test]
    async fn test_malformed_op_id_never_reaches_resolver() {
        let resolver = Arc::new(MockResolver::terminating_at(ANCHOR));
        let v = validator(Arc::clone(&resolver));

        let result = v.validate("http://op.example.com").await;

        assert!(!result.is_valid);
        assert_eq!(result.errors[0].code, ValidationErrorCode::ValidationError);
        assert_eq!(resolver.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_share_one_resolution() {
        let resolver = Arc::new(
            MockResolver::terminating_at(ANCHOR).with_delay(Duration::from_millis(100)),
        );
        let v = validator(Arc::clone(&resolver));

        let (a, b) = tokio::join!(v.validate(OP), v.validate(OP));

        assert_eq!(resolver.call_count(), 1);
        assert!(a.is_valid && b.is_valid);
        assert_eq!(a.timestamp, b.timestamp);
    }

    #[tokio::test]
    async fn test_is_validated_is_cache_only() {
        let resolver = Arc::new(MockResolver::terminating_at(ANCHOR));
        let v = validator(Arc::clone(&resolver));

        assert!(!v.is_validated(OP).await);
        assert_eq!(resolver.call_count(), 0);

        v.validate(OP).await;
        assert!(v.is_validated(OP).await);

        let invalid = validator(Arc::new(MockResolver::terminating_at(
            "https://other.example.com",
        )));
        invalid.validate(OP).await;
        // A cached negative verdict is not "validated".
        assert!(!invalid.is_validated(OP).await);
    }

    #[tokio::test]
    async fn test_clear_cache_forces_revalidation() {
        let resolver = Arc::new(MockResolver::terminating_at(ANCHOR));
        let v = validator(Arc::clone(&resolver));

        v.validate(OP).await;
        v.clear_cache().await;
        let result = v.validate(OP).await;

        assert!(!result.cached);
        assert_eq!(resolver.call_count(), 2);
    }

    #[tokio::test]
    async fn test_insecure_anchor_fails_construction() {
        let cfg = FederationConfig::new("http://ta.example.com", "/tmp/creds.json");
        let err = TrustValidator::new(&cfg, Arc::new(MockResolver::terminating_at(ANCHOR)));
        assert!(err.is_err());

        let dev = FederationConfig::new("http://localhost:8080", "/tmp/creds.json");
        assert!(TrustValidator::new(&dev, Arc::new(MockResolver::terminating_at(ANCHOR))).is_ok());
    }
}
