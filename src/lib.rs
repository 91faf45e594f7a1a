//! Trust validation and caching for an OpenID Federation relying party.
//!
//! Before an RP starts an authentication flow against a remote OP, it must
//! decide whether that OP's trust chain terminates at the RP's configured
//! trust anchor, and it should not re-pay that cost on every request. This
//! crate is that layer:
//!
//! - [`TrustValidator`] wraps an external chain-resolution capability
//!   (behind [`TrustChainResolver`]) with caching, a hard timeout, and
//!   error classification. It never fails: every outcome is a
//!   [`ValidationResult`], and negative verdicts are cached exactly like
//!   positive ones.
//! - [`DiscoveryService`] fetches and caches an OP's protocol-metadata
//!   document from its well-known location.
//! - [`CredentialStore`] durably persists per-OP registration secrets for
//!   one RP identity, with migration from the legacy single-OP layout.
//!
//! The caller-facing contract: an OP whose validation result is not
//! `is_valid` must be blocked from every subsequent authentication step —
//! no redirect, no token acceptance — and the result carries the OP
//! identifier plus the full error list for display.
//!
//! Chain resolution and signature verification themselves are out of
//! scope; implement [`TrustChainResolver`] over whatever performs them.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fedrp_trust::{FederationConfig, TrustValidator, DiscoveryService, CredentialStore};
//!
//! let config = FederationConfig::new("https://ta.example.com", "/var/lib/rp/credentials.json");
//! let validator = TrustValidator::new(&config, Arc::new(my_resolver))?;
//! let discovery = DiscoveryService::new(&config)?;
//! let credentials = CredentialStore::new("https://rp.example.com", &config.credentials_path)?;
//!
//! let verdict = validator.validate("https://op.example.com").await;
//! if verdict.is_valid {
//!     let metadata = discovery.discover("https://op.example.com").await?;
//!     // register if needed, then exchange tokens via metadata.token_endpoint
//! }
//! ```

pub mod cache;
pub mod config;
pub mod credentials;
pub mod discovery;
pub mod error;
pub mod models;
pub mod resolver;
pub mod validator;

pub use cache::{CacheStats, CacheSweeper, ExpiringCache};
pub use config::{
    FederationConfig, DEFAULT_DISCOVERY_CACHE_TTL, DEFAULT_DISCOVERY_TIMEOUT,
    DEFAULT_SWEEP_INTERVAL, DEFAULT_VALIDATION_CACHE_TTL, VALIDATION_TIMEOUT,
};
pub use credentials::CredentialStore;
pub use discovery::DiscoveryService;
pub use error::{FedResult, FederationError};
pub use models::{
    CredentialRecord, DiscoveredMetadata, ValidationError, ValidationErrorCode,
    ValidationErrorDetails, ValidationResult,
};
pub use resolver::{classify_error_text, ResolveError, ResolvedChain, TrustChainResolver};
pub use validator::TrustValidator;
