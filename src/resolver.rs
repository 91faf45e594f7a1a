//! Seam to the external trust-chain resolution capability.
//!
//! Resolving and cryptographically verifying a federation trust chain is
//! not this crate's job: the validator consumes it as an opaque async
//! capability behind [`TrustChainResolver`]. Implementations typically
//! wrap a hosted federation API or a full entity-statement resolver.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::ValidationErrorCode;

/// A successfully resolved trust chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChain {
    /// Entity identifier of the authority the chain terminates at. The
    /// validator compares this against its configured trust anchor.
    pub terminus: String,
    /// Entity identifiers along the chain, OP first.
    pub chain: Vec<String>,
}

/// Typed failures a resolver can report.
///
/// `Other` exists for implementations that can only surface opaque error
/// text; it is classified by [`classify_error_text`] and nowhere else.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// The OP's entity configuration could not be fetched.
    #[error("OP entity configuration unreachable: {0}")]
    Unreachable(String),

    /// A statement signature in the chain failed verification.
    #[error("invalid statement signature: {0}")]
    InvalidSignature(String),

    /// An entity named no superior authority to continue through.
    #[error("missing authority hints: {0}")]
    MissingAuthorityHints(String),

    /// The chain could not be completed up to any anchor.
    #[error("incomplete trust chain: {0}")]
    IncompleteChain(String),

    /// A network-level failure below the federation protocol.
    #[error("network failure: {0}")]
    Network(String),

    /// Untyped failure text from the underlying implementation.
    #[error("{0}")]
    Other(String),
}

/// Resolves an OP's trust chain toward a trust anchor.
#[async_trait]
pub trait TrustChainResolver: Send + Sync {
    /// Resolve the chain for `op_entity_id`, aiming at `trust_anchor`.
    ///
    /// The call must be side-effect-free for the RP: the validator
    /// abandons it on timeout and discards any late result.
    async fn resolve(
        &self,
        op_entity_id: &str,
        trust_anchor: &str,
    ) -> Result<ResolvedChain, ResolveError>;
}

/// Classify opaque resolver error text as network-ish or generic.
///
/// This is the only place error text is sniffed; every other failure path
/// uses the typed [`ResolveError`] variants.
#[must_use]
pub fn classify_error_text(text: &str) -> ValidationErrorCode {
    const NETWORK_MARKERS: [&str; 9] = [
        "network",
        "connection",
        "connect",
        "dns",
        "socket",
        "refused",
        "reset",
        "unreachable",
        "fetch failed",
    ];
    let lower = text.to_lowercase();
    if NETWORK_MARKERS.iter().any(|marker| lower.contains(marker)) {
        ValidationErrorCode::NetworkError
    } else {
        ValidationErrorCode::ValidationError
    }
}
