//! End-to-end flow over the trust layer: validate an OP, discover its
//! endpoints, and hold its registration secret across restarts. An OP
//! that fails validation never proceeds to discovery or credentials.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use fedrp_trust::{
    CredentialStore, DiscoveryService, FederationConfig, ResolveError, ResolvedChain,
    TrustChainResolver, TrustValidator, ValidationErrorCode,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TRUST_ANCHOR: &str = "https://ta.example.com";
const RP_ENTITY_ID: &str = "https://rp.example.com";

/// Resolver that trusts exactly one OP under the anchor.
struct SingleOpResolver {
    trusted_op: String,
    calls: AtomicUsize,
}

#[async_trait]
impl TrustChainResolver for SingleOpResolver {
    async fn resolve(
        &self,
        op_entity_id: &str,
        trust_anchor: &str,
    ) -> Result<ResolvedChain, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if op_entity_id == self.trusted_op {
            Ok(ResolvedChain {
                terminus: trust_anchor.to_string(),
                chain: vec![op_entity_id.to_string(), trust_anchor.to_string()],
            })
        } else {
            Err(ResolveError::MissingAuthorityHints(format!(
                "{op_entity_id} names no superior authority"
            )))
        }
    }
}

fn metadata_body(op: &str) -> serde_json::Value {
    serde_json::json!({
        "issuer": op,
        "authorization_endpoint": format!("{op}/authorize"),
        "token_endpoint": format!("{op}/token"),
        "jwks_uri": format!("{op}/jwks"),
        "registration_endpoint": format!("{op}/register"),
    })
}

#[tokio::test]
async fn trusted_op_flows_through_discovery_and_credentials() {
    let op_server = MockServer::start().await;
    let op = op_server.uri();
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(metadata_body(&op)))
        .expect(1)
        .mount(&op_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = FederationConfig::new(TRUST_ANCHOR, dir.path().join("credentials.json"));
    let resolver = Arc::new(SingleOpResolver {
        trusted_op: "https://op.example.com".to_string(),
        calls: AtomicUsize::new(0),
    });

    let shared_resolver: Arc<dyn TrustChainResolver> = resolver.clone();
    let validator = TrustValidator::new(&config, shared_resolver).unwrap();
    let discovery = DiscoveryService::new(&config).unwrap();
    let credentials = CredentialStore::new(RP_ENTITY_ID, &config.credentials_path).unwrap();

    let verdict = validator.validate("https://op.example.com").await;
    assert!(verdict.is_valid);
    assert_eq!(verdict.trust_anchor.as_deref(), Some(TRUST_ANCHOR));
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);

    // On pass, discovery supplies the endpoints for token exchange (the
    // metadata document is served by the wiremock OP).
    let metadata = discovery.discover(&op).await.unwrap();
    assert_eq!(metadata.token_endpoint, format!("{op}/token"));
    assert_eq!(
        metadata.extra.get("registration_endpoint").and_then(|v| v.as_str()),
        Some(format!("{op}/register").as_str())
    );

    // The registration secret survives a store restart.
    credentials.store("https://op.example.com", "reg-secret").unwrap();
    drop(credentials);
    let reloaded = CredentialStore::new(RP_ENTITY_ID, &config.credentials_path).unwrap();
    let record = reloaded.get("https://op.example.com").unwrap();
    assert_eq!(record.client_secret, "reg-secret");

    validator.stop();
    discovery.stop();
}

#[tokio::test]
async fn untrusted_op_is_blocked_with_full_error_detail() {
    let dir = tempfile::tempdir().unwrap();
    let config = FederationConfig::new(TRUST_ANCHOR, dir.path().join("credentials.json"));
    let resolver = Arc::new(SingleOpResolver {
        trusted_op: "https://op.example.com".to_string(),
        calls: AtomicUsize::new(0),
    });
    let validator = TrustValidator::new(&config, resolver).unwrap();

    let verdict = validator.validate("https://rogue.example.com").await;

    // The caller gets the OP identifier and the full error list to
    // display, and must not continue the flow.
    assert!(!verdict.is_valid);
    assert_eq!(verdict.op_entity_id, "https://rogue.example.com");
    assert_eq!(verdict.errors.len(), 1);
    assert_eq!(
        verdict.errors[0].code,
        ValidationErrorCode::MissingAuthorityHints
    );
    assert_eq!(
        verdict.errors[0].details.op_entity_id,
        "https://rogue.example.com"
    );

    // The negative verdict is remembered.
    let repeat = validator.validate("https://rogue.example.com").await;
    assert!(repeat.cached);
    assert_eq!(repeat.errors, verdict.errors);
}
