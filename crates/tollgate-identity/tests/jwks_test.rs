//! JWKS verifier against a mock identity provider.

use std::{sync::Arc, time::Duration};

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::json;
use tollgate_identity::{IdentityError, IdentityVerifier, JwksConfig, JwksVerifier};
use tollgate_testing::{JwksServer, TestClock, TestKeys, TEST_AUDIENCE, TEST_ISSUER};

fn config(server: &JwksServer) -> JwksConfig {
    JwksConfig::new(server.url()).with_issuer(TEST_ISSUER).with_audience(TEST_AUDIENCE)
}

fn verifier(config: JwksConfig, clock: &TestClock) -> JwksVerifier {
    JwksVerifier::new(config, Arc::new(clock.clone())).unwrap()
}

fn assert_invalid(result: tollgate_identity::Result<tollgate_core::Principal>) {
    match result {
        Err(IdentityError::InvalidToken { .. }) => {},
        other => panic!("expected InvalidToken, got {other:?}"),
    }
}

fn assert_unavailable(result: tollgate_identity::Result<tollgate_core::Principal>) {
    match result {
        Err(IdentityError::ProviderUnavailable { .. }) => {},
        other => panic!("expected ProviderUnavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn valid_token_yields_principal() {
    let keys = TestKeys::new();
    let server = JwksServer::publishing(&[&keys]).await;
    let clock = TestClock::new();
    let verifier = verifier(config(&server), &clock);

    let token = keys.token().subject("uid-42").email("ada@example.com", true).role("ADMIN").sign();
    let principal = verifier.verify(&token).await.unwrap();

    assert_eq!(principal.subject, "uid-42");
    assert_eq!(principal.email.as_deref(), Some("ada@example.com"));
    assert!(principal.email_verified);
    assert_eq!(principal.claims.get("role"), Some(&json!("ADMIN")));
    assert_eq!(verifier.cached_key_count().await, 1);
}

#[tokio::test]
async fn expired_token_is_invalid() {
    let keys = TestKeys::new();
    let server = JwksServer::publishing(&[&keys]).await;
    let verifier = verifier(config(&server), &TestClock::new());

    let token = keys.token().expires_in(-3600).sign();

    assert_invalid(verifier.verify(&token).await);
}

#[tokio::test]
async fn wrong_issuer_or_audience_is_invalid() {
    let keys = TestKeys::new();
    let server = JwksServer::publishing(&[&keys]).await;
    let verifier = verifier(config(&server), &TestClock::new());

    let wrong_issuer = keys.token().issuer("https://evil.example").sign();
    let wrong_audience = keys.token().audience("someone-else").sign();

    assert_invalid(verifier.verify(&wrong_issuer).await);
    assert_invalid(verifier.verify(&wrong_audience).await);
}

#[tokio::test]
async fn issuer_and_audience_are_optional() {
    let keys = TestKeys::new();
    let server = JwksServer::publishing(&[&keys]).await;
    let verifier = verifier(JwksConfig::new(server.url()), &TestClock::new());

    let token = keys.token().issuer("anyone").audience("anything").sign();

    assert!(verifier.verify(&token).await.is_ok());
}

#[tokio::test]
async fn tampered_signature_is_invalid() {
    let keys = TestKeys::new();
    let server = JwksServer::publishing(&[&keys]).await;
    let verifier = verifier(config(&server), &TestClock::new());

    let genuine = keys.token().subject("uid-1").sign();
    let other = keys.token().subject("uid-2").sign();
    let (signed_part, _) = genuine.rsplit_once('.').unwrap();
    let (_, foreign_signature) = other.rsplit_once('.').unwrap();
    let forged = format!("{signed_part}.{foreign_signature}");

    assert_invalid(verifier.verify(&forged).await);
}

#[tokio::test]
async fn token_without_subject_is_invalid() {
    let keys = TestKeys::new();
    let server = JwksServer::publishing(&[&keys]).await;
    let verifier = verifier(config(&server), &TestClock::new());

    let token = keys.token().without_claim("sub").sign();

    assert_invalid(verifier.verify(&token).await);
}

#[tokio::test]
async fn symmetric_algorithms_are_refused_without_fetching_keys() {
    let server = JwksServer::publishing(&[&TestKeys::new()]).await;
    let verifier = verifier(config(&server), &TestClock::new());

    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some("test-key-1".into());
    let claims = json!({ "sub": "uid-1", "exp": 4_102_444_800_u64 });
    let token = encode(&header, &claims, &EncodingKey::from_secret(b"shared")).unwrap();

    assert_invalid(verifier.verify(&token).await);
    assert_eq!(server.fetch_count().await, 0);
}

#[tokio::test]
async fn keys_are_cached_until_ttl_expires() {
    let keys = TestKeys::new();
    let server = JwksServer::publishing(&[&keys]).await;
    let clock = TestClock::new();
    let mut config = config(&server);
    config.cache_ttl = Duration::from_secs(600);
    let verifier = verifier(config, &clock);

    let token = keys.token().sign();
    verifier.verify(&token).await.unwrap();
    verifier.verify(&token).await.unwrap();
    assert_eq!(server.fetch_count().await, 1);

    clock.advance(Duration::from_secs(601));
    verifier.verify(&token).await.unwrap();
    assert_eq!(server.fetch_count().await, 2);
}

#[tokio::test]
async fn unknown_kid_triggers_refetch_after_cooldown() {
    let old = TestKeys::with_kid("old");
    let rotated = TestKeys::with_kid("rotated");
    let server = JwksServer::start().await;
    server.serve_once(TestKeys::jwks(&[&old])).await;
    server.serve(TestKeys::jwks(&[&rotated])).await;

    let clock = TestClock::new();
    let verifier = verifier(config(&server), &clock);

    verifier.verify(&old.token().sign()).await.unwrap();
    assert_eq!(server.fetch_count().await, 1);

    // Within the cooldown an unknown kid is rejected from cache.
    assert_invalid(verifier.verify(&rotated.token().sign()).await);
    assert_eq!(server.fetch_count().await, 1);

    clock.advance(Duration::from_secs(31));
    let principal = verifier.verify(&rotated.token().sign()).await.unwrap();
    assert_eq!(principal.subject, "user-123");
    assert_eq!(server.fetch_count().await, 2);
}

async fn verify_concurrently(verifier: &Arc<JwksVerifier>, token: &str, count: usize) -> usize {
    let handles: Vec<_> = (0..count)
        .map(|_| {
            let verifier = Arc::clone(verifier);
            let token = token.to_string();
            tokio::spawn(async move { verifier.verify(&token).await })
        })
        .collect();

    let mut verified = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            verified += 1;
        }
    }
    verified
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_cold_verifies_share_one_fetch() {
    let keys = TestKeys::new();
    let server = JwksServer::publishing(&[&keys]).await;
    let verifier = Arc::new(verifier(config(&server), &TestClock::new()));

    let verified = verify_concurrently(&verifier, &keys.token().sign(), 32).await;

    assert_eq!(verified, 32);
    assert_eq!(server.fetch_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_unknown_kid_refresh_is_single_flight() {
    let old = TestKeys::with_kid("old");
    let rotated = TestKeys::with_kid("rotated");
    let server = JwksServer::start().await;
    server.serve_once(TestKeys::jwks(&[&old])).await;
    server.serve(TestKeys::jwks(&[&rotated])).await;

    let clock = TestClock::new();
    let verifier = Arc::new(verifier(config(&server), &clock));
    verifier.verify(&old.token().sign()).await.unwrap();

    clock.advance(Duration::from_secs(31));
    let verified = verify_concurrently(&verifier, &rotated.token().sign(), 16).await;

    assert_eq!(verified, 16);
    assert_eq!(server.fetch_count().await, 2);
}

#[tokio::test]
async fn provider_errors_are_unavailable_not_invalid() {
    let keys = TestKeys::new();
    let token = keys.token().sign();

    let failing = JwksServer::start().await;
    failing.fail_with(500).await;
    let verifier_500 = verifier(config(&failing), &TestClock::new());
    assert_unavailable(verifier_500.verify(&token).await);

    let garbled = JwksServer::start().await;
    garbled.serve_raw("{ not json").await;
    let verifier_garbled = verifier(config(&garbled), &TestClock::new());
    assert_unavailable(verifier_garbled.verify(&token).await);

    let empty = JwksServer::start().await;
    empty.serve(json!({ "keys": [] })).await;
    let verifier_empty = verifier(config(&empty), &TestClock::new());
    assert_unavailable(verifier_empty.verify(&token).await);
}

#[tokio::test]
async fn unreachable_provider_is_unavailable() {
    let mut config = JwksConfig::new("http://127.0.0.1:1/.well-known/jwks.json");
    config.timeout = Duration::from_secs(2);
    let verifier = verifier(config, &TestClock::new());

    let token = TestKeys::new().token().sign();

    assert_unavailable(verifier.verify(&token).await);
}

#[tokio::test]
async fn provider_recovers_after_outage() {
    let keys = TestKeys::new();
    let server = JwksServer::start().await;
    server.fail_with(503).await;
    let verifier = verifier(config(&server), &TestClock::new());
    let token = keys.token().sign();

    assert_unavailable(verifier.verify(&token).await);

    server.reset().await;
    server.serve(TestKeys::jwks(&[&keys])).await;

    assert!(verifier.verify(&token).await.is_ok());
}
