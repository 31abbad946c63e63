#![no_main]

//! Fuzz target for the headers the gate reads from untrusted clients.
//!
//! `Authorization` and `X-Forwarded-For` arrive verbatim from the network;
//! extraction must never panic and must never return blank values. A
//! rejected token must still carry the bearer scheme.

use axum::http::{Extensions, HeaderMap, HeaderValue};
use libfuzzer_sys::fuzz_target;
use tollgate_api::middleware::{auth::extract_bearer_token, client_ip::client_ip};

fuzz_target!(|data: &[u8]| {
    let Ok(value) = HeaderValue::from_bytes(data) else {
        return;
    };

    let mut headers = HeaderMap::new();
    headers.insert("authorization", value.clone());
    headers.insert("x-forwarded-for", value);

    match extract_bearer_token(&headers) {
        Ok(Some(token)) => {
            assert!(!token.is_empty());
            assert_eq!(token, token.trim());
        },
        Ok(None) => {},
        Err(_) => assert!(data.starts_with(b"Bearer ")),
    }

    if let Some(ip) = client_ip(&headers, &Extensions::new()) {
        assert!(!ip.is_empty());
        assert!(!ip.contains(','));
    }
});
