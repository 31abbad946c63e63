//! Client address resolution.

use std::net::SocketAddr;

use axum::{
    extract::ConnectInfo,
    http::{Extensions, HeaderMap},
};

/// Header set by proxies listing the originating client first.
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Resolves the client address of a request.
///
/// The first entry of `X-Forwarded-For` wins; otherwise the peer address
/// recorded by the server's connect info is used.
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> Option<String> {
    forwarded_for(headers).or_else(|| {
        extensions.get::<ConnectInfo<SocketAddr>>().map(|ConnectInfo(addr)| addr.ip().to_string())
    })
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(String::from)
}
