//! Client IP extraction utilities.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderName,
};

/// Extract the client IP address.
///
/// With `ip_header` set (running behind a trusted proxy) the first address in
/// that header is used and the socket address is ignored. Otherwise the
/// address comes from `ConnectInfo`.
pub fn extract_client_ip(request: &Request, ip_header: Option<&HeaderName>) -> Option<String> {
    match ip_header {
        Some(name) => request
            .headers()
            .get(name)?
            .to_str()
            .ok()?
            .split(',')
            .next()
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_string),
        None => request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string()),
    }
}
