//! Client address resolution.
//!
//! `X-Real-IP`, then the first hop of `X-Forwarded-For` (both only when
//! `server.trust_proxy_headers` is on), then the socket peer.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::context::AppContext;

/// The caller's IP address, if one could be determined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub Option<String>);

impl FromRequestParts<AppContext> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, ctx: &AppContext) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        Ok(ClientIp(resolve(
            &parts.headers,
            peer,
            ctx.config.server.trust_proxy_headers,
        )))
    }
}

fn resolve(headers: &HeaderMap, peer: Option<String>, trust_proxy: bool) -> Option<String> {
    if trust_proxy {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
        };
        if let Some(ip) = header("x-real-ip").or_else(|| header("x-forwarded-for")) {
            return Some(ip);
        }
    }
    peer
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn real_ip_wins() {
        let h = headers(&[("x-real-ip", "203.0.113.7"), ("x-forwarded-for", "198.51.100.1")]);
        assert_eq!(resolve(&h, Some("10.0.0.1".into()), true).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn forwarded_for_first_hop() {
        let h = headers(&[("x-forwarded-for", "198.51.100.1, 10.0.0.2")]);
        assert_eq!(resolve(&h, None, true).as_deref(), Some("198.51.100.1"));
    }

    #[test]
    fn untrusted_headers_are_ignored() {
        let h = headers(&[("x-real-ip", "203.0.113.7")]);
        assert_eq!(resolve(&h, Some("10.0.0.1".into()), false).as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn nothing_available() {
        assert_eq!(resolve(&HeaderMap::new(), None, true), None);
        let h = headers(&[("x-real-ip", "")]);
        assert_eq!(resolve(&h, None, true), None);
    }
}
