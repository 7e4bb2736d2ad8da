//! Who is calling and from where.
//!
//! Staff identity comes from the `X-LeadDesk-Actor` header set by the
//! authenticating proxy in front of the service; public callers are anonymous.

use axum::extract::ConnectInfo;
use axum::http::{header, Extensions, HeaderMap};
use leaddesk_types::AuditContext;
use std::net::{IpAddr, SocketAddr};

/// Header carrying the authenticated staff member
pub const ACTOR_HEADER: &str = "x-leaddesk-actor";

const DEFAULT_ACTOR: &str = "staff";
const MAX_HEADER_VALUE_LEN: usize = 512;

/// Request metadata recorded alongside every change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub actor: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn from_parts(headers: &HeaderMap, extensions: &Extensions) -> Self {
        let actor = header_text(headers, ACTOR_HEADER)
            .unwrap_or_else(|| DEFAULT_ACTOR.to_string());
        Self {
            actor,
            ip: client_ip(headers, extensions),
            user_agent: header_text(headers, header::USER_AGENT.as_str()),
        }
    }

    pub fn audit_context(&self) -> AuditContext {
        AuditContext::new(self.actor.clone())
            .with_ip(self.ip.clone())
            .with_user_agent(self.user_agent.clone())
    }
}

/// Client IP recorded in audit metadata: first `X-Forwarded-For` hop, then
/// `X-Real-IP`, then the socket peer.
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> Option<String> {
    forwarded_ip(headers).or_else(|| peer_ip(extensions).map(|ip| ip.to_string()))
}

/// Address of the connected socket, when the server records it
pub fn peer_ip(extensions: &Extensions) -> Option<IpAddr> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = header_text(headers, "x-forwarded-for") {
        if let Some(first) = forwarded
            .split(',')
            .map(str::trim)
            .find(|hop| !hop.is_empty())
        {
            return Some(first.to_string());
        }
    }
    header_text(headers, "x-real-ip")
}

/// Key for per-client rate limiting.
///
/// Forwarding headers are client-controlled, so they only count when the
/// socket peer is one of `trusted_proxies`.
pub fn rate_limit_key(
    headers: &HeaderMap,
    extensions: &Extensions,
    trusted_proxies: &[IpAddr],
) -> String {
    match peer_ip(extensions) {
        Some(peer) if trusted_proxies.contains(&peer) => {
            forwarded_ip(headers).unwrap_or_else(|| peer.to_string())
        }
        Some(peer) => peer.to_string(),
        None => "unknown".to_string(),
    }
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| value.chars().take(MAX_HEADER_VALUE_LEN).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(*value));
        }
        map
    }

    #[test]
    fn forwarded_for_takes_first_hop() {
        let map = headers(&[
            ("x-forwarded-for", "203.0.113.5, 10.0.0.1"),
            ("x-real-ip", "10.0.0.2"),
        ]);
        assert_eq!(
            client_ip(&map, &Extensions::new()).as_deref(),
            Some("203.0.113.5")
        );
    }

    #[test]
    fn falls_back_to_real_ip_then_peer() {
        let map = headers(&[("x-real-ip", "198.51.100.1")]);
        assert_eq!(
            client_ip(&map, &Extensions::new()).as_deref(),
            Some("198.51.100.1")
        );

        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 7], 5555))));
        assert_eq!(
            client_ip(&HeaderMap::new(), &extensions).as_deref(),
            Some("192.0.2.7")
        );
        assert_eq!(client_ip(&HeaderMap::new(), &Extensions::new()), None);
    }

    #[test]
    fn actor_defaults_to_staff() {
        let context = RequestContext::from_parts(
            &headers(&[("user-agent", "curl/8.4")]),
            &Extensions::new(),
        );
        assert_eq!(context.actor, "staff");
        assert_eq!(context.user_agent.as_deref(), Some("curl/8.4"));
        assert_eq!(context.ip, None);

        let context = RequestContext::from_parts(
            &headers(&[(ACTOR_HEADER, "jo@consultancy.example")]),
            &Extensions::new(),
        );
        assert_eq!(context.audit_context().actor, "jo@consultancy.example");
    }

    fn connected_from(ip: [u8; 4]) -> Extensions {
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from((ip, 40_000))));
        extensions
    }

    #[test]
    fn limiter_key_ignores_forwarding_from_untrusted_peers() {
        let map = headers(&[("x-forwarded-for", "203.0.113.77")]);
        let extensions = connected_from([198, 51, 100, 20]);

        assert_eq!(rate_limit_key(&map, &extensions, &[]), "198.51.100.20");
        assert_eq!(
            rate_limit_key(&map, &Extensions::new(), &[]),
            "unknown"
        );
        // Audit metadata still records the forwarded hop.
        assert_eq!(
            client_ip(&map, &extensions).as_deref(),
            Some("203.0.113.77")
        );
    }

    #[test]
    fn limiter_key_uses_forwarding_behind_trusted_proxy() {
        let proxy = IpAddr::from([10, 0, 0, 1]);
        let extensions = connected_from([10, 0, 0, 1]);

        let map = headers(&[("x-forwarded-for", "203.0.113.77, 10.0.0.1")]);
        assert_eq!(rate_limit_key(&map, &extensions, &[proxy]), "203.0.113.77");
        assert_eq!(
            rate_limit_key(&HeaderMap::new(), &extensions, &[proxy]),
            "10.0.0.1"
        );
    }
}
