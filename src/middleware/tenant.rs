//! Tenant resolution from the Host header and request metadata for audits.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::HOST, request::Parts, HeaderMap},
};
use axum_extra::{headers::UserAgent, TypedHeader};
use std::convert::Infallible;

const RESERVED_LABELS: [&str; 3] = ["www", "api", "admin"];

/// Subdomain of the company addressed by this request, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant(pub Option<String>);

/// `acme.example.com` -> `acme`. Local hosts, hosts with a port, bare
/// hostnames and reserved first labels resolve to no tenant.
pub fn tenant_from_host(host: &str) -> Option<String> {
    let host = host.trim();
    if host.is_empty() || host == "localhost" || host == "127.0.0.1" || host.contains(':') {
        return None;
    }
    if !host.contains('.') {
        return None;
    }
    let label = host.split('.').next()?.to_ascii_lowercase();
    if label.is_empty() || RESERVED_LABELS.contains(&label.as_str()) {
        return None;
    }
    Some(label)
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Tenant {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant = parts
            .headers
            .get(HOST)
            .and_then(|h| h.to_str().ok())
            .or_else(|| parts.uri.host())
            .and_then(tenant_from_host);
        Ok(Tenant(tenant))
    }
}

/// Client details recorded with audit entries.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// First `x-forwarded-for` entry, else `x-real-ip`.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    forwarded.or_else(real_ip).map(|ip| ip.chars().take(45).collect())
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = TypedHeader::<UserAgent>::from_request_parts(parts, state)
            .await
            .ok()
            .map(|TypedHeader(ua)| ua.as_str().chars().take(500).collect());
        Ok(RequestMeta {
            ip_address: client_ip(&parts.headers),
            user_agent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Request};

    #[test]
    fn resolves_first_label() {
        assert_eq!(tenant_from_host("acme.example.com"), Some("acme".to_string()));
        assert_eq!(tenant_from_host("ACME.example.com"), Some("acme".to_string()));
    }

    #[test]
    fn skips_local_and_reserved_hosts() {
        assert_eq!(tenant_from_host("localhost"), None);
        assert_eq!(tenant_from_host("127.0.0.1"), None);
        assert_eq!(tenant_from_host("acme.example.com:8080"), None);
        assert_eq!(tenant_from_host("intranet"), None);
        assert_eq!(tenant_from_host("www.example.com"), None);
        assert_eq!(tenant_from_host("api.example.com"), None);
        assert_eq!(tenant_from_host("admin.example.com"), None);
    }

    #[test]
    fn client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        assert_eq!(client_ip(&headers).as_deref(), Some("10.0.0.9"));
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.7"));
    }

    #[tokio::test]
    async fn extractors_read_headers() {
        let request = Request::builder()
            .uri("/api/v1/auth/login")
            .header("host", "globex.example.com")
            .header("user-agent", "integration-test/1.0")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let Tenant(tenant) = Tenant::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(tenant.as_deref(), Some("globex"));

        let meta = RequestMeta::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(meta.user_agent.as_deref(), Some("integration-test/1.0"));
        assert_eq!(meta.ip_address, None);
    }
}
