use axum::http::{HeaderMap, HeaderName, HeaderValue, header};

/// Default User-Agent for upstream requests when the client sends none.
/// Registries gate manifest negotiation on recognizing a Docker engine.
pub const DEFAULT_USER_AGENT: &str = "docker/25.0.3 go/go1.21.6 os/linux arch/amd64";

/// Fixed CORS set attached to every response the gateway emits, so
/// browser-based registry clients get parseable responses on every
/// status class.
const CORS_HEADERS: [(&str, &str); 5] = [
    ("access-control-allow-origin", "*"),
    (
        "access-control-allow-methods",
        "GET, HEAD, POST, PUT, DELETE, OPTIONS",
    ),
    (
        "access-control-allow-headers",
        "Authorization, Content-Type, Docker-Content-Digest, Docker-Distribution-Api-Version, Accept, Accept-Encoding",
    ),
    (
        "access-control-expose-headers",
        "Docker-Content-Digest, Docker-Distribution-Api-Version, Www-Authenticate, Location, Content-Length, Content-Type",
    ),
    ("access-control-max-age", "86400"),
];

/// Headers that identify this proxy hop or the edge platform in front
/// of it. They must not leak upstream.
const STRIP_HEADERS: [&str; 18] = [
    "host",
    "origin",
    "referer",
    "content-length",
    "connection",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
    "te",
    "trailer",
    "proxy-connection",
    "forwarded",
    "via",
    "x-forwarded-for",
    "x-forwarded-proto",
    "x-forwarded-host",
    "x-real-ip",
    "true-client-ip",
];

/// Hop-by-hop headers dropped from upstream responses before relaying.
const HOP_BY_HOP: [&str; 4] = ["connection", "keep-alive", "transfer-encoding", "upgrade"];

/// Overlay the fixed CORS set onto a header map.
pub fn apply_cors(headers: &mut HeaderMap) {
    for (name, value) in CORS_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
}

/// Build the outbound header set for an upstream fetch: copy inbound
/// headers minus the strip list, pin Host to the resolved upstream
/// hostname, default the User-Agent. Authorization passes through
/// untouched.
pub fn outbound_headers(inbound: &HeaderMap, upstream_host: &str) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in inbound.iter() {
        if STRIP_HEADERS.contains(&name.as_str()) || name.as_str().starts_with("cf-") {
            continue;
        }
        out.append(name.clone(), value.clone());
    }

    if let Ok(host) = HeaderValue::from_str(upstream_host) {
        out.insert(header::HOST, host);
    }

    if !out.contains_key(header::USER_AGENT) {
        out.insert(
            header::USER_AGENT,
            HeaderValue::from_static(DEFAULT_USER_AGENT),
        );
    }

    out
}

/// Copy upstream response headers minus hop-by-hop ones.
pub fn relayed_response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in upstream.iter() {
        if HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Rewrite an upstream redirect Location so the client follows it back
/// through the gateway instead of hairpinning to the upstream.
///
/// Absolute URLs pointing at the upstream host get their scheme+host
/// replaced by the gateway origin; root-relative paths get the origin
/// prefixed. Anything else (absolute URL to a third host, e.g. a CDN
/// blob store) is left alone. Returns None when no rewrite applies.
pub fn rewrite_location(location: &str, upstream_host: &str, proxy_origin: &str) -> Option<String> {
    if location.starts_with('/') {
        return Some(format!("{}{}", proxy_origin, location));
    }
    for scheme in ["https://", "http://"] {
        if let Some(rest) = location.strip_prefix(scheme) {
            let host_end = rest.find('/').unwrap_or(rest.len());
            if &rest[..host_end] == upstream_host {
                return Some(format!("{}{}", proxy_origin, &rest[host_end..]));
            }
            return None;
        }
    }
    None
}

/// Rewrite the realm of a WWW-Authenticate challenge to the gateway's
/// own /v2/auth endpoint, leaving the scheme token, parameter order and
/// every other parameter (service, scope, ...) untouched.
///
/// A challenge without a recognizable realm parameter is returned as
/// None and the original header relays unmodified; a fabricated realm
/// would break clients harder than a passthrough.
pub fn rewrite_challenge(challenge: &str, proxy_origin: &str) -> Option<String> {
    let (scheme, params_part) = challenge.split_once(' ')?;
    let params = parse_challenge_params(params_part);
    if !params.iter().any(|(k, _)| k == "realm") {
        return None;
    }

    let rewritten: Vec<String> = params
        .iter()
        .map(|(key, value)| {
            if key == "realm" {
                format!("realm=\"{}/v2/auth\"", proxy_origin)
            } else {
                format!("{}=\"{}\"", key, value)
            }
        })
        .collect();

    Some(format!("{} {}", scheme, rewritten.join(",")))
}

/// Parse `k="v",k2="v2",...` preserving parameter order. Tolerates
/// unquoted values and unknown parameter names; malformed pairs are
/// skipped.
fn parse_challenge_params(s: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for pair in split_challenge_pairs(s) {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let key = key.trim().to_string();
        let mut value = value.trim();
        if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
            value = &value[1..value.len() - 1];
        }
        out.push((key, value.to_string()));
    }
    out
}

// Comma-split that respects quoting: scope values can carry commas
// (e.g. scope="repository:a:pull,push").
fn split_challenge_pairs(s: &str) -> Vec<&str> {
    let mut pairs = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (i, c) in s.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                if !s[start..i].trim().is_empty() {
                    pairs.push(s[start..i].trim());
                }
                start = i + 1;
            }
            _ => {}
        }
    }
    if !s[start..].trim().is_empty() {
        pairs.push(s[start..].trim());
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_set_complete() {
        let mut headers = HeaderMap::new();
        apply_cors(&mut headers);
        assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
        assert_eq!(headers.get("access-control-max-age").unwrap(), "86400");
        assert!(
            headers
                .get("access-control-expose-headers")
                .unwrap()
                .to_str()
                .unwrap()
                .contains("Docker-Content-Digest")
        );
        assert_eq!(headers.len(), 5);
    }

    #[test]
    fn test_outbound_strips_proxy_headers() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::HOST, "proxy.example.com".parse().unwrap());
        inbound.insert(header::ORIGIN, "https://web.example.com".parse().unwrap());
        inbound.insert(header::REFERER, "https://web.example.com/x".parse().unwrap());
        inbound.insert("x-forwarded-for", "10.0.0.1".parse().unwrap());
        inbound.insert("cf-ray", "8a1b2c3d4e5f".parse().unwrap());
        inbound.insert("cf-ipcountry", "DE".parse().unwrap());
        inbound.insert(header::AUTHORIZATION, "Bearer abc123".parse().unwrap());
        inbound.insert(header::ACCEPT, "application/vnd.oci.image.manifest.v1+json".parse().unwrap());

        let out = outbound_headers(&inbound, "registry-1.docker.io");

        assert_eq!(out.get(header::HOST).unwrap(), "registry-1.docker.io");
        assert_eq!(out.get(header::AUTHORIZATION).unwrap(), "Bearer abc123");
        assert_eq!(
            out.get(header::ACCEPT).unwrap(),
            "application/vnd.oci.image.manifest.v1+json"
        );
        assert!(out.get(header::ORIGIN).is_none());
        assert!(out.get(header::REFERER).is_none());
        assert!(out.get("x-forwarded-for").is_none());
        assert!(out.get("cf-ray").is_none());
        assert!(out.get("cf-ipcountry").is_none());
    }

    #[test]
    fn test_outbound_defaults_user_agent() {
        let out = outbound_headers(&HeaderMap::new(), "quay.io");
        assert_eq!(out.get(header::USER_AGENT).unwrap(), DEFAULT_USER_AGENT);

        let mut inbound = HeaderMap::new();
        inbound.insert(header::USER_AGENT, "docker/24.0.0".parse().unwrap());
        let out = outbound_headers(&inbound, "quay.io");
        assert_eq!(out.get(header::USER_AGENT).unwrap(), "docker/24.0.0");
    }

    #[test]
    fn test_location_rewrite_absolute() {
        let rewritten = rewrite_location(
            "https://registry-1.docker.io/v2/blobs/sha256/abc",
            "registry-1.docker.io",
            "https://proxy.example.com",
        );
        assert_eq!(
            rewritten.as_deref(),
            Some("https://proxy.example.com/v2/blobs/sha256/abc")
        );
    }

    #[test]
    fn test_location_rewrite_relative() {
        let rewritten = rewrite_location(
            "/v2/blobs/sha256/abc",
            "registry-1.docker.io",
            "https://proxy.example.com",
        );
        assert_eq!(
            rewritten.as_deref(),
            Some("https://proxy.example.com/v2/blobs/sha256/abc")
        );
    }

    #[test]
    fn test_location_third_host_untouched() {
        // CDN offload redirects must keep pointing at the CDN.
        let rewritten = rewrite_location(
            "https://cdn.example.net/layer.tar.gz?sig=xyz",
            "registry-1.docker.io",
            "https://proxy.example.com",
        );
        assert_eq!(rewritten, None);
    }

    #[test]
    fn test_location_preserves_query() {
        let rewritten = rewrite_location(
            "https://quay.io/v2/coreos/etcd/blobs/uploads/?digest=sha256%3Aabc",
            "quay.io",
            "https://proxy.example.com",
        );
        assert_eq!(
            rewritten.as_deref(),
            Some("https://proxy.example.com/v2/coreos/etcd/blobs/uploads/?digest=sha256%3Aabc")
        );
    }

    #[test]
    fn test_challenge_realm_rewritten_others_kept() {
        let challenge = r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:library/ubuntu:pull""#;
        let rewritten = rewrite_challenge(challenge, "https://proxy.example.com").unwrap();
        assert_eq!(
            rewritten,
            r#"Bearer realm="https://proxy.example.com/v2/auth",service="registry.docker.io",scope="repository:library/ubuntu:pull""#
        );
    }

    #[test]
    fn test_challenge_parameter_order_preserved() {
        let challenge = r#"Bearer service="ghcr.io",realm="https://ghcr.io/token""#;
        let rewritten = rewrite_challenge(challenge, "https://proxy.example.com").unwrap();
        assert_eq!(
            rewritten,
            r#"Bearer service="ghcr.io",realm="https://proxy.example.com/v2/auth""#
        );
    }

    #[test]
    fn test_challenge_comma_in_scope() {
        let challenge =
            r#"Bearer realm="https://auth.docker.io/token",scope="repository:a/b:pull,push""#;
        let rewritten = rewrite_challenge(challenge, "https://p.example").unwrap();
        assert_eq!(
            rewritten,
            r#"Bearer realm="https://p.example/v2/auth",scope="repository:a/b:pull,push""#
        );
    }

    #[test]
    fn test_challenge_without_realm_untouched() {
        assert_eq!(
            rewrite_challenge(r#"Bearer service="ghcr.io""#, "https://p.example"),
            None
        );
        assert_eq!(rewrite_challenge("Basic", "https://p.example"), None);
    }

    #[test]
    fn test_challenge_scheme_preserved() {
        let rewritten =
            rewrite_challenge(r#"Basic realm="registry""#, "https://p.example").unwrap();
        assert!(rewritten.starts_with("Basic "));
        assert_eq!(rewritten, r#"Basic realm="https://p.example/v2/auth""#);
    }

    #[test]
    fn test_relayed_headers_drop_hop_by_hop() {
        let mut upstream = HeaderMap::new();
        upstream.insert("docker-content-digest", "sha256:abc".parse().unwrap());
        upstream.insert("transfer-encoding", "chunked".parse().unwrap());
        upstream.insert("connection", "keep-alive".parse().unwrap());

        let out = relayed_response_headers(&upstream);
        assert_eq!(out.get("docker-content-digest").unwrap(), "sha256:abc");
        assert!(out.get("transfer-encoding").is_none());
        assert!(out.get("connection").is_none());
    }
}
