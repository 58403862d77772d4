use axum::http::Method;

/// Where an inbound request is dispatched, first match wins.
#[derive(Debug, PartialEq)]
pub enum Route {
    /// OPTIONS anywhere: 204 with CORS headers only
    Preflight,
    /// /v2/auth and below: token relay to the real issuer
    AuthRelay,
    /// /v2/...: proxied to the resolved upstream registry
    Registry,
    /// /v2 without trailing slash: 301 to /v2/
    V2Redirect,
    /// /: landing page
    Landing,
    /// /healthz: liveness + upstream reachability
    Health,
    /// everything else: 404 with CORS headers
    NotFound,
}

/// Classify method + path into a route. Pure dispatch, no side effects;
/// downstream failures are handled by the handlers themselves.
pub fn classify(method: &Method, path: &str) -> Route {
    if method == Method::OPTIONS {
        return Route::Preflight;
    }
    if path == "/v2/auth" || path.starts_with("/v2/auth/") {
        return Route::AuthRelay;
    }
    if path.starts_with("/v2/") {
        return Route::Registry;
    }
    if path == "/v2" {
        return Route::V2Redirect;
    }
    if path == "/" {
        return Route::Landing;
    }
    if path == "/healthz" {
        return Route::Health;
    }
    Route::NotFound
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_always_preflight() {
        assert_eq!(classify(&Method::OPTIONS, "/"), Route::Preflight);
        assert_eq!(classify(&Method::OPTIONS, "/v2/auth"), Route::Preflight);
        assert_eq!(
            classify(&Method::OPTIONS, "/v2/ubuntu/manifests/latest"),
            Route::Preflight
        );
        assert_eq!(classify(&Method::OPTIONS, "/favicon.ico"), Route::Preflight);
    }

    #[test]
    fn test_auth_relay_before_registry() {
        assert_eq!(classify(&Method::GET, "/v2/auth"), Route::AuthRelay);
        assert_eq!(classify(&Method::GET, "/v2/auth/"), Route::AuthRelay);
        // /v2/author/image is a repository path, not the relay
        assert_eq!(
            classify(&Method::GET, "/v2/author/manifests/latest"),
            Route::Registry
        );
    }

    #[test]
    fn test_registry_paths() {
        assert_eq!(classify(&Method::GET, "/v2/"), Route::Registry);
        assert_eq!(
            classify(&Method::HEAD, "/v2/library/ubuntu/manifests/latest"),
            Route::Registry
        );
        assert_eq!(
            classify(&Method::PUT, "/v2/foo/blobs/uploads/123"),
            Route::Registry
        );
    }

    #[test]
    fn test_v2_redirect_and_landing() {
        assert_eq!(classify(&Method::GET, "/v2"), Route::V2Redirect);
        assert_eq!(classify(&Method::GET, "/"), Route::Landing);
        assert_eq!(classify(&Method::GET, "/healthz"), Route::Health);
    }

    #[test]
    fn test_unmatched_is_not_found() {
        assert_eq!(classify(&Method::GET, "/favicon.ico"), Route::NotFound);
        assert_eq!(classify(&Method::GET, "/v1/anything"), Route::NotFound);
        assert_eq!(classify(&Method::POST, "/admin"), Route::NotFound);
    }
}
