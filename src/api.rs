use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, Request, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::headers;
use crate::proxy::RegistryProxy;
use crate::router::{self, Route};

const LANDING_HTML: &str = include_str!("landing.html");

/// Single entry point: classify and dispatch. Handler failures become
/// structured error responses here, nothing propagates further up.
pub async fn dispatch(State(proxy): State<Arc<RegistryProxy>>, req: Request) -> Response {
    match router::classify(req.method(), req.uri().path()) {
        Route::Preflight => preflight(),
        Route::AuthRelay => auth_relay(proxy, req).await,
        Route::Registry => registry(proxy, req).await,
        Route::V2Redirect => v2_redirect(),
        Route::Landing => landing(),
        Route::Health => healthz(proxy).await,
        Route::NotFound => not_found(),
    }
}

// CORS preflight: 204, no body, CORS headers only
fn preflight() -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    headers::apply_cors(response.headers_mut());
    response
}

// Proxy a /v2/ request to its resolved upstream
async fn registry(proxy: Arc<RegistryProxy>, req: Request) -> Response {
    match proxy.proxy_registry(req).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("Registry proxy error: {}", e);
            e.into_response()
        }
    }
}

// Relay /v2/auth to the real token issuer
async fn auth_relay(proxy: Arc<RegistryProxy>, req: Request) -> Response {
    let params: HashMap<String, String> = match Query::try_from_uri(req.uri()) {
        Ok(Query(params)) => params,
        Err(e) => {
            tracing::warn!("Unparsable auth relay query: {}", e);
            HashMap::new()
        }
    };
    let service = params.get("service").map(String::as_str);
    let scope = params.get("scope").map(String::as_str);

    match proxy.relay_auth(req, service, scope).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("Auth relay error: {}", e);
            e.into_response()
        }
    }
}

// /v2 without trailing slash: clients expect the canonical /v2/
fn v2_redirect() -> Response {
    let mut response = StatusCode::MOVED_PERMANENTLY.into_response();
    response
        .headers_mut()
        .insert(header::LOCATION, header::HeaderValue::from_static("/v2/"));
    headers::apply_cors(response.headers_mut());
    response
}

fn landing() -> Response {
    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        LANDING_HTML,
    )
        .into_response();
    headers::apply_cors(response.headers_mut());
    response
}

fn not_found() -> Response {
    let mut response = (StatusCode::NOT_FOUND, "Not Found").into_response();
    headers::apply_cors(response.headers_mut());
    response
}

// Health: service status, version, and default upstream reachability
async fn healthz(proxy: Arc<RegistryProxy>) -> Response {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let upstream_healthy = proxy.check_upstream_health().await;
    let upstream_url = &proxy.catalog().default_registry().upstream;

    let status = if upstream_healthy { "healthy" } else { "degraded" };
    let http_status = if upstream_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let body = serde_json::json!({
        "status": status,
        "version": VERSION,
        "registry": {
            "url": upstream_url,
            "healthy": upstream_healthy
        },
        "timestamp": timestamp
    });

    let mut response = (
        http_status,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response();
    headers::apply_cors(response.headers_mut());
    response
}
