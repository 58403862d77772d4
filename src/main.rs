use axum::{
    Router,
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::any,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

mod api;
mod catalog;
mod config;
mod error;
mod headers;
mod log;
mod proxy;
mod resolve;
mod router;

use config::Config;
use proxy::RegistryProxy;

#[tokio::main]
async fn main() {
    // Load configuration, falling back to the built-in catalog so the
    // binary is useful without any config file.
    let config = Config::from_file("/config/config.toml")
        .or_else(|_| Config::from_file("./config/config.toml"))
        .unwrap_or_else(|_| Config::builtin());

    let _guard = log::init(config.log_file_path(), &config.log_level_normalized())
        .expect("Failed to initialize logger");

    info!("Registry gateway starting");
    info!("Configuration: {}", config.to_display_string());

    let proxy = Arc::new(RegistryProxy::new(&config));

    // Every path funnels through one dispatcher so the route priority
    // (preflight, auth relay, registry, redirect, landing) lives in a
    // single testable table.
    let app = Router::new()
        .route("/", any(api::dispatch))
        .route("/{*path}", any(api::dispatch))
        .layer(middleware::from_fn(log_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(proxy);

    let listener = tokio::net::TcpListener::bind(config.server_addr())
        .await
        .expect("Failed to bind to address");

    info!(
        "Registry gateway listening on http://{}",
        config.server_addr()
    );

    axum::serve(listener, app).await.expect("Server error");
}

// Request log middleware: request id, status and latency as structured
// fields, level chosen by status class.
async fn log_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = uuid::Uuid::new_v4();
    let start = std::time::Instant::now();

    let client_ip = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let response = next.run(request).await;

    let status = response.status();
    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

    if status.is_server_error() {
        tracing::error!(
            request_id = %request_id,
            method = %method,
            uri = %uri,
            status = status.as_u16(),
            duration_ms = format!("{:.2}", duration_ms),
            client_ip = %client_ip,
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            request_id = %request_id,
            method = %method,
            uri = %uri,
            status = status.as_u16(),
            duration_ms = format!("{:.2}", duration_ms),
            client_ip = %client_ip,
            "Request completed with client error"
        );
    } else {
        tracing::info!(
            request_id = %request_id,
            method = %method,
            uri = %uri,
            status = status.as_u16(),
            duration_ms = format!("{:.2}", duration_ms),
            client_ip = %client_ip,
            "Request completed successfully"
        );
    }

    response
}
