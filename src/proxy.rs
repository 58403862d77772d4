use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, Method, StatusCode, header},
    response::Response,
};

use crate::catalog::RegistryCatalog;
use crate::config::Config;
use crate::error::{GatewayError, GatewayResult};
use crate::headers;
use crate::resolve::{self, UpstreamTarget};

/// Stateless proxy core: one reqwest client plus the immutable routing
/// tables. Shared via Arc, never mutated after startup.
pub struct RegistryProxy {
    client: reqwest::Client,
    catalog: RegistryCatalog,
    public_url: Option<String>,
}

impl RegistryProxy {
    pub fn new(config: &Config) -> Self {
        Self {
            // Redirects are relayed to the client (rewritten), never
            // followed here, so the Location rewrite stays observable.
            client: reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            catalog: RegistryCatalog::from_config(config),
            public_url: config.server.public_url.clone(),
        }
    }

    pub fn catalog(&self) -> &RegistryCatalog {
        &self.catalog
    }

    /// Origin used when rewriting Location and realm values: the
    /// configured public_url, or the inbound Host over https.
    pub fn proxy_origin(&self, inbound: &HeaderMap) -> String {
        if let Some(url) = &self.public_url {
            return url.clone();
        }
        let host = inbound
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("localhost");
        format!("https://{}", host)
    }

    /// Forward a /v2/ request to its resolved upstream and relay the
    /// response with rewritten headers. Bodies stream through in both
    /// directions.
    pub async fn proxy_registry(&self, req: Request) -> GatewayResult<Response> {
        let path = req.uri().path();
        let rest = path.strip_prefix("/v2/").unwrap_or("");
        let target = resolve::resolve(&self.catalog, rest);

        let mut url = target.url.clone();
        if let Some(query) = req.uri().query() {
            url.push('?');
            url.push_str(query);
        }

        let proxy_origin = self.proxy_origin(req.headers());
        let method = req.method().clone();
        let outbound = headers::outbound_headers(req.headers(), &target.host);

        tracing::info!(
            method = %method,
            upstream = %url,
            upstream_host = %target.host,
            "Proxying registry request"
        );

        let mut upstream_req = self.client.request(method.clone(), &url).headers(outbound);

        // GET/HEAD never carry a body upstream, even if the client
        // erroneously sent one.
        if method != Method::GET && method != Method::HEAD {
            let stream = req.into_body().into_data_stream();
            upstream_req = upstream_req.body(reqwest::Body::wrap_stream(stream));
        }

        let upstream_resp = upstream_req.send().await?;
        Ok(self.relay_response(upstream_resp, Some(&target), &proxy_origin))
    }

    /// Serve /v2/auth: forward the token request to the issuer the
    /// `service` parameter names and relay the answer untouched. Pure
    /// relay, no token caching or inspection.
    pub async fn relay_auth(
        &self,
        req: Request,
        service: Option<&str>,
        scope: Option<&str>,
    ) -> GatewayResult<Response> {
        let service = service.ok_or(GatewayError::MissingService)?;
        let issuer = self
            .catalog
            .issuer_for(service)
            .ok_or_else(|| GatewayError::UnsupportedService(service.to_string()))?;

        let mut url = reqwest::Url::parse(issuer)
            .map_err(|e| GatewayError::InvalidUpstreamUrl(format!("{}: {}", issuer, e)))?;
        url.query_pairs_mut().append_pair("service", service);
        if let Some(scope) = scope {
            url.query_pairs_mut().append_pair("scope", scope);
        }

        let issuer_host = url.host_str().unwrap_or_default().to_string();
        let outbound = headers::outbound_headers(req.headers(), &issuer_host);

        tracing::info!(service = %service, issuer = %url, "Relaying token request");

        let upstream_resp = self.client.get(url).headers(outbound).send().await?;

        let proxy_origin = self.proxy_origin(req.headers());
        Ok(self.relay_response(upstream_resp, None, &proxy_origin))
    }

    /// Probe the default registry. 2xx and 401 both mean reachable; a
    /// bare /v2/ commonly answers 401 before auth.
    pub async fn check_upstream_health(&self) -> bool {
        let url = format!("{}/v2/", self.catalog.default_registry().upstream);
        match self
            .client
            .get(&url)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => {
                let status = resp.status();
                status.is_success() || status == reqwest::StatusCode::UNAUTHORIZED
            }
            Err(e) => {
                tracing::warn!("Upstream health check failed: {}", e);
                false
            }
        }
    }

    // Relay an upstream response: copy headers minus hop-by-hop,
    // rewrite Location and WWW-Authenticate, overlay CORS, stream the
    // body through with status preserved.
    fn relay_response(
        &self,
        upstream: reqwest::Response,
        target: Option<&UpstreamTarget>,
        proxy_origin: &str,
    ) -> Response {
        let status =
            StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let mut response_headers = headers::relayed_response_headers(upstream.headers());

        if let Some(target) = target {
            rewrite_relayed_headers(&mut response_headers, status, target, proxy_origin);
        }
        headers::apply_cors(&mut response_headers);

        let mut builder = Response::builder().status(status);
        if let Some(h) = builder.headers_mut() {
            *h = response_headers;
        }
        builder
            .body(Body::from_stream(upstream.bytes_stream()))
            .unwrap_or_else(|e| {
                tracing::error!("Failed to assemble relayed response: {}", e);
                let mut response = Response::new(Body::empty());
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                response
            })
    }
}

/// Apply the Location and WWW-Authenticate rewrites in place.
fn rewrite_relayed_headers(
    response_headers: &mut HeaderMap,
    status: StatusCode,
    target: &UpstreamTarget,
    proxy_origin: &str,
) {
    if status.is_redirection()
        && let Some(location) = response_headers.get(header::LOCATION).cloned()
        && let Ok(location) = location.to_str()
        && let Some(rewritten) = headers::rewrite_location(location, &target.host, proxy_origin)
        && let Ok(value) = rewritten.parse()
    {
        tracing::debug!(from = %location, to = %rewritten, "Rewrote Location");
        response_headers.insert(header::LOCATION, value);
    }

    if let Some(challenge) = response_headers.get(header::WWW_AUTHENTICATE).cloned()
        && let Ok(challenge) = challenge.to_str()
        && let Some(rewritten) = headers::rewrite_challenge(challenge, proxy_origin)
        && let Ok(value) = rewritten.parse()
    {
        tracing::debug!(to = %rewritten, "Rewrote WWW-Authenticate realm");
        response_headers.insert(header::WWW_AUTHENTICATE, value);
    }
}
