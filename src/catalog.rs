use std::collections::HashMap;

use crate::config::Config;

/// A single upstream registry: where requests go and which hostname
/// the upstream expects (and emits in redirects).
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryDescriptor {
    /// Path-prefix token clients use under /v2/ (empty for the default).
    pub prefix: String,
    /// Upstream base URL without a trailing slash, e.g. "https://gcr.io".
    pub upstream: String,
    /// Literal upstream hostname. Kept separate from `upstream` so the
    /// rewriter never has to re-derive it from a URL string.
    pub host: String,
}

/// Immutable routing tables, built once at startup from configuration
/// and shared read-only across requests.
#[derive(Debug, Clone)]
pub struct RegistryCatalog {
    default: RegistryDescriptor,
    by_prefix: HashMap<String, RegistryDescriptor>,
    realms: HashMap<String, String>,
}

impl RegistryCatalog {
    pub fn from_config(config: &Config) -> Self {
        let default = RegistryDescriptor {
            prefix: String::new(),
            upstream: config.default_registry.upstream.trim_end_matches('/').to_string(),
            host: config.default_registry.host.clone(),
        };

        let mut by_prefix = HashMap::new();
        for entry in &config.registries {
            let upstream = entry.upstream.trim_end_matches('/').to_string();
            let host = entry
                .host
                .clone()
                .unwrap_or_else(|| host_of(&upstream).to_string());
            by_prefix.insert(
                entry.prefix.clone(),
                RegistryDescriptor {
                    prefix: entry.prefix.clone(),
                    upstream,
                    host,
                },
            );
        }

        let realms = config
            .realms
            .iter()
            .map(|r| (r.service.clone(), r.issuer.clone()))
            .collect();

        Self {
            default,
            by_prefix,
            realms,
        }
    }

    /// The implicit registry (Docker Hub) used when no prefix matches.
    pub fn default_registry(&self) -> &RegistryDescriptor {
        &self.default
    }

    /// Look up a registry by its path-prefix token.
    pub fn by_prefix(&self, token: &str) -> Option<&RegistryDescriptor> {
        self.by_prefix.get(token)
    }

    /// Token-issuer URL for a challenge `service` name.
    pub fn issuer_for(&self, service: &str) -> Option<&str> {
        self.realms.get(service).map(String::as_str)
    }
}

// "https://gcr.io/prefix" -> "gcr.io"; a port stays part of the host.
fn host_of(url: &str) -> &str {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    rest.split('/').next().unwrap_or(rest)
}
