use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Externally visible origin (scheme://host) used when rewriting
    /// Location and WWW-Authenticate headers. When unset, the inbound
    /// Host header decides.
    #[serde(default)]
    pub public_url: Option<String>,
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.host.is_empty() {
            return Err("Server host cannot be empty".to_string());
        }
        if self.port == 0 {
            return Err("Server port must be greater than 0".to_string());
        }
        if let Some(url) = &self.public_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!(
                    "public_url must include a scheme (http:// or https://): {}",
                    url
                ));
            }
            if url.ends_with('/') {
                return Err(format!("public_url must not end with '/': {}", url));
            }
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            public_url: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log file path; console-only logging when unset.
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl LogConfig {
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log level '{}'. Must be one of: {:?}",
                self.level, valid_levels
            ));
        }
        Ok(())
    }

    pub fn normalized_level(&self) -> String {
        self.level.to_lowercase()
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: None,
            level: default_log_level(),
        }
    }
}

/// Default-registry (Docker Hub) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultRegistryConfig {
    pub upstream: String,
    pub host: String,
}

impl Default for DefaultRegistryConfig {
    fn default() -> Self {
        Self {
            upstream: "https://registry-1.docker.io".to_string(),
            host: "registry-1.docker.io".to_string(),
        }
    }
}

/// One routable upstream registry, keyed by the first path segment
/// a client uses under /v2/ (e.g. "gcr.io").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub prefix: String,
    pub upstream: String,
    /// Literal upstream hostname; derived from `upstream` when unset.
    #[serde(default)]
    pub host: Option<String>,
}

impl RegistryEntry {
    pub fn validate(&self) -> Result<(), String> {
        if self.prefix.is_empty() || self.prefix.contains('/') {
            return Err(format!("Invalid registry prefix: '{}'", self.prefix));
        }
        if !self.upstream.starts_with("http://") && !self.upstream.starts_with("https://") {
            return Err(format!(
                "Registry upstream must include a scheme: {}",
                self.upstream
            ));
        }
        Ok(())
    }
}

/// Token-issuer mapping for the auth relay, keyed by the `service`
/// value a registry challenge advertises.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealmEntry {
    pub service: String,
    pub issuer: String,
}

impl RealmEntry {
    pub fn validate(&self) -> Result<(), String> {
        if self.service.is_empty() {
            return Err("Realm service name cannot be empty".to_string());
        }
        if !self.issuer.starts_with("http://") && !self.issuer.starts_with("https://") {
            return Err(format!("Realm issuer must include a scheme: {}", self.issuer));
        }
        Ok(())
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub default_registry: DefaultRegistryConfig,
    #[serde(default = "default_registries")]
    pub registries: Vec<RegistryEntry>,
    #[serde(default = "default_realms")]
    pub realms: Vec<RealmEntry>,
}

fn default_registries() -> Vec<RegistryEntry> {
    let table = [
        ("docker.io", "https://registry-1.docker.io", "registry-1.docker.io"),
        ("gcr.io", "https://gcr.io", "gcr.io"),
        ("k8s.gcr.io", "https://k8s.gcr.io", "k8s.gcr.io"),
        ("registry.k8s.io", "https://registry.k8s.io", "registry.k8s.io"),
        ("quay.io", "https://quay.io", "quay.io"),
        ("ghcr.io", "https://ghcr.io", "ghcr.io"),
    ];
    table
        .iter()
        .map(|(prefix, upstream, host)| RegistryEntry {
            prefix: prefix.to_string(),
            upstream: upstream.to_string(),
            host: Some(host.to_string()),
        })
        .collect()
}

fn default_realms() -> Vec<RealmEntry> {
    let table = [
        ("registry.docker.io", "https://auth.docker.io/token"),
        ("ghcr.io", "https://ghcr.io/token"),
        ("quay.io", "https://quay.io/v2/auth"),
        ("gcr.io", "https://gcr.io/v2/token"),
        ("k8s.gcr.io", "https://k8s.gcr.io/v2/token"),
        ("registry.k8s.io", "https://registry.k8s.io/v2/token"),
    ];
    table
        .iter()
        .map(|(service, issuer)| RealmEntry {
            service: service.to_string(),
            issuer: issuer.to_string(),
        })
        .collect()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(format!("Configuration file not found: {:?}", path).into());
        }
        let content = fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a string
    pub fn from_str(content: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Built-in defaults: Docker Hub as the default registry plus the
    /// well-known public registries. Used when no config file exists.
    pub fn builtin() -> Self {
        Self {
            registries: default_registries(),
            realms: default_realms(),
            ..Self::default()
        }
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.server.validate()?;
        self.log.validate()?;
        for entry in &self.registries {
            entry.validate()?;
        }
        for realm in &self.realms {
            realm.validate()?;
        }
        let mut prefixes: Vec<&str> = self.registries.iter().map(|r| r.prefix.as_str()).collect();
        prefixes.sort_unstable();
        prefixes.dedup();
        if prefixes.len() != self.registries.len() {
            return Err("Duplicate registry prefix in configuration".into());
        }
        Ok(())
    }

    pub fn server_addr(&self) -> String {
        self.server.socket_addr()
    }

    pub fn log_level_normalized(&self) -> String {
        self.log.normalized_level()
    }

    pub fn log_file_path(&self) -> Option<&str> {
        self.log.file.as_deref()
    }

    /// Convert to a display string for startup logging
    pub fn to_display_string(&self) -> String {
        format!(
            "Server: {} | Log Level: {} | Default Upstream: {} | Registries: {}",
            self.server_addr(),
            self.log.level,
            self.default_registry.upstream,
            self.registries.len()
        )
    }
}
