//! Centralized configuration for Ferry.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::time::Duration;

/// Default relay chunk size (512 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 512 * 1024;

/// Central configuration for all Ferry components.
///
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct FerryConfig {
    pub server: ServerConfig,
    pub relay: RelayConfig,
    pub backend: BackendConfig,
}

/// HTTP server binding and public addressing.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Public base URL used when generating stream links
    pub base_url: String,
    /// Deployment label reported by the status endpoint
    pub environment: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            base_url: "http://localhost:8000".to_string(),
            environment: "local".to_string(),
        }
    }
}

/// Relay streaming parameters.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Buffer granularity requested from the backend
    pub chunk_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Media backend connection settings.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL of the HTTP origin backend, if one is used
    pub origin_url: Option<String>,
    /// Connect timeout for backend HTTP requests
    pub connect_timeout: Duration,
    /// User agent for backend HTTP requests
    pub user_agent: &'static str,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            origin_url: None,
            connect_timeout: Duration::from_secs(10),
            user_agent: "ferry/0.1.0",
        }
    }
}

impl FerryConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(host) = lookup("HOST").filter(|h| !h.is_empty()) {
            config.server.host = host;
        }

        if let Some(port) = lookup("PORT").and_then(|p| p.parse::<u16>().ok()) {
            config.server.port = port;
        }

        config.server.base_url = public_base_url(&lookup, config.server.port);

        if let Some(environment) = lookup("FERRY_ENVIRONMENT").or_else(|| lookup("KOYEB_DEPLOYMENT_ID"))
        {
            config.server.environment = environment;
        }

        if let Some(chunk_size) = lookup("FERRY_CHUNK_SIZE")
            .and_then(|c| c.parse::<usize>().ok())
            .filter(|c| *c > 0)
        {
            config.relay.chunk_size = chunk_size;
        }

        if let Some(origin) = lookup("FERRY_ORIGIN_URL").filter(|o| !o.is_empty()) {
            config.backend.origin_url = Some(origin);
        }

        if let Some(seconds) = lookup("FERRY_CONNECT_TIMEOUT").and_then(|t| t.parse::<u64>().ok()) {
            config.backend.connect_timeout = Duration::from_secs(seconds);
        }

        config
    }

    /// Creates a configuration optimized for testing.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                base_url: "http://127.0.0.1".to_string(),
                environment: "test".to_string(),
            },
            relay: RelayConfig { chunk_size: 64 },
            ..Default::default()
        }
    }
}

/// Resolves the public base URL.
///
/// An explicit `BASE_URL` wins, then the Koyeb public domain, then the Koyeb
/// app and organisation names, and finally the local listener.
fn public_base_url(lookup: &impl Fn(&str) -> Option<String>, port: u16) -> String {
    if let Some(base_url) = lookup("BASE_URL").filter(|b| !b.is_empty()) {
        return base_url.trim_end_matches('/').to_string();
    }

    if let Some(domain) = lookup("KOYEB_PUBLIC_DOMAIN").filter(|d| !d.is_empty()) {
        return format!("https://{domain}");
    }

    if let (Some(app), Some(org)) = (lookup("KOYEB_APP_NAME"), lookup("KOYEB_ORG_NAME")) {
        return format!("https://{app}-{org}.koyeb.app");
    }

    format!("http://localhost:{port}")
}
