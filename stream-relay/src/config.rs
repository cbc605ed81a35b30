//! Relay configuration.

use std::time::Duration;

use crate::error::{Error, Result};

/// Stream relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// Upstream streaming endpoint (absolute URL, no query)
    pub upstream_url: String,
    /// Name of the cookie that carries the access credential
    pub auth_cookie: String,
    /// Time allowed to establish the upstream connection
    pub connect_timeout: Duration,
    /// Total time allowed for one upstream stream, generation included.
    ///
    /// When it elapses mid-stream the relay appends a `relay-error` frame with
    /// code `UPSTREAM_TIMEOUT` and closes the response.
    pub upstream_timeout: Duration,
    /// Origins allowed to call the relay with credentials. Empty disables CORS.
    pub cors_origins: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8787,
            upstream_url: "http://localhost:8000/ai/stream".to_string(),
            auth_cookie: "access_token".to_string(),
            connect_timeout: Duration::from_secs(10),
            upstream_timeout: Duration::from_secs(300),
            cors_origins: Vec::new(),
        }
    }
}

impl RelayConfig {
    /// Load relay config from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `RELAY_BIND_ADDRESS` (e.g. "0.0.0.0")
    /// - `RELAY_PORT` (e.g. "8787")
    /// - `RELAY_UPSTREAM_URL` (e.g. "http://backend:8000/ai/stream")
    /// - `RELAY_AUTH_COOKIE` (e.g. "access_token")
    /// - `RELAY_CONNECT_TIMEOUT_SECS`
    /// - `RELAY_UPSTREAM_TIMEOUT_SECS`
    /// - `RELAY_CORS_ORIGINS` (comma separated)
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();

        if let Some(bind_address) = non_empty_var("RELAY_BIND_ADDRESS") {
            config.bind_address = bind_address;
        }

        if let Some(port) = non_empty_var("RELAY_PORT")
            && let Ok(parsed) = port.parse::<u16>()
        {
            config.port = parsed;
        }

        if let Some(url) = non_empty_var("RELAY_UPSTREAM_URL") {
            config.upstream_url = url;
        }

        if let Some(cookie) = non_empty_var("RELAY_AUTH_COOKIE") {
            config.auth_cookie = cookie;
        }

        if let Some(secs) = non_empty_var("RELAY_CONNECT_TIMEOUT_SECS")
            && let Ok(parsed) = secs.parse::<u64>()
        {
            config.connect_timeout = Duration::from_secs(parsed);
        }

        if let Some(secs) = non_empty_var("RELAY_UPSTREAM_TIMEOUT_SECS")
            && let Ok(parsed) = secs.parse::<u64>()
        {
            config.upstream_timeout = Duration::from_secs(parsed);
        }

        if let Some(origins) = non_empty_var("RELAY_CORS_ORIGINS") {
            config.cors_origins = parse_origins(&origins);
        }

        config
    }

    /// Reject configurations the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        let upstream = url::Url::parse(&self.upstream_url)
            .map_err(|e| Error::config(format!("Invalid upstream url: {e}")))?;
        if !matches!(upstream.scheme(), "http" | "https") {
            return Err(Error::config("Upstream url must be http or https"));
        }
        if self.auth_cookie.trim().is_empty() {
            return Err(Error::config("Auth cookie name must not be empty"));
        }
        if self.upstream_timeout.is_zero() {
            return Err(Error::config("Upstream timeout must be positive"));
        }
        Ok(())
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(String::from)
        .collect()
}
