//! Gateway client configuration.

use std::time::Duration;

use reqwest::StatusCode;

pub const DEFAULT_USER_AGENT: &str = concat!("gateway-client/", env!("CARGO_PKG_VERSION"));

/// Configuration for the request gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Backend base URL, e.g. `https://api.example.com`.
    pub base_url: String,
    /// Endpoint used to renew the access credential.
    pub refresh_path: String,
    /// Endpoint used to log in. Never subject to renewal handling.
    pub login_path: String,
    /// Endpoint used to log out.
    pub logout_path: String,
    /// Status the backend uses to signal an expired access credential.
    pub expired_status: StatusCode,
    /// Overall request timeout. `None` keeps the transport default.
    pub request_timeout: Option<Duration>,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            refresh_path: "/auth/refresh".to_string(),
            login_path: "/auth/login".to_string(),
            logout_path: "/auth/logout".to_string(),
            expired_status: StatusCode::UNAUTHORIZED,
            request_timeout: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl GatewayConfig {
    /// Create a config pointing at `base_url` with default endpoints.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Load config from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `GATEWAY_BASE_URL` (e.g. "https://api.example.com")
    /// - `GATEWAY_REQUEST_TIMEOUT_SECS` (e.g. "30")
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(base_url) = std::env::var("GATEWAY_BASE_URL")
            && !base_url.trim().is_empty()
        {
            config.base_url = base_url.trim().to_string();
        }

        if let Ok(secs) = std::env::var("GATEWAY_REQUEST_TIMEOUT_SECS")
            && let Ok(parsed) = secs.parse::<u64>()
            && parsed > 0
        {
            config.request_timeout = Some(Duration::from_secs(parsed));
        }

        config
    }

    /// Whether `path` is an authentication endpoint that must never trigger renewal.
    pub fn is_auth_endpoint(&self, path: &str) -> bool {
        let path = normalize_path(path);
        path == normalize_path(&self.refresh_path) || path == normalize_path(&self.login_path)
    }

    /// Absolute URL for an endpoint path.
    pub fn endpoint_url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}

/// Path without query string or surrounding slashes.
fn normalize_path(path: &str) -> &str {
    let path = path.split('?').next().unwrap_or(path);
    path.trim_matches('/')
}
