use std::sync::OnceLock;

use tracing::debug;

use crate::config::GatewayConfig;
use crate::error::GatewayError;

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Safe to ignore: can happen if another crate installed it first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build the transport used for every backend call.
///
/// The cookie jar carries the access credential: the backend sets it, and it
/// travels with every later call without the gateway ever reading it.
pub fn build_client(config: &GatewayConfig) -> Result<reqwest::Client, GatewayError> {
    install_rustls_provider();

    let mut builder = reqwest::Client::builder()
        .cookie_store(true)
        .user_agent(config.user_agent.as_str());

    if let Some(timeout) = config.request_timeout {
        builder = builder.timeout(timeout);
    }

    builder
        .build()
        .map_err(|e| GatewayError::transport(format!("Failed to create HTTP client: {e}")))
}
