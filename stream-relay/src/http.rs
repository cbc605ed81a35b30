//! Upstream HTTP client construction.

use std::sync::OnceLock;

use tracing::debug;

use crate::config::RelayConfig;
use crate::error::Result;

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build the client used for upstream streams.
///
/// Redirects are never followed: a redirect from the content service is
/// surfaced to the caller as an upstream error.
pub fn build_upstream_client(config: &RelayConfig) -> Result<reqwest::Client> {
    install_rustls_provider();

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(config.connect_timeout)
        .timeout(config.upstream_timeout)
        .pool_idle_timeout(std::time::Duration::from_secs(30))
        .build()?;
    Ok(client)
}
