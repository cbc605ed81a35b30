//! Gateway facade: wires the transport, renewal coordinator and dispatcher
//! together and exposes the session lifecycle (login / logout).

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::credentials::{CredentialStore, MemoryCredentialStore, RenewalCredential};
use crate::descriptor::RequestDescriptor;
use crate::dispatcher::{LocalePreference, LocaleSource, Payload, RequestDispatcher};
use crate::error::Result;
use crate::http::build_client;
use crate::renewal::RenewalCoordinator;

/// Builder for [`Gateway`].
pub struct GatewayBuilder {
    config: GatewayConfig,
    store: Option<Arc<dyn CredentialStore>>,
    locale: Option<Arc<dyn LocaleSource>>,
    client: Option<reqwest::Client>,
}

impl GatewayBuilder {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            store: None,
            locale: None,
            client: None,
        }
    }

    /// Where the renewal credential lives. Defaults to memory.
    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Locale preference reader. Defaults to `"en"`.
    pub fn locale_source(mut self, locale: Arc<dyn LocaleSource>) -> Self {
        self.locale = Some(locale);
        self
    }

    /// Use a preconfigured transport. It should keep a cookie jar.
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> Result<Gateway> {
        let client = match self.client {
            Some(client) => client,
            None => build_client(&self.config)?,
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryCredentialStore::new()));
        let locale = self
            .locale
            .unwrap_or_else(|| Arc::new(LocalePreference::default()));

        let config = Arc::new(self.config);
        let renewal = Arc::new(RenewalCoordinator::new(client.clone(), &config, store));
        let dispatcher =
            RequestDispatcher::new(client, Arc::clone(&config), Arc::clone(&renewal), locale);

        Ok(Gateway {
            config,
            renewal,
            dispatcher,
        })
    }
}

/// Entry point used by application code.
pub struct Gateway {
    config: Arc<GatewayConfig>,
    renewal: Arc<RenewalCoordinator>,
    dispatcher: RequestDispatcher,
}

impl Gateway {
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }

    pub fn renewal(&self) -> &Arc<RenewalCoordinator> {
        &self.renewal
    }

    /// Shorthand for [`RequestDispatcher::dispatch`].
    pub async fn dispatch(&self, descriptor: &RequestDescriptor) -> Result<Payload> {
        self.dispatcher.dispatch(descriptor).await
    }

    /// Log in and keep the renewal credential the backend issues.
    ///
    /// The login endpoint is never subject to renewal handling.
    pub async fn login(&self, credentials: serde_json::Value) -> Result<Payload> {
        let descriptor = RequestDescriptor::post(self.config.login_path.clone(), credentials);
        let payload = self.dispatcher.dispatch_once(&descriptor).await?;

        let issued = payload
            .data
            .get("refresh_token")
            .and_then(|v| v.as_str())
            .and_then(|token| RenewalCredential::new(token));

        match issued {
            Some(credential) => {
                if let Err(e) = self.renewal.adopt(&credential).await {
                    warn!(error = %e, "Failed to persist renewal credential (non-fatal)");
                }
                info!("Logged in");
            }
            None => warn!("Login response carried no renewal credential"),
        }

        Ok(payload)
    }

    /// Log out. The backend call is best-effort; the stored renewal credential
    /// is cleared regardless of its result.
    pub async fn logout(&self) {
        let current = match self.renewal.current().await {
            Ok(current) => current,
            Err(e) => {
                warn!(error = %e, "Failed to read renewal credential during logout");
                None
            }
        };

        let body = match current.as_ref() {
            Some(credential) => serde_json::json!({ "refresh_token": credential.expose() }),
            None => serde_json::json!({}),
        };
        let descriptor = RequestDescriptor::post(self.config.logout_path.clone(), body);
        if let Err(e) = self.dispatcher.dispatch_once(&descriptor).await {
            warn!(error = %e, "Logout request failed (non-fatal)");
        }

        if let Err(e) = self.renewal.forget().await {
            warn!(error = %e, "Failed to clear renewal credential");
        }
        info!("Logged out");
    }
}
