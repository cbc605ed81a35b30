//! Request dispatch with transparent renewal of an expired access credential.
//!
//! A call runs as a small state machine:
//!
//! ```text
//! Attempt ──success/failure──────────────────────────────▶ Done
//!    │
//!    └─expired─▶ Renew ──failed──▶ Done(session expired)
//!                  │
//!                  └─renewed─▶ Replay ──any result──▶ Done
//! ```
//!
//! [`RequestDispatcher::replay`] has no expiry branch, so a request is
//! replayed at most once whatever the backend answers.

use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderValue};
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use crate::config::GatewayConfig;
use crate::decode::backend_error;
use crate::descriptor::RequestDescriptor;
use crate::error::{GatewayError, Result};
use crate::renewal::RenewalCoordinator;

/// Source of the language tag attached to every request.
pub trait LocaleSource: Send + Sync {
    fn locale(&self) -> String;
}

/// Client-side locale preference that the UI can update at runtime.
#[derive(Debug)]
pub struct LocalePreference {
    tag: RwLock<String>,
}

impl LocalePreference {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: RwLock::new(tag.into()),
        }
    }

    pub fn set(&self, tag: impl Into<String>) {
        *self.tag.write() = tag.into();
    }
}

impl Default for LocalePreference {
    fn default() -> Self {
        Self::new("en")
    }
}

impl LocaleSource for LocalePreference {
    fn locale(&self) -> String {
        self.tag.read().clone()
    }
}

/// Whether an expired-credential response may trigger a renewal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Renew once and replay the request once.
    RenewOnExpiry,
    /// Surface the expired-credential response as-is.
    Never,
}

/// Successful backend response.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub status: StatusCode,
    /// Decoded body: `null` when empty, a JSON string when not JSON.
    pub data: serde_json::Value,
}

impl Payload {
    fn from_body(status: StatusCode, body: &[u8]) -> Self {
        let data = if body.iter().all(u8::is_ascii_whitespace) {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(body).unwrap_or_else(|_| {
                serde_json::Value::String(String::from_utf8_lossy(body).into_owned())
            })
        };

        Self { status, data }
    }

    /// Deserialize the payload into a caller type.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.data.clone()).map_err(|e| {
            GatewayError::decode(self.status, format!("Unexpected response format: {e}"))
        })
    }
}

/// Outcome of one network attempt.
enum Attempt {
    Completed(Payload),
    Expired { status: StatusCode, body: String },
    Failed(GatewayError),
}

impl Attempt {
    fn into_result(self) -> Result<Payload> {
        match self {
            Attempt::Completed(payload) => Ok(payload),
            Attempt::Expired { status, body } => Err(backend_error(status, &body)),
            Attempt::Failed(err) => Err(err),
        }
    }
}

/// Mediates every call from the application to the backend API.
pub struct RequestDispatcher {
    client: reqwest::Client,
    config: Arc<GatewayConfig>,
    renewal: Arc<RenewalCoordinator>,
    locale: Arc<dyn LocaleSource>,
}

impl RequestDispatcher {
    pub fn new(
        client: reqwest::Client,
        config: Arc<GatewayConfig>,
        renewal: Arc<RenewalCoordinator>,
        locale: Arc<dyn LocaleSource>,
    ) -> Self {
        Self {
            client,
            config,
            renewal,
            locale,
        }
    }

    /// Issue a call, renewing the access credential once if it expired.
    pub async fn dispatch(&self, descriptor: &RequestDescriptor) -> Result<Payload> {
        self.dispatch_with(descriptor, RetryPolicy::RenewOnExpiry)
            .await
    }

    /// Issue a call without any renewal handling.
    pub async fn dispatch_once(&self, descriptor: &RequestDescriptor) -> Result<Payload> {
        self.dispatch_with(descriptor, RetryPolicy::Never).await
    }

    #[instrument(skip(self, descriptor), fields(method = %descriptor.method(), path = %descriptor.path()))]
    pub async fn dispatch_with(
        &self,
        descriptor: &RequestDescriptor,
        policy: RetryPolicy,
    ) -> Result<Payload> {
        let epoch = self.renewal.epoch();

        let (status, body) = match self.attempt(descriptor).await {
            Attempt::Expired { status, body } => (status, body),
            other => return other.into_result(),
        };

        if policy == RetryPolicy::Never || self.config.is_auth_endpoint(descriptor.path()) {
            return Err(backend_error(status, &body));
        }

        debug!("Access credential expired; requesting renewal");
        let outcome = self.renewal.renew_since(epoch).await;
        if !outcome.is_success() {
            info!(?outcome, "Renewal failed; session expired");
            return Err(GatewayError::session_expired(status));
        }

        self.replay(descriptor).await
    }

    /// Post-renewal attempt. An expired credential here is a plain failure.
    async fn replay(&self, descriptor: &RequestDescriptor) -> Result<Payload> {
        debug!("Replaying request after renewal");
        self.attempt(descriptor).await.into_result()
    }

    async fn attempt(&self, descriptor: &RequestDescriptor) -> Attempt {
        let url = self.config.endpoint_url(descriptor.path());

        let mut request = self
            .client
            .request(descriptor.method().clone(), &url)
            .header(ACCEPT, HeaderValue::from_static("application/json"));

        let locale = descriptor
            .locale()
            .map(str::to_string)
            .unwrap_or_else(|| self.locale.locale());
        match HeaderValue::from_str(&locale) {
            Ok(value) => request = request.header(ACCEPT_LANGUAGE, value),
            Err(_) => warn!(%locale, "Ignoring invalid locale tag"),
        }

        if !descriptor.query().is_empty() {
            request = request.query(descriptor.query());
        }
        if let Some(body) = descriptor.body() {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(%url, error = %e, "Request did not reach the backend");
                return Attempt::Failed(GatewayError::from_transport(&e, &self.config.base_url));
            }
        };

        let status = response.status();
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                warn!(%url, error = %e, "Response body could not be read");
                return Attempt::Failed(GatewayError::from_transport(&e, &self.config.base_url));
            }
        };

        if status.is_success() {
            return Attempt::Completed(Payload::from_body(status, &body));
        }

        let body = String::from_utf8_lossy(&body).into_owned();
        if status == self.config.expired_status {
            Attempt::Expired { status, body }
        } else {
            debug!(status = status.as_u16(), "Backend reported failure");
            Attempt::Failed(backend_error(status, &body))
        }
    }
}
