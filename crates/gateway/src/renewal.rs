//! Single-flight renewal of the access credential.
//!
//! [`RenewalCoordinator`] owns the renewal credential (through its
//! [`CredentialStore`]) and guarantees that at most one renewal exchange with
//! the backend is in flight at any instant. Callers that ask for a renewal
//! while one is running wait for it and receive the same [`RenewalOutcome`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, Notify, OnceCell};
use tracing::{debug, info, instrument, warn};

use crate::config::GatewayConfig;
use crate::credentials::{CredentialError, CredentialStore, RenewalCredential};

/// Why a renewal did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenewalFailure {
    /// No renewal credential is stored; the backend was not contacted.
    #[error("No renewal credential stored")]
    MissingCredential,

    /// The backend refused the renewal.
    #[error("Renewal rejected with status {0}")]
    Rejected(u16),

    /// The renewal exchange did not complete at the transport level.
    #[error("Renewal request failed: {0}")]
    Transport(String),

    /// The stored credential could not be read.
    #[error("Credential store error: {0}")]
    Store(String),

    /// The task driving the renewal was dropped before it finished.
    #[error("Renewal was interrupted before completing")]
    Interrupted,

    /// A login or logout happened while the renewal was in flight; its
    /// result belongs to the previous session and was discarded.
    #[error("Session changed while renewal was in flight")]
    Superseded,
}

/// Result of one renewal exchange, shared by every caller that waited on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalOutcome {
    /// A new access credential was issued. `rotated` holds the replacement
    /// renewal credential when the backend sent one; it is already persisted.
    Renewed { rotated: Option<RenewalCredential> },
    Failed(RenewalFailure),
}

impl RenewalOutcome {
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Renewed { .. })
    }
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    refresh_token: Option<String>,
}

struct InFlightRenewal {
    outcome: OnceCell<RenewalOutcome>,
    notify: Notify,
}

impl InFlightRenewal {
    fn new() -> Self {
        Self {
            outcome: OnceCell::new(),
            notify: Notify::new(),
        }
    }

    fn set_outcome(&self, outcome: RenewalOutcome) {
        let _ = self.outcome.set(outcome);
        self.notify.notify_waiters();
    }

    async fn wait(&self) -> RenewalOutcome {
        loop {
            if let Some(outcome) = self.outcome.get() {
                return outcome.clone();
            }

            let notified = self.notify.notified();
            if let Some(outcome) = self.outcome.get() {
                return outcome.clone();
            }

            notified.await;
        }
    }
}

enum Flight {
    Leader(Arc<InFlightRenewal>),
    Follower(Arc<InFlightRenewal>),
    /// A renewal succeeded after the caller's epoch snapshot.
    AlreadyRenewed,
}

/// Completes the in-flight renewal and releases the latch, even if the
/// leader's future is dropped half way.
struct FlightGuard<'a> {
    coordinator: &'a RenewalCoordinator,
    flight: Arc<InFlightRenewal>,
    completed: bool,
}

impl FlightGuard<'_> {
    fn complete(mut self, outcome: RenewalOutcome) {
        self.completed = true;
        self.coordinator.finish(&self.flight, outcome);
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            warn!("Renewal dropped before completion");
            self.coordinator
                .finish(&self.flight, RenewalOutcome::Failed(RenewalFailure::Interrupted));
        }
    }
}

/// Process-wide renewal service. Construct once and share via `Arc`.
pub struct RenewalCoordinator {
    client: reqwest::Client,
    refresh_url: String,
    store: Arc<dyn CredentialStore>,
    in_flight: Mutex<Option<Arc<InFlightRenewal>>>,
    /// Number of successful renewals completed so far.
    epoch: AtomicU64,
    /// Bumped by every login/logout. Store writes from a renewal are dropped
    /// when it moved since the renewal read the credential.
    session: AtomicU64,
    /// Held across every store write together with the `session` check.
    store_lock: AsyncMutex<()>,
}

impl RenewalCoordinator {
    pub fn new(
        client: reqwest::Client,
        config: &GatewayConfig,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            client,
            refresh_url: config.endpoint_url(&config.refresh_path),
            store,
            in_flight: Mutex::new(None),
            epoch: AtomicU64::new(0),
            session: AtomicU64::new(0),
            store_lock: AsyncMutex::new(()),
        }
    }

    /// Count of successful renewals. Snapshot it before a request to later
    /// ask for a renewal only if none happened since.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Whether a renewal exchange is currently running.
    pub fn is_renewing(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    /// Renew the access credential, joining a running renewal if there is one.
    pub async fn renew(&self) -> RenewalOutcome {
        self.run(None).await
    }

    /// Like [`renew`](Self::renew), but succeeds immediately without a backend
    /// call if a renewal already completed successfully after `epoch`.
    pub async fn renew_since(&self, epoch: u64) -> RenewalOutcome {
        self.run(Some(epoch)).await
    }

    #[instrument(skip(self), fields(url = %self.refresh_url))]
    async fn run(&self, since: Option<u64>) -> RenewalOutcome {
        match self.join_or_start(since) {
            Flight::AlreadyRenewed => {
                debug!("Renewal already completed since request was sent");
                RenewalOutcome::Renewed { rotated: None }
            }
            Flight::Follower(flight) => {
                debug!("Joining in-flight renewal");
                flight.wait().await
            }
            Flight::Leader(flight) => {
                let guard = FlightGuard {
                    coordinator: self,
                    flight,
                    completed: false,
                };
                let outcome = self.exchange().await;
                guard.complete(outcome.clone());
                outcome
            }
        }
    }

    fn join_or_start(&self, since: Option<u64>) -> Flight {
        let mut in_flight = self.in_flight.lock();

        if let Some(existing) = in_flight.as_ref() {
            return Flight::Follower(Arc::clone(existing));
        }

        if let Some(epoch) = since
            && self.epoch.load(Ordering::Acquire) != epoch
        {
            return Flight::AlreadyRenewed;
        }

        let flight = Arc::new(InFlightRenewal::new());
        *in_flight = Some(Arc::clone(&flight));
        Flight::Leader(flight)
    }

    fn finish(&self, flight: &Arc<InFlightRenewal>, outcome: RenewalOutcome) {
        let mut in_flight = self.in_flight.lock();

        if outcome.is_success() {
            self.epoch.fetch_add(1, Ordering::AcqRel);
        }
        flight.set_outcome(outcome);

        if in_flight
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, flight))
        {
            in_flight.take();
        }
    }

    /// Perform the actual exchange with the backend.
    async fn exchange(&self) -> RenewalOutcome {
        let session = self.session.load(Ordering::Acquire);

        let credential = match self.store.load().await {
            Ok(Some(credential)) => credential,
            Ok(None) => {
                debug!("No renewal credential stored; skipping renewal");
                return RenewalOutcome::Failed(RenewalFailure::MissingCredential);
            }
            Err(e) => {
                warn!(error = %e, "Failed to read renewal credential");
                self.invalidate(session).await;
                return RenewalOutcome::Failed(RenewalFailure::Store(e.to_string()));
            }
        };

        info!("Renewing access credential");

        // The renewal credential goes in the body as well as riding along in
        // the cookie jar: cross-origin deployments do not send the cookie.
        let response = self
            .client
            .post(&self.refresh_url)
            .json(&RefreshRequest {
                refresh_token: credential.expose(),
            })
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Renewal request failed");
                self.invalidate(session).await;
                return RenewalOutcome::Failed(RenewalFailure::Transport(e.to_string()));
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Renewal rejected by backend");
            self.invalidate(session).await;
            return RenewalOutcome::Failed(RenewalFailure::Rejected(status.as_u16()));
        }

        let rotated = match response.bytes().await {
            Ok(body) => extract_rotated(&body),
            Err(e) => {
                debug!(error = %e, "Could not read renewal response body");
                None
            }
        };

        let _guard = self.store_lock.lock().await;
        if self.session.load(Ordering::Acquire) != session {
            info!("Session changed during renewal; discarding its result");
            return RenewalOutcome::Failed(RenewalFailure::Superseded);
        }

        if let Some(new_credential) = rotated.as_ref()
            && let Err(e) = self.store.save(new_credential).await
        {
            warn!(error = %e, "Failed to persist rotated renewal credential");
        }

        info!(rotated = rotated.is_some(), "Access credential renewed");
        RenewalOutcome::Renewed { rotated }
    }

    /// Clear the stored credential unless a login/logout replaced it since
    /// `session` was observed.
    async fn invalidate(&self, session: u64) {
        let _guard = self.store_lock.lock().await;
        if self.session.load(Ordering::Acquire) != session {
            debug!("Session changed during renewal; keeping stored credential");
            return;
        }
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "Failed to clear renewal credential");
        }
    }

    // ========== Session lifecycle ==========

    /// Store the renewal credential issued at login.
    pub async fn adopt(&self, credential: &RenewalCredential) -> Result<(), CredentialError> {
        let _guard = self.store_lock.lock().await;
        self.session.fetch_add(1, Ordering::AcqRel);
        self.store.save(credential).await
    }

    /// The currently stored renewal credential.
    pub async fn current(&self) -> Result<Option<RenewalCredential>, CredentialError> {
        self.store.load().await
    }

    /// Drop the stored renewal credential (logout).
    pub async fn forget(&self) -> Result<(), CredentialError> {
        let _guard = self.store_lock.lock().await;
        self.session.fetch_add(1, Ordering::AcqRel);
        self.store.clear().await
    }
}

/// Pull a rotated renewal credential out of a successful renewal or login body.
pub(crate) fn extract_rotated(body: &[u8]) -> Option<RenewalCredential> {
    serde_json::from_slice::<RefreshResponse>(body)
        .ok()
        .and_then(|r| r.refresh_token)
        .and_then(|token| RenewalCredential::new(token))
}
