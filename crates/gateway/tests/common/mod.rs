//! In-process backend used by the gateway integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header::ACCEPT_LANGUAGE};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::Barrier;

use gateway_client::{
    CredentialStore, Gateway, GatewayConfig, MemoryCredentialStore, RenewalCredential,
};

/// How the renewal endpoint answers.
#[derive(Debug, Clone)]
pub enum RefreshMode {
    /// 200 with a rotated renewal credential.
    Rotate(&'static str),
    /// 200 without a rotated credential.
    Plain,
    /// 401.
    Reject,
}

pub struct Backend {
    pub refresh_calls: AtomicUsize,
    pub exercise_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    /// Whether the access credential is currently valid.
    pub session_valid: AtomicBool,
    /// Keep answering 401 on `/exercises` even after renewal.
    pub always_expired: AtomicBool,
    pub refresh_mode: Mutex<RefreshMode>,
    pub refresh_delay: Duration,
    /// Holds the first wave of expired responses until they are all in.
    pub expiry_barrier: Option<Barrier>,
    pub last_refresh_body: Mutex<Option<Value>>,
    pub last_logout_body: Mutex<Option<Value>>,
    pub last_locale: Mutex<Option<String>>,
}

impl Backend {
    pub fn new(refresh_mode: RefreshMode) -> Self {
        Self {
            refresh_calls: AtomicUsize::new(0),
            exercise_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            session_valid: AtomicBool::new(false),
            always_expired: AtomicBool::new(false),
            refresh_mode: Mutex::new(refresh_mode),
            refresh_delay: Duration::from_millis(0),
            expiry_barrier: None,
            last_refresh_body: Mutex::new(None),
            last_logout_body: Mutex::new(None),
            last_locale: Mutex::new(None),
        }
    }

    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub fn with_expiry_barrier(mut self, parties: usize) -> Self {
        self.expiry_barrier = Some(Barrier::new(parties));
        self
    }

    pub fn valid_session(self) -> Self {
        self.session_valid.store(true, Ordering::SeqCst);
        self
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn exercise_calls(&self) -> usize {
        self.exercise_calls.load(Ordering::SeqCst)
    }
}

type Shared = Arc<Backend>;

async fn exercises(State(backend): State<Shared>, headers: HeaderMap) -> Response {
    backend.exercise_calls.fetch_add(1, Ordering::SeqCst);
    *backend.last_locale.lock() = headers
        .get(ACCEPT_LANGUAGE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let expired = backend.always_expired.load(Ordering::SeqCst)
        || !backend.session_valid.load(Ordering::SeqCst);

    if expired {
        if let Some(barrier) = backend.expiry_barrier.as_ref()
            && !backend.always_expired.load(Ordering::SeqCst)
        {
            barrier.wait().await;
        }
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Token expired"})),
        )
            .into_response();
    }

    Json(json!([{"id": 1, "title": "Loops"}, {"id": 2, "title": "Recursion"}])).into_response()
}

async fn refresh(State(backend): State<Shared>, Json(body): Json<Value>) -> Response {
    backend.refresh_calls.fetch_add(1, Ordering::SeqCst);
    *backend.last_refresh_body.lock() = Some(body);

    if !backend.refresh_delay.is_zero() {
        tokio::time::sleep(backend.refresh_delay).await;
    }

    let mode = backend.refresh_mode.lock().clone();
    match mode {
        RefreshMode::Rotate(next) => {
            backend.session_valid.store(true, Ordering::SeqCst);
            Json(json!({"access_token": "at-new", "refresh_token": next})).into_response()
        }
        RefreshMode::Plain => {
            backend.session_valid.store(true, Ordering::SeqCst);
            Json(json!({"access_token": "at-new"})).into_response()
        }
        RefreshMode::Reject => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Invalid refresh token"})),
        )
            .into_response(),
    }
}

async fn login(State(backend): State<Shared>, Json(body): Json<Value>) -> Response {
    if body.get("password").and_then(|p| p.as_str()) != Some("secret") {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Invalid username or password"})),
        )
            .into_response();
    }

    backend.session_valid.store(true, Ordering::SeqCst);
    Json(json!({"access_token": "at-1", "refresh_token": "rt-login", "token_type": "Bearer"}))
        .into_response()
}

async fn logout(State(backend): State<Shared>, Json(body): Json<Value>) -> StatusCode {
    backend.logout_calls.fetch_add(1, Ordering::SeqCst);
    *backend.last_logout_body.lock() = Some(body);
    backend.session_valid.store(false, Ordering::SeqCst);
    StatusCode::NO_CONTENT
}

async fn broken() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "database is on fire")
}

async fn missing() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Start the backend and return its base URL.
pub async fn spawn_backend(backend: Shared) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let app = Router::new()
        .route("/exercises", get(exercises))
        .route("/auth/refresh", post(refresh))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/broken", get(broken))
        .route("/missing", get(missing))
        .with_state(backend);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

/// Memory store preloaded with a renewal credential.
pub fn store_with(value: &str) -> Arc<MemoryCredentialStore> {
    Arc::new(MemoryCredentialStore::with_credential(
        RenewalCredential::new(value).unwrap(),
    ))
}

pub fn gateway(base_url: &str, store: Arc<dyn CredentialStore>) -> Gateway {
    Gateway::builder(GatewayConfig::new(base_url))
        .credential_store(store)
        .build()
        .unwrap()
}

pub async fn stored(store: &dyn CredentialStore) -> Option<String> {
    store
        .load()
        .await
        .unwrap()
        .map(|c| c.expose().to_string())
}
