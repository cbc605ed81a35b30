//! Gateway error types.
//!
//! Every failure the dispatcher reports is a [`GatewayError`]: a kind, the
//! status the backend reported (or `0` when no response was received), a
//! human-readable message and optional structured details.

use std::fmt;

use reqwest::StatusCode;

/// Status value used when the backend never produced a response.
pub const TRANSPORT_STATUS: u16 = 0;

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Broad classification of a gateway failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The backend could not be reached or the exchange broke off.
    Transport,
    /// The backend answered with a non-success status.
    Backend,
    /// The access credential expired and renewal failed; re-login required.
    SessionExpired,
    /// A successful response did not have the shape the caller asked for.
    Decode,
}

/// Uniform error returned by the request gateway.
#[derive(Debug, Clone)]
pub struct GatewayError {
    pub kind: ErrorKind,
    /// `0` for transport failures, otherwise the backend status code.
    pub status: u16,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl GatewayError {
    /// Create a transport failure (status class 0).
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transport,
            status: TRANSPORT_STATUS,
            message: message.into(),
            details: None,
        }
    }

    /// Create a backend-reported failure.
    pub fn backend(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Backend,
            status: status.as_u16(),
            message: message.into(),
            details: None,
        }
    }

    /// Create the error surfaced when renewal failed after an expired credential.
    pub fn session_expired(status: StatusCode) -> Self {
        Self {
            kind: ErrorKind::SessionExpired,
            status: status.as_u16(),
            message: "Your session has expired. Please log in again.".to_string(),
            details: None,
        }
    }

    /// Create a client-side decoding failure for a successful response.
    ///
    /// `status` is the (successful) status the backend answered with.
    pub fn decode(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Decode,
            status: status.as_u16(),
            message: message.into(),
            details: None,
        }
    }

    /// Attach structured details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Whether no response was received from the backend.
    #[inline]
    pub fn is_transport(&self) -> bool {
        self.kind == ErrorKind::Transport
    }

    /// Whether the caller must authenticate again.
    #[inline]
    pub fn requires_relogin(&self) -> bool {
        self.kind == ErrorKind::SessionExpired
    }

    /// Map a `reqwest` failure that happened before a response arrived.
    pub(crate) fn from_transport(err: &reqwest::Error, base_url: &str) -> Self {
        if err.is_connect() {
            Self::transport(format!(
                "Cannot reach the server at {base_url}. Check your network connection."
            ))
        } else if err.is_timeout() {
            Self::transport("The server took too long to respond.")
        } else {
            Self::transport(format!("Request could not be completed: {err}"))
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.status == TRANSPORT_STATUS {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} (status {})", self.message, self.status)
        }
    }
}

impl std::error::Error for GatewayError {}
