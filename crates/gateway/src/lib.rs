//! Authenticated request gateway.
//!
//! Every call from the application to the backend goes through a
//! [`RequestDispatcher`]. The access credential travels in the transport's
//! cookie jar; when the backend reports it expired, the dispatcher asks the
//! process-wide [`RenewalCoordinator`] for a renewal and replays the call once.
//!
//! # Architecture
//!
//! - [`CredentialStore`]: persists the renewal credential (memory or file)
//! - [`RenewalCoordinator`]: single-flight renewal against the backend
//! - [`RequestDispatcher`]: issue, classify, renew-and-replay
//! - [`Gateway`]: wiring plus login / logout

pub mod config;
pub mod credentials;
pub mod decode;
pub mod descriptor;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod http;
pub mod renewal;

pub use config::GatewayConfig;
pub use credentials::{
    CredentialError, CredentialStore, FileCredentialStore, MemoryCredentialStore,
    RenewalCredential,
};
pub use descriptor::{Method, RequestDescriptor};
pub use dispatcher::{LocalePreference, LocaleSource, Payload, RequestDispatcher, RetryPolicy};
pub use error::{ErrorKind, GatewayError, Result};
pub use gateway::{Gateway, GatewayBuilder};
pub use renewal::{RenewalCoordinator, RenewalFailure, RenewalOutcome};
