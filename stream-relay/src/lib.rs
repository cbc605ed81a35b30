//! stream-relay library crate.
//!
//! Authenticates inbound streaming requests by their cookie, opens the
//! upstream AI content stream with the same cookies and pipes the bytes
//! back unmodified.

pub mod api;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod sse;

pub use config::RelayConfig;
pub use error::{Error, Result};
