//! Renewal credential persistence.
//!
//! - [`RenewalCredential`]: the long-lived secret used to obtain a new access credential
//! - [`CredentialStore`]: persistence abstraction, owned by the renewal coordinator
//! - [`MemoryCredentialStore`] / [`FileCredentialStore`]: concrete stores

mod error;
mod file;
mod store;
mod types;

pub use error::CredentialError;
pub use file::FileCredentialStore;
pub use store::{CredentialStore, MemoryCredentialStore};
pub use types::RenewalCredential;
