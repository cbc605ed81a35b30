//! Credential persistence abstraction.
//!
//! Only the renewal coordinator reads or writes the store; there is exactly one
//! valid renewal credential per client installation at any time.

use async_trait::async_trait;
use parking_lot::RwLock;

use super::error::CredentialError;
use super::types::RenewalCredential;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Read the stored renewal credential, if any.
    async fn load(&self) -> Result<Option<RenewalCredential>, CredentialError>;

    /// Replace the stored renewal credential.
    async fn save(&self, credential: &RenewalCredential) -> Result<(), CredentialError>;

    /// Remove the stored renewal credential. Clearing an empty store is not an error.
    async fn clear(&self) -> Result<(), CredentialError>;
}

/// In-memory store, lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credential: RwLock<Option<RenewalCredential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `credential`.
    pub fn with_credential(credential: RenewalCredential) -> Self {
        Self {
            credential: RwLock::new(Some(credential)),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<RenewalCredential>, CredentialError> {
        Ok(self.credential.read().clone())
    }

    async fn save(&self, credential: &RenewalCredential) -> Result<(), CredentialError> {
        *self.credential.write() = Some(credential.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), CredentialError> {
        self.credential.write().take();
        Ok(())
    }
}
