//! JSON file-backed credential store.
//!
//! Layout on disk: `{"refresh_token": "<value>"}`. A missing file means no
//! credential is stored.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::error::CredentialError;
use super::store::CredentialStore;
use super::types::RenewalCredential;

#[derive(Debug, Serialize, Deserialize)]
struct StoredCredential {
    refresh_token: RenewalCredential,
}

/// Persists the renewal credential to a single JSON file.
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crash never leaves a half-written credential behind.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    /// Serializes writers within this process.
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "credential".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<RenewalCredential>, CredentialError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<StoredCredential>(&raw) {
            Ok(stored) => Ok(Some(stored.refresh_token)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Stored credential is unreadable");
                Err(e.into())
            }
        }
    }

    async fn save(&self, credential: &RenewalCredential) -> Result<(), CredentialError> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_vec(&StoredCredential {
            refresh_token: credential.clone(),
        })?;

        let temp = self.temp_path();
        tokio::fs::write(&temp, body).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        debug!(path = %self.path.display(), "Renewal credential persisted");
        Ok(())
    }

    async fn clear(&self) -> Result<(), CredentialError> {
        let _guard = self.write_lock.lock().await;

        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "Renewal credential removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
