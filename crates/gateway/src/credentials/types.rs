use std::fmt;

use serde::{Deserialize, Serialize};

/// Long-lived opaque secret used solely to obtain a new access credential.
///
/// `Debug` output is redacted so the value never reaches logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct RenewalCredential(String);

impl RenewalCredential {
    /// Wrap a credential value. Blank values are rejected.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    /// The raw credential value.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RenewalCredential {
    type Error = &'static str;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value).ok_or("renewal credential must not be blank")
    }
}

impl From<RenewalCredential> for String {
    fn from(credential: RenewalCredential) -> Self {
        credential.0
    }
}

impl fmt::Debug for RenewalCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RenewalCredential(***)")
    }
}
