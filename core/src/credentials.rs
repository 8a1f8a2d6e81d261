use std::fmt;

use sha2::{Digest, Sha256};

/// Length of the hex prefix used when a client id appears in logs.
const FINGERPRINT_LEN: usize = 12;

/// A caller's Petfinder OAuth client credentials.
///
/// Supplied fresh on every request and passed explicitly down to the token
/// cache. The cache keys tokens by `client_id`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Both fields present and non-blank.
    pub fn is_complete(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.client_secret.trim().is_empty()
    }

    /// Stable, non-reversible identifier for log fields.
    pub fn fingerprint(&self) -> String {
        client_id_fingerprint(&self.client_id)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.fingerprint())
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// SHA-256 hex digest of a client id, truncated for display.
pub fn client_id_fingerprint(client_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(client_id.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(FINGERPRINT_LEN);
    digest
}
