use std::fmt;
use std::net::IpAddr;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const GENERATED_SALT_LEN: usize = 32;

/// One-way identity of whoever submitted a batch, derived from their address.
/// Used for novelty detection only, never returned to readers.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct ReporterFingerprint(pub(crate) String);

impl ReporterFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Keep the digest out of debug logs.
impl fmt::Debug for ReporterFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(8).collect();
        write!(f, "ReporterFingerprint({prefix}..)")
    }
}

#[derive(Clone)]
pub struct Fingerprinter {
    salt: Vec<u8>,
}

impl Fingerprinter {
    /// Without a configured salt a random one is drawn, so fingerprints are only
    /// stable for the lifetime of the process.
    pub fn new(salt: Option<String>) -> Self {
        let salt = match salt {
            Some(salt) => salt.into_bytes(),
            None => {
                let mut salt = vec![0u8; GENERATED_SALT_LEN];
                rand::thread_rng().fill_bytes(&mut salt);
                salt
            }
        };

        Self { salt }
    }

    pub fn fingerprint(&self, client_address: &str) -> ReporterFingerprint {
        let mut hasher = Sha256::new();
        hasher.update(&self.salt);
        hasher.update(client_address.as_bytes());
        ReporterFingerprint(hex::encode(hasher.finalize()))
    }
}

/// Picks the address a batch is attributed to: the first `X-Forwarded-For` entry,
/// then the socket peer, then the empty string. Never fails.
pub fn resolve_client_address(forwarded_for: Option<&str>, peer: Option<IpAddr>) -> String {
    let forwarded = forwarded_for
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    match (forwarded, peer) {
        (Some(forwarded), _) => forwarded.to_owned(),
        (None, Some(peer)) => peer.to_string(),
        (None, None) => String::new(),
    }
}
