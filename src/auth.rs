// src/auth.rs
use anyhow::{anyhow, bail, Result};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use sha2::{Digest, Sha256};

use crate::config::AccessConfig;

/// The shared access key, held only as its SHA-256 digest.
#[derive(Clone)]
pub struct AccessGate {
    digest: [u8; 32],
}

impl std::fmt::Debug for AccessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessGate(..)")
    }
}

fn sha256(text: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

/// Base64 SHA-256 of `key`, the form `access.key_sha256` expects.
pub fn hash_key(key: &str) -> String {
    B64.encode(sha256(key))
}

impl AccessGate {
    pub fn from_key(key: &str) -> Result<Self> {
        if key.is_empty() {
            bail!("access key must not be empty");
        }
        Ok(Self {
            digest: sha256(key),
        })
    }

    pub fn from_digest_b64(encoded: &str) -> Result<Self> {
        let bytes = B64
            .decode(encoded.trim())
            .map_err(|e| anyhow!("access.key_sha256 is not base64: {}", e))?;
        let digest: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow!("access.key_sha256 must decode to 32 bytes"))?;
        Ok(Self { digest })
    }

    /// Build from config; a digest wins over a plain key. Errors when neither is set.
    pub fn from_config(cfg: &AccessConfig) -> Result<Self> {
        match (&cfg.key_sha256, &cfg.key) {
            (Some(digest), _) => Self::from_digest_b64(digest),
            (None, Some(key)) => Self::from_key(key),
            (None, None) => bail!(
                "no access key configured; set access.key, access.key_sha256 or AGENTDIR_ACCESS_KEY"
            ),
        }
    }

    /// Compare digests without short-circuiting on the first differing byte.
    pub fn verify(&self, candidate: &str) -> bool {
        let other = sha256(candidate);
        self.digest
            .iter()
            .zip(other.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}
