use sha2::{Digest, Sha256};
use thiserror::Error;

const SHA256_HEX_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialDigestError {
    #[error("credential digest must be {SHA256_HEX_LEN} hex characters, got {0}")]
    InvalidLength(usize),
    #[error("credential digest contains non-hex characters")]
    InvalidCharacters,
}

/// Configured one-way digest of the shared operator secret.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialDigest {
    sha256_hex: String,
}

impl CredentialDigest {
    /// Parses a lowercase or uppercase SHA-256 hex digest.
    pub fn from_sha256_hex(raw: &str) -> Result<Self, CredentialDigestError> {
        let trimmed = raw.trim();
        if trimmed.len() != SHA256_HEX_LEN {
            return Err(CredentialDigestError::InvalidLength(trimmed.len()));
        }
        if !trimmed.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(CredentialDigestError::InvalidCharacters);
        }
        Ok(Self {
            sha256_hex: trimmed.to_ascii_lowercase(),
        })
    }

    /// Builds the digest of a plaintext secret.
    pub fn from_secret(secret: &str) -> Self {
        Self {
            sha256_hex: sha256_hex(secret),
        }
    }

    pub fn as_hex(&self) -> &str {
        &self.sha256_hex
    }

    /// Compares the digest of `presented` without short-circuiting on the
    /// first differing byte.
    pub fn matches(&self, presented: &str) -> bool {
        let candidate = sha256_hex(presented);
        let expected = self.sha256_hex.as_bytes();
        let candidate = candidate.as_bytes();
        if expected.len() != candidate.len() {
            return false;
        }
        expected
            .iter()
            .zip(candidate.iter())
            .fold(0u8, |acc, (left, right)| acc | (left ^ right))
            == 0
    }
}

impl std::fmt::Debug for CredentialDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialDigest")
            .field("sha256_hex", &"<redacted>")
            .finish()
    }
}

pub fn sha256_hex(value: &str) -> String {
    format!("{:x}", Sha256::digest(value.as_bytes()))
}
