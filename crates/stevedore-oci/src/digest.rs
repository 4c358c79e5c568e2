//! Content digests
//!
//! Only `sha256` digests are accepted. The textual form is
//! `sha256:<64 lowercase hex chars>`, as used throughout the OCI specs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::error::RegistryError;

/// A validated `sha256` content digest
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest {
    hex: String,
}

impl Digest {
    /// Algorithm prefix of every digest
    pub const ALGORITHM: &'static str = "sha256";

    /// Compute the digest of some bytes
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self {
            hex: hex::encode(hasher.finalize()),
        }
    }

    /// Hex-encoded hash without the algorithm prefix
    #[must_use]
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Whether `bytes` hash to this digest
    #[must_use]
    pub fn matches(&self, bytes: &[u8]) -> bool {
        Self::of(bytes) == *self
    }

    /// Fail with [`RegistryError::DigestMismatch`] unless `bytes` hash to this digest
    ///
    /// # Errors
    /// Returns the mismatch with both digests spelled out.
    pub fn verify(&self, bytes: &[u8]) -> Result<(), RegistryError> {
        let actual = Self::of(bytes);
        if actual == *self {
            Ok(())
        } else {
            Err(RegistryError::DigestMismatch {
                expected: self.to_string(),
                actual: actual.to_string(),
            })
        }
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", Self::ALGORITHM, self.hex)
    }
}

impl FromStr for Digest {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (algorithm, hex) = s
            .split_once(':')
            .ok_or_else(|| RegistryError::InvalidDigest(s.to_string()))?;

        if algorithm != Self::ALGORITHM {
            return Err(RegistryError::InvalidDigest(format!(
                "unsupported algorithm `{algorithm}` in {s}"
            )));
        }
        if hex.len() != 64 || !hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(RegistryError::InvalidDigest(s.to_string()));
        }

        Ok(Self {
            hex: hex.to_string(),
        })
    }
}

impl TryFrom<String> for Digest {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.to_string()
    }
}
