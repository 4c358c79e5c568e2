//! Error types for stevedore-pkg

use stevedore_oci::RegistryError;
use thiserror::Error;

/// Errors raised by the content store
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Bytes do not match their declared digest or size
    #[error("integrity check failed: expected {expected}, got {actual}")]
    Integrity {
        /// Declared identity
        expected: String,
        /// Identity of the bytes received
        actual: String,
    },

    /// Blob is not in the store
    #[error("blob not found: {0}")]
    NotFound(String),

    /// Filesystem error
    #[error("store I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// Errors raised while fetching a package
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    /// Local path, file, or remote content is absent
    #[error("not found: {0}")]
    NotFound(String),

    /// Transient transport failure; the whole fetch may be retried
    #[error("network error: {0}")]
    Network(String),

    /// Content does not match its digest; re-resolve before retrying
    #[error("integrity check failed: expected {expected}, got {actual}")]
    Integrity {
        /// Declared identity
        expected: String,
        /// Identity of the bytes received
        actual: String,
    },

    /// Manifest or package definition could not be understood
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// Package entry in the bundle is malformed
    #[error("invalid package reference: {0}")]
    InvalidReference(String),

    /// Registry refused the request
    #[error("registry error: {0}")]
    Registry(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(String),
}

impl FetchError {
    /// Check if the caller may retry the whole fetch
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Network(_))
    }
}

impl From<StoreError> for FetchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Integrity { expected, actual } => FetchError::Integrity { expected, actual },
            StoreError::NotFound(digest) => FetchError::NotFound(digest),
            StoreError::Io(message) => FetchError::Io(message),
        }
    }
}

impl From<RegistryError> for FetchError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(what) => FetchError::NotFound(what),
            RegistryError::DigestMismatch { expected, actual } => {
                FetchError::Integrity { expected, actual }
            }
            RegistryError::Http(e) => FetchError::Network(e.to_string()),
            ref e @ RegistryError::Api { .. } if e.is_retryable() => {
                FetchError::Network(e.to_string())
            }
            e @ (RegistryError::Api { .. } | RegistryError::Auth(_)) => {
                FetchError::Registry(e.to_string())
            }
            e @ (RegistryError::InvalidDigest(_)
            | RegistryError::InvalidReference(_)
            | RegistryError::Url(_)) => FetchError::InvalidReference(e.to_string()),
            e @ (RegistryError::Json(_)
            | RegistryError::NoMatchingPlatform(_)
            | RegistryError::UnsupportedMediaType(_)) => FetchError::InvalidManifest(e.to_string()),
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            FetchError::NotFound(err.to_string())
        } else {
            FetchError::Io(err.to_string())
        }
    }
}
