//! Error types for registry access

use thiserror::Error;

/// Errors that can occur while talking to a registry or parsing OCI content
#[derive(Error, Debug)]
pub enum RegistryError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Registry returned an error status
    #[error("registry error ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message from registry
        message: String,
    },

    /// Manifest or blob does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Token negotiation failed
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Malformed digest string
    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    /// Malformed repository reference
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// Content hashed to something other than its digest
    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        /// Declared digest
        expected: String,
        /// Digest of the received bytes
        actual: String,
    },

    /// Image index has no entry for the requested platform
    #[error("no manifest for platform {0}")]
    NoMatchingPlatform(String),

    /// Manifest media type is not supported
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
}

impl RegistryError {
    /// Check if error is transient and the whole operation may be retried
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            RegistryError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            RegistryError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Check if error means the content does not exist
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound(_))
    }

    /// Check if error means content failed verification
    #[must_use]
    pub fn is_integrity(&self) -> bool {
        matches!(self, RegistryError::DigestMismatch { .. })
    }
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
