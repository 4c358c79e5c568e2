//! Fetcher trait

use async_trait::async_trait;
use stevedore_oci::{Descriptor, ImageManifest};

use crate::error::FetchError;
use crate::types::PackageMetadata;

/// Source of one package's manifest and content
///
/// The manifest is resolved when the fetcher is built, so `manifest()` never
/// does I/O.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Copy every blob of the package into the content store, verified
    ///
    /// Returns the descriptors in manifest order (config first).
    async fn fetch(&self) -> Result<Vec<Descriptor>, FetchError>;

    /// Parse the package definition from the config blob
    async fn metadata(&self) -> Result<PackageMetadata, FetchError>;

    /// Resolved manifest
    fn manifest(&self) -> &ImageManifest;

    /// Short label for logs
    fn kind(&self) -> &'static str;
}
