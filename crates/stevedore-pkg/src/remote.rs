//! Packages pulled from an OCI registry

use std::sync::Arc;

use async_trait::async_trait;
use stevedore_oci::{Descriptor, ImageManifest, Reference, Registry};
use tracing::{debug, info, instrument};

use crate::error::FetchError;
use crate::store::ContentStore;
use crate::traits::Fetcher;
use crate::types::{FetcherConfig, PackageMetadata};

/// Fetcher for a package stored in a registry
pub struct RemoteFetcher {
    reference: Reference,
    manifest: ImageManifest,
    registry: Arc<dyn Registry>,
    store: Arc<ContentStore>,
}

impl std::fmt::Debug for RemoteFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFetcher")
            .field("reference", &self.reference)
            .field("manifest", &self.manifest)
            .finish_non_exhaustive()
    }
}

impl RemoteFetcher {
    /// Resolve `reference` for the configured platform
    ///
    /// An image index is narrowed to the entry matching the platform.
    ///
    /// # Errors
    /// Returns the registry failure mapped onto [`FetchError`].
    #[instrument(skip(config), fields(reference = %reference, platform = %config.platform))]
    pub async fn connect(reference: Reference, config: &FetcherConfig) -> Result<Self, FetchError> {
        let manifest = config.registry.resolve(&reference, &config.platform).await?;
        debug!(
            layers = manifest.layers.len(),
            size = manifest.total_size(),
            "resolved manifest"
        );

        Ok(Self {
            reference,
            manifest,
            registry: config.registry.clone(),
            store: config.store.clone(),
        })
    }

    /// Registry coordinate being fetched
    #[must_use]
    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    /// Download one blob and commit it to the store
    async fn pull(&self, descriptor: &Descriptor) -> Result<(), FetchError> {
        let bytes = self.registry.fetch_blob(&self.reference, descriptor).await?;
        self.store.put_async(descriptor, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl Fetcher for RemoteFetcher {
    #[instrument(skip(self), fields(reference = %self.reference))]
    async fn fetch(&self) -> Result<Vec<Descriptor>, FetchError> {
        let mut fetched = Vec::with_capacity(self.manifest.layers.len() + 1);
        let mut downloaded = 0usize;

        for descriptor in self.manifest.descriptors() {
            if self.store.has(&descriptor.digest) {
                debug!(digest = %descriptor.digest, "blob already in store");
            } else {
                self.pull(descriptor).await?;
                downloaded += 1;
            }
            fetched.push(descriptor.clone());
        }

        info!(
            blobs = fetched.len(),
            downloaded, "fetched package content"
        );
        Ok(fetched)
    }

    async fn metadata(&self) -> Result<PackageMetadata, FetchError> {
        let config = &self.manifest.config;
        if !self.store.has(&config.digest) {
            self.pull(config).await?;
        }
        PackageMetadata::from_slice(&self.store.get_async(&config.digest).await?)
    }

    fn manifest(&self) -> &ImageManifest {
        &self.manifest
    }

    fn kind(&self) -> &'static str {
        "remote"
    }
}
