//! Packages read from a directory on disk

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use stevedore_oci::{Descriptor, ImageManifest};
use tracing::{debug, instrument};

use crate::error::FetchError;
use crate::store::{ContentStore, MANIFEST_FILE, layout_blob_path};
use crate::traits::Fetcher;
use crate::types::PackageMetadata;

/// Fetcher for a package layout (`manifest.json` + `blobs/sha256/*`)
#[derive(Debug)]
pub struct LocalFetcher {
    path: PathBuf,
    manifest: ImageManifest,
    store: Arc<ContentStore>,
}

impl LocalFetcher {
    /// Open the package at `path` and read its manifest
    ///
    /// # Errors
    /// Returns [`FetchError::NotFound`] if the directory or its manifest is
    /// absent, [`FetchError::InvalidManifest`] if the manifest does not parse.
    pub fn open(path: impl Into<PathBuf>, store: Arc<ContentStore>) -> Result<Self, FetchError> {
        let path = path.into();
        if !path.is_dir() {
            return Err(FetchError::NotFound(format!(
                "package directory {}",
                path.display()
            )));
        }

        let manifest_path = path.join(MANIFEST_FILE);
        let bytes = std::fs::read(&manifest_path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                FetchError::NotFound(manifest_path.display().to_string())
            }
            _ => FetchError::Io(format!("{}: {e}", manifest_path.display())),
        })?;
        let manifest: ImageManifest = serde_json::from_slice(&bytes)
            .map_err(|e| FetchError::InvalidManifest(format!("{}: {e}", manifest_path.display())))?;

        Ok(Self {
            path,
            manifest,
            store,
        })
    }

    /// Package directory
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_blob(&self, descriptor: &Descriptor) -> Result<Vec<u8>, FetchError> {
        let blob = layout_blob_path(&self.path, &descriptor.digest);
        tokio::fs::read(&blob).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FetchError::NotFound(blob.display().to_string()),
            _ => FetchError::Io(format!("{}: {e}", blob.display())),
        })
    }
}

#[async_trait]
impl Fetcher for LocalFetcher {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn fetch(&self) -> Result<Vec<Descriptor>, FetchError> {
        let mut fetched = Vec::with_capacity(self.manifest.layers.len() + 1);
        for descriptor in self.manifest.descriptors() {
            if self.store.has(&descriptor.digest) {
                debug!(digest = %descriptor.digest, "blob already in store");
            } else {
                let bytes = self.read_blob(descriptor).await?;
                self.store.put_async(descriptor, bytes).await?;
            }
            fetched.push(descriptor.clone());
        }
        Ok(fetched)
    }

    async fn metadata(&self) -> Result<PackageMetadata, FetchError> {
        let config = &self.manifest.config;
        let bytes = if self.store.has(&config.digest) {
            self.store.get_async(&config.digest).await?
        } else {
            let bytes = self.read_blob(config).await?;
            config.verify(&bytes)?;
            bytes
        };
        PackageMetadata::from_slice(&bytes)
    }

    fn manifest(&self) -> &ImageManifest {
        &self.manifest
    }

    fn kind(&self) -> &'static str {
        "local"
    }
}
