//! Digest-keyed local blob store
//!
//! Blobs live at `<root>/blobs/sha256/<hex>`, the same layout a package
//! directory uses, so a staged package and the store can be read by the same
//! code. The store is append-only: nothing is ever evicted or overwritten.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use stevedore_oci::{Descriptor, Digest, ImageManifest};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use crate::error::StoreError;

/// Manifest file name inside a package layout
pub const MANIFEST_FILE: &str = "manifest.json";

/// Path of a blob inside a package layout rooted at `root`
#[must_use]
pub fn layout_blob_path(root: &Path, digest: &Digest) -> PathBuf {
    root.join("blobs").join(Digest::ALGORITHM).join(digest.hex())
}

/// Content-addressable blob store shared by every fetch of a run
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// Open a store, creating its directories if missing
    ///
    /// # Errors
    /// Returns an error if the directories cannot be created.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        let blobs = root.join("blobs").join(Digest::ALGORITHM);
        if !blobs.exists() {
            fs::create_dir_all(&blobs)?;
            debug!(path = %blobs.display(), "created content store");
        }
        Ok(Self { root })
    }

    /// Store root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the blob for `digest` lives
    #[must_use]
    pub fn blob_path(&self, digest: &Digest) -> PathBuf {
        layout_blob_path(&self.root, digest)
    }

    /// Whether the blob is present
    #[must_use]
    pub fn has(&self, digest: &Digest) -> bool {
        self.blob_path(digest).is_file()
    }

    /// Read a blob, re-verifying it against its digest
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if absent and [`StoreError::Integrity`]
    /// if the stored bytes no longer hash to `digest`.
    pub fn get(&self, digest: &Digest) -> Result<Vec<u8>, StoreError> {
        let path = self.blob_path(digest);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(digest.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let actual = Digest::of(&bytes);
        if actual != *digest {
            return Err(StoreError::Integrity {
                expected: digest.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(bytes)
    }

    /// Add a blob
    ///
    /// The bytes are verified before anything touches the disk and written to
    /// a temporary file that is renamed into place. Returns `false` when the
    /// blob was already present.
    ///
    /// # Errors
    /// Returns [`StoreError::Integrity`] on a size or digest mismatch; the
    /// store is unchanged in that case.
    #[instrument(skip(self, bytes), fields(digest = %descriptor.digest, size = descriptor.size))]
    pub fn put(&self, descriptor: &Descriptor, bytes: &[u8]) -> Result<bool, StoreError> {
        verify(descriptor, bytes)?;

        let path = self.blob_path(&descriptor.digest);
        if path.is_file() {
            debug!("blob already in store");
            return Ok(false);
        }

        let dir = path
            .parent()
            .ok_or_else(|| StoreError::Io(format!("invalid blob path {}", path.display())))?;
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error.to_string()))?;

        debug!("stored blob");
        Ok(true)
    }

    /// Materialize a package layout at `dest` from stored blobs
    ///
    /// # Errors
    /// Fails if any blob referenced by `manifest` is missing or corrupt.
    #[instrument(skip(self, manifest), fields(dest = %dest.display()))]
    pub fn stage(&self, manifest: &ImageManifest, dest: &Path) -> Result<(), StoreError> {
        fs::create_dir_all(dest.join("blobs").join(Digest::ALGORITHM))?;

        for descriptor in manifest.descriptors() {
            let bytes = self.get(&descriptor.digest)?;
            fs::write(layout_blob_path(dest, &descriptor.digest), bytes)?;
        }

        let json = serde_json::to_vec_pretty(manifest)
            .map_err(|e| StoreError::Io(format!("encode manifest: {e}")))?;
        fs::write(dest.join(MANIFEST_FILE), json)?;

        debug!(blobs = manifest.layers.len() + 1, "staged package");
        Ok(())
    }
}

/// Async entry points used by the fetchers
///
/// Each runs the matching synchronous operation on tokio's blocking pool so
/// hashing and disk writes never stall the runtime.
impl ContentStore {
    /// [`get`](Self::get) off the async runtime
    ///
    /// # Errors
    /// Same as [`get`](Self::get).
    pub async fn get_async(self: &Arc<Self>, digest: &Digest) -> Result<Vec<u8>, StoreError> {
        let store = Arc::clone(self);
        let digest = digest.clone();
        blocking(move || store.get(&digest)).await
    }

    /// [`put`](Self::put) off the async runtime
    ///
    /// # Errors
    /// Same as [`put`](Self::put).
    pub async fn put_async(
        self: &Arc<Self>,
        descriptor: &Descriptor,
        bytes: Vec<u8>,
    ) -> Result<bool, StoreError> {
        let store = Arc::clone(self);
        let descriptor = descriptor.clone();
        blocking(move || store.put(&descriptor, &bytes)).await
    }

    /// [`stage`](Self::stage) off the async runtime
    ///
    /// # Errors
    /// Same as [`stage`](Self::stage).
    pub async fn stage_async(
        self: &Arc<Self>,
        manifest: &ImageManifest,
        dest: &Path,
    ) -> Result<(), StoreError> {
        let store = Arc::clone(self);
        let manifest = manifest.clone();
        let dest = dest.to_path_buf();
        blocking(move || store.stage(&manifest, &dest)).await
    }
}

async fn blocking<T, F>(task: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| StoreError::Io(format!("store task failed: {e}")))?
}

fn verify(descriptor: &Descriptor, bytes: &[u8]) -> Result<(), StoreError> {
    let actual = Digest::of(bytes);
    if actual != descriptor.digest || bytes.len() as u64 != descriptor.size {
        return Err(StoreError::Integrity {
            expected: format!("{} ({} bytes)", descriptor.digest, descriptor.size),
            actual: format!("{actual} ({} bytes)", bytes.len()),
        });
    }
    Ok(())
}
