//! Type definitions for package sourcing

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use stevedore_oci::{Platform, Reference, Registry};

use crate::error::FetchError;
use crate::store::ContentStore;

/// One package entry of a bundle definition
///
/// Exactly one of `path` or `repository` must be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    /// Package name; also the key the prober looks up in the cluster
    pub name: String,
    /// Directory holding `manifest.json` and `blobs/`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Registry repository, optionally with an `oci://` prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    /// Tag or digest inside `repository`
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl PackageSpec {
    /// Package read from a local directory
    pub fn local(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: Some(path.into()),
            repository: None,
            reference: None,
        }
    }

    /// Package pulled from a registry
    pub fn remote(
        name: impl Into<String>,
        repository: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            path: None,
            repository: Some(repository.into()),
            reference: Some(reference.into()),
        }
    }

    /// Where the package comes from
    ///
    /// A repository without `ref` must carry its tag or digest inline.
    ///
    /// # Errors
    /// Returns [`FetchError::InvalidReference`] when both or neither source is
    /// given, or the registry coordinate does not parse.
    pub fn source(&self) -> Result<PackageSource, FetchError> {
        match (&self.path, &self.repository) {
            (Some(path), None) => Ok(PackageSource::Local(path.clone())),
            (None, Some(repository)) => {
                let reference = match &self.reference {
                    Some(reference) => Reference::new(repository, reference)?,
                    None => Reference::parse(repository)?,
                };
                Ok(PackageSource::Remote(reference))
            }
            (Some(_), Some(_)) => Err(FetchError::InvalidReference(format!(
                "{}: set either path or repository, not both",
                self.name
            ))),
            (None, None) => Err(FetchError::InvalidReference(format!(
                "{}: no path or repository",
                self.name
            ))),
        }
    }
}

/// Resolved origin of a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSource {
    Local(PathBuf),
    Remote(Reference),
}

impl std::fmt::Display for PackageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PackageSource::Local(path) => write!(f, "{}", path.display()),
            PackageSource::Remote(reference) => write!(f, "oci://{reference}"),
        }
    }
}

/// Package definition carried in the manifest config blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub components: Vec<ComponentMetadata>,
}

impl PackageMetadata {
    /// Parse a config blob
    ///
    /// # Errors
    /// Returns [`FetchError::InvalidManifest`] for malformed JSON.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, FetchError> {
        serde_json::from_slice(bytes)
            .map_err(|e| FetchError::InvalidManifest(format!("package config: {e}")))
    }

    /// Number of deployable units; the denominator of progress
    #[must_use]
    pub fn total_components(&self) -> usize {
        self.components.len()
    }
}

/// One deployable unit of a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentMetadata {
    pub name: String,
    #[serde(default)]
    pub required: bool,
}

/// A fetched, staged package ready for deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Package name
    pub name: String,
    /// Staged package layout the deploy engine reads
    pub source_location: PathBuf,
    /// Units of work, known only after fetching
    pub total_components: usize,
    /// Position in deployment order
    pub index: usize,
}

/// Shared context for every fetch of one bundle run
#[derive(Clone)]
pub struct FetcherConfig {
    /// Content store shared across the run
    pub store: Arc<ContentStore>,
    /// Registry used by remote packages
    pub registry: Arc<dyn Registry>,
    /// Platform an image index is narrowed to
    pub platform: Platform,
}

impl std::fmt::Debug for FetcherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetcherConfig")
            .field("store", &self.store.root())
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}
