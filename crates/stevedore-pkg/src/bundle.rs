//! Bundle resolution
//!
//! Turns the bundle's package entries into staged, deployable [`Package`]s,
//! one at a time in bundle order.

use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use crate::error::FetchError;
use crate::local::LocalFetcher;
use crate::remote::RemoteFetcher;
use crate::traits::Fetcher;
use crate::types::{FetcherConfig, Package, PackageSource, PackageSpec};

/// Build the fetcher matching the shape of `spec`
///
/// The variant is picked here, once; a `path` means local and a
/// `repository` means remote.
///
/// # Errors
/// Returns an error if the bundle entry is malformed or the manifest cannot be
/// resolved.
pub async fn new_fetcher(
    spec: &PackageSpec,
    config: &FetcherConfig,
) -> Result<Box<dyn Fetcher>, FetchError> {
    match spec.source()? {
        PackageSource::Local(path) => Ok(Box::new(LocalFetcher::open(path, config.store.clone())?)),
        PackageSource::Remote(reference) => {
            Ok(Box::new(RemoteFetcher::connect(reference, config).await?))
        }
    }
}

/// Fetches and stages every package of a bundle
#[derive(Debug)]
pub struct BundleResolver {
    config: FetcherConfig,
    staging_dir: PathBuf,
}

impl BundleResolver {
    /// Create a resolver staging packages below `staging_dir`
    pub fn new(config: FetcherConfig, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            staging_dir: staging_dir.into(),
        }
    }

    /// Directory packages are staged into
    #[must_use]
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Fetch one package and stage it for deployment
    ///
    /// # Errors
    /// Returns the first fetch, verification or staging failure.
    #[instrument(skip(self, spec), fields(package = %spec.name))]
    pub async fn resolve_package(
        &self,
        index: usize,
        spec: &PackageSpec,
    ) -> Result<Package, FetchError> {
        validate_name(&spec.name)?;

        let fetcher = new_fetcher(spec, &self.config).await?;
        fetcher.fetch().await?;
        let metadata = fetcher.metadata().await?;
        if metadata.name != spec.name {
            warn!(
                declared = %metadata.name,
                "package definition name differs from bundle entry"
            );
        }

        let dest = self.staging_dir.join(format!("{index:02}-{}", spec.name));
        self.config.store.stage_async(fetcher.manifest(), &dest).await?;

        let package = Package {
            name: spec.name.clone(),
            source_location: dest,
            total_components: metadata.total_components(),
            index,
        };
        info!(
            kind = fetcher.kind(),
            components = package.total_components,
            "package resolved"
        );
        Ok(package)
    }

    /// Resolve every package, sequentially, in bundle order
    ///
    /// # Errors
    /// Stops at the first package that fails.
    pub async fn resolve(&self, specs: &[PackageSpec]) -> Result<Vec<Package>, FetchError> {
        let mut packages = Vec::with_capacity(specs.len());
        for (index, spec) in specs.iter().enumerate() {
            packages.push(self.resolve_package(index, spec).await?);
        }
        Ok(packages)
    }
}

/// Package names become directory names and cluster lookups
fn validate_name(name: &str) -> Result<(), FetchError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.chars().any(char::is_whitespace);
    if valid {
        Ok(())
    } else {
        Err(FetchError::InvalidReference(format!(
            "invalid package name `{name}`"
        )))
    }
}
