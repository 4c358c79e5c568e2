//! Configuration loading and types

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use eyre::{WrapErr, bail};
use serde::{Deserialize, Serialize};
use stevedore_core::{ClusterConfig, CoordinatorConfig, DeployConfig};
use stevedore_oci::Platform;
use stevedore_pkg::PackageSpec;

/// Top-level configuration for a stevedore run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Bundle to deploy
    #[serde(default)]
    pub bundle: BundleConfig,
    /// Update loop timing
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    /// Where deployment records are read from
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// How packages are deployed
    #[serde(default)]
    pub deploy: DeployConfig,
    /// Package sourcing
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Logging
    #[serde(default)]
    pub log: LogConfig,
}

/// Bundle definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleConfig {
    /// Bundle name
    #[serde(default = "default_bundle_name")]
    pub name: String,
    /// Packages in deployment order
    #[serde(default, rename = "package")]
    pub packages: Vec<PackageSpec>,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            name: default_bundle_name(),
            packages: Vec::new(),
        }
    }
}

fn default_bundle_name() -> String {
    "bundle".to_string()
}

/// Package sourcing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Content store location; defaults to the user cache directory
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
    /// Architecture to select from image indexes; defaults to the host
    #[serde(default)]
    pub architecture: Option<String>,
    /// OS to select from image indexes
    #[serde(default = "default_os")]
    pub os: String,
    /// Talk plain HTTP to registries
    #[serde(default)]
    pub plain_http: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            cache_path: None,
            architecture: None,
            os: default_os(),
            plain_http: false,
        }
    }
}

fn default_os() -> String {
    Platform::MULTI_OS.to_string()
}

impl FetchConfig {
    /// Platform packages are resolved for
    #[must_use]
    pub fn platform(&self) -> Platform {
        let architecture = self
            .architecture
            .clone()
            .unwrap_or_else(|| stevedore_oci::types::host_architecture().to_string());
        Platform::new(architecture, self.os.clone())
    }

    /// Content store directory, with `~` expanded
    #[must_use]
    pub fn cache_path(&self) -> PathBuf {
        match &self.cache_path {
            Some(path) => expand_home(path),
            None => dirs::cache_dir()
                .map(|p| p.join("stevedore"))
                .unwrap_or_else(|| PathBuf::from(".stevedore/cache")),
        }
    }
}

pub(crate) fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read {}", path.display()))?;
        Self::parse(&content).wrap_err_with(|| format!("invalid config {}", path.display()))
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    /// Returns error if the text is not valid configuration
    pub fn parse(content: &str) -> eyre::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load from the first default path that exists
    ///
    /// # Errors
    /// Returns error if no file exists or the file found is invalid
    pub fn load_default() -> eyre::Result<Self> {
        if let Ok(path) = std::env::var("STEVEDORE_CONFIG") {
            return Self::load(&PathBuf::from(path));
        }

        let paths = [
            Some(PathBuf::from("stevedore.toml")),
            dirs::config_dir().map(|p| p.join("stevedore/stevedore.toml")),
        ];

        for path in paths.into_iter().flatten() {
            if path.exists() {
                return Self::load(&path);
            }
        }

        bail!("no stevedore.toml found; pass --config or set STEVEDORE_CONFIG")
    }

    /// Check the bundle can be deployed at all
    ///
    /// # Errors
    /// Returns error for an empty bundle, repeated names, or entries with an
    /// unusable source
    pub fn validate(&self) -> eyre::Result<()> {
        if self.bundle.packages.is_empty() {
            bail!("bundle {} has no packages", self.bundle.name);
        }

        let mut names = HashSet::new();
        for spec in &self.bundle.packages {
            if !names.insert(spec.name.as_str()) {
                bail!("package {} listed twice", spec.name);
            }
            spec.source()?;
        }
        Ok(())
    }
}
