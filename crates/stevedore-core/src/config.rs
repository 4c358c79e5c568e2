//! Configuration types for the coordinator and its adapters

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing of the update loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Tick interval in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Pause after the last frame before the run ends
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
    /// Upper bound for one cluster probe
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

fn default_tick_ms() -> u64 {
    5
}

fn default_grace_ms() -> u64 {
    1000
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            grace_ms: default_grace_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl CoordinatorConfig {
    /// Tick interval; never zero
    #[must_use]
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    #[must_use]
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms.max(1))
    }
}

/// Where deployment records live in the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// kubectl binary
    #[serde(default = "default_kubectl")]
    pub kubectl: String,
    /// Namespace holding the records
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Record secret name is this prefix plus the package name
    #[serde(default = "default_secret_prefix")]
    pub secret_prefix: String,
    /// Exported as `KUBECONFIG` to kubectl and the deploy command
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,
}

fn default_kubectl() -> String {
    "kubectl".to_string()
}

fn default_namespace() -> String {
    "zarf".to_string()
}

fn default_secret_prefix() -> String {
    "zarf-package-".to_string()
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            kubectl: default_kubectl(),
            namespace: default_namespace(),
            secret_prefix: default_secret_prefix(),
            kubeconfig: None,
        }
    }
}

/// How each package is deployed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Command template; `{name}` and `{source}` are substituted, quoted
    #[serde(default = "default_command")]
    pub command: String,
    /// Per-package timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_command() -> String {
    "zarf package deploy {source} --confirm".to_string()
}

fn default_timeout_secs() -> u64 {
    1800
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl DeployConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
