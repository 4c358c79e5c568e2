//! Deployed-state probing
//!
//! A probe asks the cluster how many units of a package it has recorded as
//! applied. Results are advisory and may lag or briefly go backwards.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use stevedore_exec::{CommandExecutor, quote};
use tracing::{instrument, trace};

use crate::config::ClusterConfig;
use crate::error::ProbeError;
use crate::state::ObservedState;

/// Read-only lookup of a package's deployed state
#[async_trait]
pub trait Prober: Send + Sync {
    /// Observed state of `package`, or [`ProbeError::NotFound`]
    async fn probe(&self, package: &str) -> Result<ObservedState, ProbeError>;
}

/// Prober reading the package's deployment record secret through kubectl
pub struct KubectlProber {
    executor: Arc<dyn CommandExecutor>,
    config: ClusterConfig,
    timeout: Duration,
}

impl KubectlProber {
    /// Create a prober; `timeout` bounds each kubectl call
    pub fn new(executor: Arc<dyn CommandExecutor>, config: ClusterConfig, timeout: Duration) -> Self {
        Self {
            executor,
            config,
            timeout,
        }
    }

    /// Name of the secret holding `package`'s record
    #[must_use]
    pub fn secret_name(&self, package: &str) -> String {
        format!("{}{package}", self.config.secret_prefix)
    }

    fn command(&self, package: &str) -> String {
        format!(
            "{} get secret {} -n {} -o json",
            self.config.kubectl,
            quote(&self.secret_name(package)),
            quote(&self.config.namespace)
        )
    }
}

#[async_trait]
impl Prober for KubectlProber {
    #[instrument(skip(self), level = "trace")]
    async fn probe(&self, package: &str) -> Result<ObservedState, ProbeError> {
        let result = self
            .executor
            .run_with_timeout(&self.command(package), self.timeout)
            .await
            .map_err(|e| ProbeError::Failed(e.to_string()))?;

        if !result.success() {
            if result.stderr.contains("NotFound") || result.stderr.contains("not found") {
                return Err(ProbeError::NotFound(self.secret_name(package)));
            }
            let reason = result.last_error_line().unwrap_or("kubectl failed");
            return Err(ProbeError::Failed(reason.to_string()));
        }

        let observed = parse_secret(&result.stdout)?;
        trace!(units = observed.deployed_units, "probed");
        Ok(observed)
    }
}

#[derive(Deserialize)]
struct Secret {
    #[serde(default)]
    data: HashMap<String, String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeployedPackage {
    #[serde(default)]
    deployed_components: Vec<serde_json::Value>,
}

/// Count deployed components in a `kubectl get secret -o json` document
fn parse_secret(json: &str) -> Result<ObservedState, ProbeError> {
    let secret: Secret =
        serde_json::from_str(json).map_err(|e| ProbeError::Failed(format!("secret: {e}")))?;
    let encoded = secret
        .data
        .get("data")
        .ok_or_else(|| ProbeError::Failed("secret has no data field".to_string()))?;
    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|e| ProbeError::Failed(format!("record encoding: {e}")))?;
    let record: DeployedPackage = serde_json::from_slice(&decoded)
        .map_err(|e| ProbeError::Failed(format!("record: {e}")))?;

    Ok(ObservedState::new(record.deployed_components.len()))
}
