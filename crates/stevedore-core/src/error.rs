//! Core error types for stevedore-core

use std::time::Duration;

use thiserror::Error;

/// Errors raised while setting up a run
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Package registered out of deployment order
    #[error("package {name} registered at position {expected} but has index {index}")]
    OutOfOrder {
        /// Package name
        name: String,
        /// Position the coordinator expected next
        expected: usize,
        /// Index carried by the package
        index: usize,
    },

    /// Package name registered twice
    #[error("package already registered: {0}")]
    DuplicatePackage(String),
}

/// Failure of the deploy engine; always fatal for the run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeployError {
    /// A package's deployment reported failure
    #[error("package {package} failed: {message}")]
    PackageFailed {
        /// Package name
        package: String,
        /// Reason reported by the engine
        message: String,
    },

    /// A package's deployment did not finish in time
    #[error("package {package} timed out after {timeout:?}")]
    Timeout {
        /// Package name
        package: String,
        /// Timeout that was exceeded
        timeout: Duration,
    },

    /// The engine could not run at all
    #[error("deploy engine error: {0}")]
    Engine(String),

    /// The engine panicked
    #[error("deploy engine panicked: {0}")]
    Panicked(String),
}

impl DeployError {
    /// Package the failure is attributed to, if any
    #[must_use]
    pub fn package(&self) -> Option<&str> {
        match self {
            DeployError::PackageFailed { package, .. } | DeployError::Timeout { package, .. } => {
                Some(package)
            }
            DeployError::Engine(_) | DeployError::Panicked(_) => None,
        }
    }
}

/// Errors returned by a [`Prober`](crate::prober::Prober)
///
/// The coordinator treats both variants the same way: skip this tick.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The cluster has no record of the package yet
    #[error("no deployment record for {0}")]
    NotFound(String),

    /// The lookup itself failed
    #[error("probe failed: {0}")]
    Failed(String),
}
