//! Deploy engine seam
//!
//! The engine deploys a whole bundle in one blocking call. It reports each
//! package it finishes through a [`DeployReporter`]; its return value is the
//! authoritative outcome for the bundle.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use stevedore_exec::{CommandExecutor, CommandResult, ExecError, render_template};
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

use crate::error::DeployError;
use crate::state::Bundle;

/// Lines of command output forwarded per package
pub const OUTPUT_TAIL_LINES: usize = 10;

/// Signal sent from the deploy task to the update loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploySignal {
    /// Package at this index finished
    PackageComplete(usize),
    /// The engine returned successfully
    BundleComplete,
    /// A line of deploy output for the package at `index`
    Output { index: usize, line: String },
}

/// Completion channel handed to the engine
#[derive(Debug, Clone)]
pub struct DeployReporter {
    tx: mpsc::UnboundedSender<DeploySignal>,
}

impl DeployReporter {
    /// Create a reporter and the receiving end of its channel
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DeploySignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Report that the package at `index` is deployed
    pub fn package_complete(&self, index: usize) {
        // receiver gone means the run already ended
        let _ = self.tx.send(DeploySignal::PackageComplete(index));
    }

    /// Forward a line of deploy output for the package at `index`
    pub fn output(&self, index: usize, line: impl Into<String>) {
        let _ = self.tx.send(DeploySignal::Output {
            index,
            line: line.into(),
        });
    }

    pub(crate) fn bundle_complete(&self) {
        let _ = self.tx.send(DeploySignal::BundleComplete);
    }
}

/// Black-box cluster deployment
#[async_trait]
pub trait DeployEngine: Send + Sync {
    /// Deploy every package of `bundle` in order; returns when all are
    /// deployed or on the first unrecoverable error
    async fn deploy(&self, bundle: &Bundle, reporter: &DeployReporter) -> Result<(), DeployError>;

    /// Remove local working files after a failure
    fn clear_paths(&self);
}

/// Engine running a shell command template once per package
pub struct CommandEngine {
    executor: Arc<dyn CommandExecutor>,
    template: String,
    timeout: Duration,
    staging_dir: Option<PathBuf>,
}

impl CommandEngine {
    /// Create an engine; `template` may use `{name}` and `{source}`
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        template: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            executor,
            template: template.into(),
            timeout,
            staging_dir: None,
        }
    }

    /// Directory removed by [`DeployEngine::clear_paths`]
    #[must_use]
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    fn command_for(&self, name: &str, source: &str) -> Result<String, DeployError> {
        render_template(&self.template, &[("name", name), ("source", source)])
            .map_err(|e| DeployError::Engine(e.to_string()))
    }
}

#[async_trait]
impl DeployEngine for CommandEngine {
    #[instrument(skip(self, bundle, reporter), fields(bundle = %bundle.name))]
    async fn deploy(&self, bundle: &Bundle, reporter: &DeployReporter) -> Result<(), DeployError> {
        for package in &bundle.packages {
            let source = package.source_location.to_string_lossy();
            let cmd = self.command_for(&package.name, &source)?;
            info!(package = %package.name, executor = self.executor.executor_type(), "deploying package");

            let result = self
                .executor
                .run_with_timeout(&cmd, self.timeout)
                .await
                .map_err(|e| match e {
                    ExecError::Timeout { timeout } => DeployError::Timeout {
                        package: package.name.clone(),
                        timeout,
                    },
                    other => DeployError::PackageFailed {
                        package: package.name.clone(),
                        message: other.to_string(),
                    },
                })?;
            forward_output(reporter, package.index, &result);

            if !result.success() {
                let message = result
                    .last_error_line()
                    .map_or_else(|| format!("exit status {}", result.status), ToString::to_string);
                error!(package = %package.name, status = result.status, "package deploy failed");
                return Err(DeployError::PackageFailed {
                    package: package.name.clone(),
                    message,
                });
            }

            info!(package = %package.name, duration = ?result.duration, "package deployed");
            reporter.package_complete(package.index);
        }
        Ok(())
    }

    fn clear_paths(&self) {
        let Some(dir) = &self.staging_dir else {
            return;
        };
        match std::fs::remove_dir_all(dir) {
            Ok(()) => info!(path = %dir.display(), "cleared staging directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %dir.display(), error = %e, "failed to clear staging directory"),
        }
    }
}

/// Send the last non-blank lines of stdout then stderr
fn forward_output(reporter: &DeployReporter, index: usize, result: &CommandResult) {
    let lines: Vec<&str> = result
        .stdout
        .lines()
        .chain(result.stderr.lines())
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect();
    let start = lines.len().saturating_sub(OUTPUT_TAIL_LINES);
    for line in &lines[start..] {
        reporter.output(index, *line);
    }
}
