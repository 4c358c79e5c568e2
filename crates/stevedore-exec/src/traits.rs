//! Command executor trait

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExecError;
use crate::result::CommandResult;

/// Runs shell command lines and captures their output
///
/// A non-zero exit status is not an error: callers inspect
/// [`CommandResult::success`]. Errors are reserved for failures to run at all.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run a command line to completion
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError>;

    /// Run a command line, giving up after `timeout`
    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError>;

    /// Short name for logs
    fn executor_type(&self) -> &'static str;
}
