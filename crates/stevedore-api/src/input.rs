//! Operator input sent back to the coordinator

use serde::{Deserialize, Serialize};

/// Operator decision forwarded by the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorInput {
    /// Deploy the bundle
    Confirm,
    /// Leave the bundle undeployed
    Decline,
    /// Stop immediately
    Quit,
}
