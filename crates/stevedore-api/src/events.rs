//! Coordinator event types

use serde::{Deserialize, Serialize};

use crate::snapshot::DeploymentSnapshot;

/// Events published by the coordinator to the presentation layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CoordinatorEvent {
    /// The run left `AwaitingConfirmation`
    Started {
        bundle: String,
        packages: usize,
    },
    /// Regular per-tick snapshot
    Snapshot { snapshot: DeploymentSnapshot },
    /// A line of deploy output for a package
    PackageOutput { package: String, line: String },
    /// A package reached authoritative completion
    PackageCompleted {
        package: String,
        index: usize,
    },
    /// Every package completed; carries the summary snapshot
    Finished { snapshot: DeploymentSnapshot },
    /// The deploy engine failed; carries the final frame
    FatalAborted {
        snapshot: DeploymentSnapshot,
        package: Option<String>,
        error: String,
    },
    /// Operator declined or quit
    Cancelled { reason: String },
}

impl CoordinatorEvent {
    /// Whether no further events follow this one
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CoordinatorEvent::Finished { .. }
                | CoordinatorEvent::FatalAborted { .. }
                | CoordinatorEvent::Cancelled { .. }
        )
    }

    /// Snapshot carried by the event, if any
    #[must_use]
    pub fn snapshot(&self) -> Option<&DeploymentSnapshot> {
        match self {
            CoordinatorEvent::Snapshot { snapshot }
            | CoordinatorEvent::Finished { snapshot }
            | CoordinatorEvent::FatalAborted { snapshot, .. } => Some(snapshot),
            _ => None,
        }
    }
}
