//! Deployment snapshot types

use serde::{Deserialize, Serialize};

/// Lifecycle of a single package within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageState {
    Pending,
    Deploying,
    Complete,
    Failed,
}

impl PackageState {
    /// Whether the package reached a final state
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, PackageState::Complete | PackageState::Failed)
    }
}

impl std::fmt::Display for PackageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PackageState::Pending => write!(f, "pending"),
            PackageState::Deploying => write!(f, "deploying"),
            PackageState::Complete => write!(f, "complete"),
            PackageState::Failed => write!(f, "failed"),
        }
    }
}

/// Lifecycle of a whole bundle run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    AwaitingConfirmation,
    Running,
    Finished,
    FatalAborted,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::AwaitingConfirmation => write!(f, "awaiting confirmation"),
            RunPhase::Running => write!(f, "running"),
            RunPhase::Finished => write!(f, "finished"),
            RunPhase::FatalAborted => write!(f, "aborted"),
        }
    }
}

/// Visual indicator for a package, independent of how it is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Glyph {
    /// Not started yet
    Waiting,
    /// Animated while the package deploys
    Working,
    /// Frozen after authoritative completion
    Success,
    /// Frozen after a fatal deploy error
    Failure,
}

/// Progress of a single package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageProgress {
    /// Package name
    pub name: String,
    /// Current state
    pub state: PackageState,
    /// Estimated completion in `[0, 1]`
    pub fraction: f64,
    /// Indicator to draw next to the package
    pub glyph: Glyph,
}

/// Immutable view of all package states at one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentSnapshot {
    /// Bundle name
    pub bundle: String,
    /// Packages in deployment order
    pub packages: Vec<PackageProgress>,
    /// Whether the run reached a terminal phase
    pub done: bool,
    /// Tick counter, usable for animations
    pub tick: u64,
}

impl DeploymentSnapshot {
    /// Look up a package by name
    #[must_use]
    pub fn package(&self, name: &str) -> Option<&PackageProgress> {
        self.packages.iter().find(|p| p.name == name)
    }

    /// Index of the package currently deploying, if any
    #[must_use]
    pub fn deploying_index(&self) -> Option<usize> {
        self.packages
            .iter()
            .position(|p| p.state == PackageState::Deploying)
    }

    /// Number of packages that completed
    #[must_use]
    pub fn completed(&self) -> usize {
        self.packages
            .iter()
            .filter(|p| p.state == PackageState::Complete)
            .count()
    }
}
