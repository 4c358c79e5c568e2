//! Progress estimation from noisy cluster observations
//!
//! The tracker is plain data: the coordinator feeds it probe results and
//! completion signals and reads snapshots back. Only completion signals can
//! drive a package to 100%; probes are capped just below.

use stevedore_api::{DeploymentSnapshot, Glyph, PackageState};

use crate::state::{ObservedState, PackageStatus};

/// Highest fraction a probe alone can report
pub const PROGRESS_CAP: f64 = 0.99;

/// Unit count that marks an upgrade as visibly restarted
pub const FRESH_START_UNITS: usize = 1;

/// Per-package status for one run
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    packages: Vec<PackageStatus>,
    deploying: Option<usize>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a package; returns its index
    pub fn register(&mut self, name: impl Into<String>, total_components: usize, reset: bool) -> usize {
        self.packages
            .push(PackageStatus::new(name, total_components, reset));
        self.packages.len() - 1
    }

    /// Start deploying the first package
    pub fn begin(&mut self) {
        if self.deploying.is_none() && !self.packages.is_empty() {
            self.set_deploying(0);
        }
    }

    fn set_deploying(&mut self, index: usize) {
        self.deploying = Some(index);
        if let Some(status) = self.packages.get_mut(index) {
            status.state = PackageState::Deploying;
            status.glyph = Glyph::Working;
        }
    }

    /// Index of the package currently deploying
    #[must_use]
    pub fn deploying(&self) -> Option<usize> {
        self.deploying
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    #[must_use]
    pub fn status(&self, index: usize) -> Option<&PackageStatus> {
        self.packages.get(index)
    }

    /// Packages worth probing this tick
    ///
    /// Everything up to the deploying index that has not reached a final
    /// state.
    #[must_use]
    pub fn eligible(&self) -> Vec<usize> {
        let Some(current) = self.deploying else {
            return Vec::new();
        };
        self.packages
            .iter()
            .enumerate()
            .take(current + 1)
            .filter(|(_, s)| !s.state.is_terminal())
            .map(|(i, _)| i)
            .collect()
    }

    /// Fold one probe result into a package's estimate
    ///
    /// `None` means the cluster had nothing to say this tick. Returns whether
    /// the published fraction changed.
    pub fn apply_probe(&mut self, index: usize, observed: Option<ObservedState>) -> bool {
        let Some(status) = self.packages.get_mut(index) else {
            return false;
        };
        let Some(observed) = observed else {
            return false;
        };
        if status.state.is_terminal() {
            return false;
        }

        status.observed_units = observed.deployed_units;

        if status.reset_in_progress {
            if observed.deployed_units != FRESH_START_UNITS {
                return false;
            }
            status.reset_in_progress = false;
        }

        if status.total_components == 0 {
            return false;
        }

        #[allow(clippy::cast_precision_loss)]
        let estimate = (observed.deployed_units as f64 / status.total_components as f64)
            .min(PROGRESS_CAP);
        if estimate > status.fraction {
            status.fraction = estimate;
            true
        } else {
            false
        }
    }

    /// Authoritative completion of `index`
    ///
    /// Deployment is sequential, so every earlier package is complete too.
    /// Returns the indexes that became complete, in order.
    pub fn mark_complete(&mut self, index: usize) -> Vec<usize> {
        if index >= self.packages.len() {
            return Vec::new();
        }

        let mut completed = Vec::new();
        for (i, status) in self.packages.iter_mut().enumerate().take(index + 1) {
            if status.state != PackageState::Complete {
                status.state = PackageState::Complete;
                status.fraction = 1.0;
                status.glyph = Glyph::Success;
                status.reset_in_progress = false;
                completed.push(i);
            }
        }

        if self.deploying.is_some_and(|current| current <= index) {
            let next = index + 1;
            if next < self.packages.len() {
                self.set_deploying(next);
            } else {
                self.deploying = None;
            }
        }

        completed
    }

    /// The whole bundle finished; complete whatever is left
    pub fn mark_all_complete(&mut self) -> Vec<usize> {
        match self.packages.len() {
            0 => Vec::new(),
            n => self.mark_complete(n - 1),
        }
    }

    /// Freeze the deploying package as failed; returns its index
    pub fn fail_current(&mut self) -> Option<usize> {
        let index = self.deploying.take()?;
        let status = self.packages.get_mut(index)?;
        status.state = PackageState::Failed;
        status.glyph = Glyph::Failure;
        Some(index)
    }

    /// Whether every package reached authoritative completion
    #[must_use]
    pub fn all_complete(&self) -> bool {
        self.packages
            .iter()
            .all(|s| s.state == PackageState::Complete)
    }

    /// Immutable view for the presentation layer
    #[must_use]
    pub fn snapshot(&self, bundle: &str, done: bool, tick: u64) -> DeploymentSnapshot {
        DeploymentSnapshot {
            bundle: bundle.to_string(),
            packages: self.packages.iter().map(PackageStatus::progress).collect(),
            done,
            tick,
        }
    }
}
