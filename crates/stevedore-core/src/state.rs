//! Per-package status owned by the coordinator

use stevedore_api::{Glyph, PackageProgress, PackageState};
use stevedore_pkg::Package;

/// What the cluster reports for one package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObservedState {
    /// Sub-units the cluster records as applied
    pub deployed_units: usize,
}

impl ObservedState {
    #[must_use]
    pub fn new(deployed_units: usize) -> Self {
        Self { deployed_units }
    }
}

/// Ordered packages deployed together in one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub name: String,
    pub packages: Vec<Package>,
}

impl Bundle {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            packages: Vec::new(),
        }
    }

    /// Package at position `index`
    #[must_use]
    pub fn package(&self, index: usize) -> Option<&Package> {
        self.packages.get(index)
    }
}

/// Mutable status of one package during a run
#[derive(Debug, Clone, PartialEq)]
pub struct PackageStatus {
    pub name: String,
    pub total_components: usize,
    pub state: PackageState,
    /// Last unit count seen from the prober
    pub observed_units: usize,
    /// An earlier deployment was found at registration; progress stays at
    /// zero until the upgrade visibly restarts
    pub reset_in_progress: bool,
    /// Last published completion estimate
    pub fraction: f64,
    pub glyph: Glyph,
}

impl PackageStatus {
    /// Fresh status for a package that has not started
    #[must_use]
    pub fn new(name: impl Into<String>, total_components: usize, reset_in_progress: bool) -> Self {
        Self {
            name: name.into(),
            total_components,
            state: PackageState::Pending,
            observed_units: 0,
            reset_in_progress,
            fraction: 0.0,
            glyph: Glyph::Waiting,
        }
    }

    /// Presentation view of this status
    #[must_use]
    pub fn progress(&self) -> PackageProgress {
        PackageProgress {
            name: self.name.clone(),
            state: self.state,
            fraction: self.fraction,
            glyph: self.glyph,
        }
    }
}
