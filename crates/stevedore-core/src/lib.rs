//! stevedore-core: Deployment coordination
//!
//! Implements the `Coordinator` that drives a bundle deployment, the progress
//! tracker that turns cluster observations into completion estimates, and
//! the engine and prober seams with their command-line adapters.

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod prober;
pub mod progress;
pub mod state;

pub use config::{ClusterConfig, CoordinatorConfig, DeployConfig};
pub use coordinator::{Coordinator, CoordinatorArgs, RunOutcome};
pub use engine::{CommandEngine, DeployEngine, DeployReporter, DeploySignal};
pub use error::{CoreError, DeployError, ProbeError};
pub use prober::{KubectlProber, Prober};
pub use progress::{FRESH_START_UNITS, PROGRESS_CAP, ProgressTracker};
pub use state::{Bundle, ObservedState, PackageStatus};
