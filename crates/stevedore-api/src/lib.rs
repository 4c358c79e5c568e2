//! stevedore-api: Presentation contract types
//!
//! Snapshot, event and operator-input types exchanged between the deployment
//! coordinator and whatever renders it.

pub mod events;
pub mod input;
pub mod snapshot;

pub use events::CoordinatorEvent;
pub use input::OperatorInput;
pub use snapshot::{DeploymentSnapshot, Glyph, PackageProgress, PackageState, RunPhase};
