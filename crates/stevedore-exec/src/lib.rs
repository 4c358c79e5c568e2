//! stevedore-exec: Command execution abstraction
//!
//! Provides the executor trait used to talk to `kubectl` and to run the
//! configured deploy command, plus a local implementation.

pub mod error;
pub mod local;
pub mod result;
pub mod shell;
pub mod traits;

pub use error::ExecError;
pub use local::LocalExecutor;
pub use result::CommandResult;
pub use shell::{quote, render_template};
pub use traits::CommandExecutor;
