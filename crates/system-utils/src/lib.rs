//! Tracked execution of external commands and pipelines.

pub mod error;
pub mod output;
pub mod process;
pub mod registry;
pub mod runner;
mod stream;

pub use error::{CommandError, CommandFailure};
pub use output::{Captured, CommandResult};
pub use process::terminate_pid;
pub use registry::ProcessRegistry;
pub use runner::{CommandExecutor, CommandRunner, Payload, Redirect, RunOptions};
