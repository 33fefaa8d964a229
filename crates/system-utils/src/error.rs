use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::output::Captured;

/// A command that ran to completion with a non-zero exit status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    pub command: String,
    pub exit_code: i32,
    pub stdout: Captured,
    pub stderr: Captured,
}

impl CommandFailure {
    pub fn new(
        command: impl Into<String>,
        exit_code: i32,
        stdout: Captured,
        stderr: Captured,
    ) -> Self {
        Self {
            command: command.into(),
            exit_code,
            stdout,
            stderr,
        }
    }
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' failed: {} ({})",
            self.command,
            self.exit_code,
            self.stderr.to_text().trim_end()
        )
    }
}

impl std::error::Error for CommandFailure {}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    NonZeroExit(#[from] CommandFailure),

    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error while running '{command}': {source}")]
    Io {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("'{command}' timed out after {}ms", .timeout.as_millis())]
    TimedOut { command: String, timeout: Duration },
}

impl CommandError {
    /// Best available status: the exit code for a completed command, the
    /// raw OS error for spawn and I/O failures.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::NonZeroExit(failure) => Some(failure.exit_code),
            Self::Spawn { source, .. } | Self::Io { source, .. } => source.raw_os_error(),
            Self::InvalidArgument(_) | Self::TimedOut { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&CommandFailure> {
        match self {
            Self::NonZeroExit(failure) => Some(failure),
            _ => None,
        }
    }
}
