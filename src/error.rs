//! Error types shared by every state and the driver.
//!
//! Anything returned as `Err` from a state is fatal: the driver stops and hands the
//! error to whoever owns the workflow run. Best-effort steps never produce one.

use crate::checkpoint::CheckpointError;
use crate::machine::BuildError;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Which early-boot artifact a [`EncryptionError::MissingScript`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    Hook,
    Boot,
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptKind::Hook => f.write_str("Hook"),
            ScriptKind::Boot => f.write_str("Boot"),
        }
    }
}

/// Errors that abort an encryption workflow run.
#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("encryption state machine for {supported} called for distro {family} {version}")]
    UnsupportedDistro {
        supported: String,
        family: String,
        version: String,
    },

    #[error("{kind} script not found at path: {}", path.display())]
    MissingScript { kind: ScriptKind, path: PathBuf },

    #[error("command `{command}` exited with status {status}: {output}")]
    CommandFailed {
        command: String,
        status: i32,
        output: String,
    },

    #[error("command `{command}` timed out after {timeout:?}")]
    CommandTimedOut { command: String, timeout: Duration },

    #[error("{}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("state '{state}' did not complete after {attempts} attempt(s)")]
    StateIncomplete { state: String, attempts: usize },

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Build(#[from] BuildError),
}

impl EncryptionError {
    /// Attach the offending path to an I/O failure.
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EncryptionError::File {
            path: path.into(),
            source,
        }
    }
}

pub type EncryptionResult<T> = Result<T, EncryptionError>;
