//! Failures reading or writing the run checkpoint.

use thiserror::Error;

/// Why a checkpoint could not be persisted or restored.
///
/// Any of these aborts a run: a checkpoint that cannot be trusted means the
/// recorded attempt counts cannot be either.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("cannot encode checkpoint: {0}")]
    SerializationFailed(String),

    /// The file exists but is not a checkpoint in the configured format.
    #[error("cannot decode checkpoint: {0}")]
    DeserializationFailed(String),

    /// Written by a newer or older release with a different layout.
    #[error("checkpoint version {found} is not readable by this build (expects {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// The markers directory or checkpoint file could not be accessed.
    #[error("checkpoint file access failed: {0}")]
    Io(String),
}
