//! Build errors for the state machine builder.

use thiserror::Error;

/// Errors that can occur when assembling a state machine.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("No states defined. Add at least one state")]
    NoStates,

    #[error("State '{0}' was added more than once; state names must be unique")]
    DuplicateState(String),
}
