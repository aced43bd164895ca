//! Builder for assembling the ordered state list.

use super::error::BuildError;
use super::EncryptionStateMachine;
use crate::context::EncryptionContext;
use crate::core::EncryptionState;
use std::collections::HashSet;
use std::sync::Arc;

/// Fluent builder for [`EncryptionStateMachine`].
pub struct StateMachineBuilder {
    context: Arc<EncryptionContext>,
    states: Vec<Box<dyn EncryptionState>>,
}

impl StateMachineBuilder {
    pub fn new(context: Arc<EncryptionContext>) -> Self {
        Self {
            context,
            states: Vec::new(),
        }
    }

    /// Append a state; states run in the order they are added.
    pub fn state(mut self, state: Box<dyn EncryptionState>) -> Self {
        self.states.push(state);
        self
    }

    /// Append several states at once.
    pub fn states(mut self, states: Vec<Box<dyn EncryptionState>>) -> Self {
        self.states.extend(states);
        self
    }

    /// Build the machine. Names double as marker file names, so they must be unique.
    pub fn build(self) -> Result<EncryptionStateMachine, BuildError> {
        if self.states.is_empty() {
            return Err(BuildError::NoStates);
        }

        let mut seen = HashSet::new();
        for state in &self.states {
            if !seen.insert(state.name().to_string()) {
                return Err(BuildError::DuplicateState(state.name().to_string()));
            }
        }

        Ok(EncryptionStateMachine::new(self.context, self.states))
    }
}
