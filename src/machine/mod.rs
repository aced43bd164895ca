//! Driver that walks the ordered list of encryption states.
//!
//! The driver knows nothing about individual states. For each one it asks
//! `should_enter`, calls `enter`, then asks `should_exit` whether to advance or enter
//! again. The first error from any state ends the run and is returned as-is; nothing
//! already applied to the host is rolled back.

mod builder;
mod error;

pub use builder::StateMachineBuilder;
pub use error::BuildError;

use crate::checkpoint::{Checkpoint, CheckpointStore, RunMetadata};
use crate::context::EncryptionContext;
use crate::core::{EncryptionState, StateHistory, StateOutcome, StateTransition};
use crate::error::{EncryptionError, EncryptionResult};
use crate::states::PrereqState;
use chrono::Utc;
use std::sync::Arc;

/// Summary of one `run`.
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    pub completed: Vec<String>,
    pub skipped: Vec<String>,
    pub history: StateHistory,
    /// Id of the checkpoint an earlier run left behind, if any.
    pub resumed_from: Option<String>,
}

pub struct EncryptionStateMachine {
    context: Arc<EncryptionContext>,
    states: Vec<Box<dyn EncryptionState>>,
    history: StateHistory,
    metadata: RunMetadata,
    checkpoints: CheckpointStore,
}

impl EncryptionStateMachine {
    pub(crate) fn new(
        context: Arc<EncryptionContext>,
        states: Vec<Box<dyn EncryptionState>>,
    ) -> Self {
        let config = context.config();
        let checkpoints = CheckpointStore::new(
            context.shared_fs(),
            config.markers_dir.clone(),
            config.checkpoint_format,
        );
        Self {
            context,
            states,
            history: StateHistory::new(),
            metadata: RunMetadata::default(),
            checkpoints,
        }
    }

    /// The prereq stage of the OS-volume encryption workflow.
    pub fn standard(context: Arc<EncryptionContext>) -> Result<Self, BuildError> {
        StateMachineBuilder::new(Arc::clone(&context))
            .state(Box::new(PrereqState::new(context)))
            .build()
    }

    pub fn state_names(&self) -> Vec<&str> {
        self.states.iter().map(|state| state.name()).collect()
    }

    pub fn history(&self) -> &StateHistory {
        &self.history
    }

    pub fn context(&self) -> &EncryptionContext {
        &self.context
    }

    /// Drive every state in order until all have completed or one fails.
    pub fn run(&mut self) -> EncryptionResult<RunReport> {
        let resumed_from = self.resume()?;
        let max_attempts = self.context.config().max_enter_attempts.max(1);

        for state in self.states.iter_mut() {
            let name = state.name().to_string();
            self.context.log(&format!("Visiting state {name}"));

            if !state.should_enter() {
                self.context.log(&format!("Skipping state {name}"));
                self.history = self.history.record(visit(&name, StateOutcome::Skipped, 0));
                continue;
            }

            let mut attempt = 0;
            loop {
                attempt += 1;
                self.context.log(&format!("Entering state {name} (attempt {attempt})"));
                *self.metadata.total_attempts.entry(name.clone()).or_default() += 1;

                if let Err(err) = state.enter() {
                    self.context.log(&format!("State {name} failed: {err}"));
                    return Err(err);
                }

                if state.should_exit()? {
                    self.history = self
                        .history
                        .record(visit(&name, StateOutcome::Completed, attempt));
                    save_checkpoint(&self.checkpoints, &self.history, &mut self.metadata)?;
                    self.context.log(&format!("State {name} completed"));
                    break;
                }

                self.history = self
                    .history
                    .record(visit(&name, StateOutcome::Incomplete, attempt));
                if attempt >= max_attempts {
                    return Err(EncryptionError::StateIncomplete {
                        state: name,
                        attempts: attempt,
                    });
                }
            }
        }

        Ok(RunReport {
            completed: owned(self.history.completed()),
            skipped: owned(self.history.skipped()),
            history: self.history.clone(),
            resumed_from,
        })
    }

    /// Pick up metadata from an earlier run's checkpoint.
    fn resume(&mut self) -> EncryptionResult<Option<String>> {
        let Some(previous) = self.checkpoints.load()? else {
            return Ok(None);
        };

        self.context.log(&format!(
            "Found checkpoint {} from {}; completed states: [{}]",
            previous.id,
            previous.timestamp.to_rfc3339(),
            previous.history.completed().join(", ")
        ));
        self.metadata = previous.metadata;
        Ok(Some(previous.id))
    }
}

fn visit(state: &str, outcome: StateOutcome, attempt: usize) -> StateTransition {
    StateTransition {
        state: state.to_string(),
        outcome,
        timestamp: Utc::now(),
        attempt,
    }
}

fn save_checkpoint(
    store: &CheckpointStore,
    history: &StateHistory,
    metadata: &mut RunMetadata,
) -> EncryptionResult<()> {
    metadata.updated_at = Utc::now();
    store.save(&Checkpoint::new(history.clone(), metadata.clone()))?;
    Ok(())
}

fn owned(names: Vec<&str>) -> Vec<String> {
    names.into_iter().map(str::to_string).collect()
}
