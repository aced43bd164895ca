//! Record of what the driver did with each state during a run.
//!
//! History is immutable: [`StateHistory::record`] returns a new history with the
//! transition appended. It is serialised into checkpoints, so a resumed run can
//! report what an earlier boot already did.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What happened when the driver visited a state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateOutcome {
    /// `should_enter` said no; `enter` was not called.
    Skipped,
    /// `enter` ran and `should_exit` allowed the workflow to advance.
    Completed,
    /// `enter` ran but `should_exit` held the workflow on this state.
    Incomplete,
}

/// A single visit of one state.
///
/// # Example
///
/// ```rust
/// use cryptprep::core::{StateOutcome, StateTransition};
/// use chrono::Utc;
///
/// let transition = StateTransition {
///     state: "PrereqState".to_string(),
///     outcome: StateOutcome::Completed,
///     timestamp: Utc::now(),
///     attempt: 1,
/// };
/// assert!(transition.outcome == StateOutcome::Completed);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub state: String,
    pub outcome: StateOutcome,
    pub timestamp: DateTime<Utc>,
    /// 1-based count of `enter` calls for this state; 0 when skipped.
    pub attempt: usize,
}

/// Ordered history of state visits.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateHistory {
    transitions: Vec<StateTransition>,
}

impl StateHistory {
    pub fn new() -> Self {
        Self {
            transitions: Vec::new(),
        }
    }

    /// Return a new history with `transition` appended; `self` is unchanged.
    ///
    /// ```rust
    /// use cryptprep::core::{StateHistory, StateOutcome, StateTransition};
    /// use chrono::Utc;
    ///
    /// let history = StateHistory::new();
    /// let next = history.record(StateTransition {
    ///     state: "PrereqState".into(),
    ///     outcome: StateOutcome::Skipped,
    ///     timestamp: Utc::now(),
    ///     attempt: 0,
    /// });
    /// assert_eq!(next.transitions().len(), 1);
    /// assert_eq!(history.transitions().len(), 0);
    /// ```
    pub fn record(&self, transition: StateTransition) -> Self {
        let mut transitions = self.transitions.clone();
        transitions.push(transition);
        Self { transitions }
    }

    /// Names of the states that completed, in order.
    pub fn completed(&self) -> Vec<&str> {
        self.with_outcome(StateOutcome::Completed)
    }

    pub fn skipped(&self) -> Vec<&str> {
        self.with_outcome(StateOutcome::Skipped)
    }

    fn with_outcome(&self, outcome: StateOutcome) -> Vec<&str> {
        self.transitions
            .iter()
            .filter(|t| t.outcome == outcome)
            .map(|t| t.state.as_str())
            .collect()
    }

    /// Number of `enter` calls recorded for `state`.
    pub fn attempts(&self, state: &str) -> usize {
        self.transitions
            .iter()
            .filter(|t| t.state == state && t.outcome != StateOutcome::Skipped)
            .count()
    }

    /// Time between the first and last recorded visit.
    pub fn duration(&self) -> Option<Duration> {
        if let (Some(first), Some(last)) = (self.transitions.first(), self.transitions.last()) {
            let duration = last.timestamp.signed_duration_since(first.timestamp);
            duration.to_std().ok()
        } else {
            None
        }
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visit(state: &str, outcome: StateOutcome, attempt: usize) -> StateTransition {
        StateTransition {
            state: state.to_string(),
            outcome,
            timestamp: Utc::now(),
            attempt,
        }
    }

    #[test]
    fn new_history_is_empty() {
        let history = StateHistory::new();
        assert!(history.is_empty());
        assert!(history.completed().is_empty());
        assert!(history.duration().is_none());
    }

    #[test]
    fn record_is_immutable() {
        let history = StateHistory::new();
        let new_history = history.record(visit("PrereqState", StateOutcome::Completed, 1));

        assert_eq!(history.transitions().len(), 0);
        assert_eq!(new_history.transitions().len(), 1);
    }

    #[test]
    fn outcomes_are_partitioned_in_order() {
        let history = StateHistory::new()
            .record(visit("PrereqState", StateOutcome::Skipped, 0))
            .record(visit("StripdownState", StateOutcome::Incomplete, 1))
            .record(visit("StripdownState", StateOutcome::Completed, 2))
            .record(visit("UnmountOldrootState", StateOutcome::Completed, 1));

        assert_eq!(history.skipped(), vec!["PrereqState"]);
        assert_eq!(
            history.completed(),
            vec!["StripdownState", "UnmountOldrootState"]
        );
        assert_eq!(history.attempts("StripdownState"), 2);
        assert_eq!(history.attempts("PrereqState"), 0);
    }

    #[test]
    fn duration_calculates_elapsed_time() {
        let history = StateHistory::new().record(visit("A", StateOutcome::Completed, 1));
        std::thread::sleep(std::time::Duration::from_millis(10));
        let history = history.record(visit("B", StateOutcome::Completed, 1));

        let duration = history.duration().unwrap();
        assert!(duration >= std::time::Duration::from_millis(10));
    }

    #[test]
    fn single_transition_has_duration_zero() {
        let history = StateHistory::new().record(visit("A", StateOutcome::Completed, 1));
        assert_eq!(history.duration(), Some(std::time::Duration::from_secs(0)));
    }

    #[test]
    fn history_serializes_correctly() {
        let history = StateHistory::new().record(visit("PrereqState", StateOutcome::Completed, 1));

        let json = serde_json::to_string(&history).unwrap();
        let deserialized: StateHistory = serde_json::from_str(&json).unwrap();

        assert_eq!(history, deserialized);
    }
}
