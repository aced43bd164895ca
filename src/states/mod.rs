//! Concrete encryption states.

mod prereq;

pub use prereq::{insert_kill_mode, PrereqState, PREREQ_STATE};
