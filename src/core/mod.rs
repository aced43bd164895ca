//! The generic state contract.
//!
//! - [`EncryptionState`]: guarded unit of work the driver walks through
//! - [`StateGuard`]: the shared "has this already completed" check
//! - [`StateHistory`]: immutable record of the driver's decisions

mod guard;
mod history;
mod state;

pub use guard::StateGuard;
pub use history::{StateHistory, StateOutcome, StateTransition};
pub use state::EncryptionState;
