//! Cryptprep: guarded, resumable preparation of a Linux host for OS-volume encryption.
//!
//! Preparation is a sequence of states driven in order by an
//! [`EncryptionStateMachine`]. Each state is guarded by a marker file so that a run
//! interrupted by a reboot can start again from the top and skip whatever already
//! completed. The only state shipped here is [`PrereqState`], which checks the distro,
//! installs extra packages, patches the guest agent unit, stages the initramfs
//! scripts, and quiesces snap units.
//!
//! # Core Concepts
//!
//! - **State**: one phase implementing [`EncryptionState`]
//! - **Guard**: the marker bookkeeping shared by every state ([`StateGuard`])
//! - **Context**: config plus the host seams a state may use ([`EncryptionContext`])
//! - **History**: what each run visited, persisted as a [`checkpoint::Checkpoint`]
//!
//! # Example
//!
//! ```rust
//! use cryptprep::testing::TestHost;
//! use cryptprep::EncryptionStateMachine;
//!
//! let host = TestHost::new();
//! host.seed_prerequisites("[Service]\nType=simple\n");
//!
//! let mut machine = EncryptionStateMachine::standard(host.context()).unwrap();
//! let report = machine.run().unwrap();
//!
//! assert_eq!(report.completed, vec!["PrereqState"]);
//! ```

pub mod checkpoint;
pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod host;
pub mod machine;
pub mod states;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use config::EncryptionConfig;
pub use context::EncryptionContext;
pub use core::{EncryptionState, StateGuard, StateHistory, StateOutcome, StateTransition};
pub use error::{EncryptionError, EncryptionResult, ScriptKind};
pub use machine::{BuildError, EncryptionStateMachine, RunReport, StateMachineBuilder};
pub use states::PrereqState;
