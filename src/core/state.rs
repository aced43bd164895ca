//! The contract every encryption state honours.

use super::guard::StateGuard;
use crate::error::EncryptionResult;

/// One guarded phase of the host-preparation workflow.
///
/// The driver may call [`should_enter`](Self::should_enter) any number of times, for
/// instance after the workflow resumes from a reboot, so it must never touch the host.
/// [`enter`](Self::enter) performs the phase's mutations and has to start by checking
/// `should_enter` itself, returning `Ok(())` untouched when that says no; that way
/// callers can invoke it unconditionally. Any `Err` from `enter` aborts the whole
/// workflow.
///
/// The provided methods delegate to the state's [`StateGuard`]. Concrete states that
/// override them should still consult the guard, the same way an override calls its
/// parent.
///
/// # Example
///
/// ```rust
/// use cryptprep::core::{EncryptionState, StateGuard};
/// use cryptprep::{EncryptionContext, EncryptionResult};
/// use std::sync::Arc;
///
/// struct ReloadUnits {
///     guard: StateGuard,
/// }
///
/// impl ReloadUnits {
///     fn new(context: Arc<EncryptionContext>) -> Self {
///         Self {
///             guard: StateGuard::new("ReloadUnits", context),
///         }
///     }
/// }
///
/// impl EncryptionState for ReloadUnits {
///     fn guard(&self) -> &StateGuard {
///         &self.guard
///     }
///
///     fn guard_mut(&mut self) -> &mut StateGuard {
///         &mut self.guard
///     }
///
///     fn enter(&mut self) -> EncryptionResult<()> {
///         if !self.should_enter() {
///             return Ok(());
///         }
///         let context = self.guard.context();
///         context
///             .executor()
///             .execute(&cryptprep::host::systemd::daemon_reload(), true)?;
///         Ok(())
///     }
/// }
/// ```
pub trait EncryptionState: Send {
    fn guard(&self) -> &StateGuard;

    fn guard_mut(&mut self) -> &mut StateGuard;

    /// Unique name; also the state's marker file name.
    fn name(&self) -> &str {
        self.guard().name()
    }

    /// Whether the driver should enter this state. No host mutation.
    fn should_enter(&self) -> bool {
        self.guard().should_enter()
    }

    /// Apply this state's host mutations.
    fn enter(&mut self) -> EncryptionResult<()>;

    /// Whether the state is complete and the workflow may advance.
    fn should_exit(&mut self) -> EncryptionResult<bool> {
        self.guard_mut().should_exit()
    }
}
