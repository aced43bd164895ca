//! Prepare a host for OS-volume encryption.
//!
//! In order: refuse unsupported distros, install extra packages, stop the guest agent
//! from killing its children on restart, stage the initramfs hook and boot scripts
//! that unlock the disk before root is mounted, and release snap units and mounts
//! that would hold file handles during disk operations.

use crate::context::EncryptionContext;
use crate::core::{EncryptionState, StateGuard};
use crate::error::{EncryptionError, EncryptionResult, ScriptKind};
use crate::host::{systemd, HostCommand};
use std::path::Path;
use std::sync::Arc;

pub const PREREQ_STATE: &str = "PrereqState";

const SERVICE_HEADER: &str = "[Service]\n";
const SERVICE_HEADER_WITH_KILL_MODE: &str = "[Service]\nKillMode=process\n";

pub struct PrereqState {
    guard: StateGuard,
}

impl PrereqState {
    pub fn new(context: Arc<EncryptionContext>) -> Self {
        Self {
            guard: StateGuard::new(PREREQ_STATE, context),
        }
    }

    fn context(&self) -> &EncryptionContext {
        self.guard.context()
    }

    fn check_distro(&self) -> EncryptionResult<()> {
        let context = self.context();
        let supported = &context.config().supported_distro;
        let distro = context.distro_patcher().distro_info();
        context.log(&format!("Distro info: {distro}"));

        if distro.family.eq_ignore_ascii_case(&supported.family)
            && supported.versions.iter().any(|v| *v == distro.version)
        {
            context.log(&format!(
                "Enabling OS volume encryption on {} {}",
                distro.family, distro.version
            ));
            return Ok(());
        }

        Err(EncryptionError::UnsupportedDistro {
            supported: supported.to_string(),
            family: distro.family,
            version: distro.version,
        })
    }

    /// Add `KillMode=process` to the agent's unit so restarting the agent does not
    /// kill the encryption process it spawned.
    fn patch_agent_service(&self) -> EncryptionResult<()> {
        let context = self.context();
        let fs = context.fs();
        let unit = context.config().service_unit_path();
        context.log(&format!("Patching {}", unit.display()));

        let contents = fs
            .read_to_string(&unit)
            .map_err(|err| EncryptionError::file(&unit, err))?;
        let patched = insert_kill_mode(&contents);
        fs.write(&unit, patched.as_bytes())
            .map_err(|err| EncryptionError::file(&unit, err))?;

        context.log(&format!("{} patched successfully", unit.display()));
        Ok(())
    }

    fn install_boot_scripts(&self) -> EncryptionResult<()> {
        let config = self.context().config();
        let scripts_dir = config.encrypt_scripts_dir()?;

        self.install_script(
            ScriptKind::Hook,
            &scripts_dir.join(&config.hook_script),
            &config.hook_script_dest(),
        )?;
        self.install_script(
            ScriptKind::Boot,
            &scripts_dir.join(&config.boot_script),
            &config.boot_script_dest(),
        )
    }

    fn install_script(&self, kind: ScriptKind, source: &Path, dest: &Path) -> EncryptionResult<()> {
        let context = self.context();
        let fs = context.fs();

        if !fs.exists(source) {
            let err = EncryptionError::MissingScript {
                kind,
                path: source.to_path_buf(),
            };
            context.log(&err.to_string());
            return Err(err);
        }
        context.log(&format!("{kind} script found at path: {}", source.display()));

        fs.copy(source, dest).map_err(|err| EncryptionError::file(dest, err))?;
        fs.set_executable(dest)
            .map_err(|err| EncryptionError::file(dest, err))?;
        context.log(&format!("{kind} script installed at {}", dest.display()));
        Ok(())
    }

    /// Stop snap units and unmount snap mountpoints. Nothing in here is fatal: units
    /// may already be stopped and mountpoints already gone.
    fn quiesce_snaps(&self) {
        let context = self.context();
        let executor = context.executor();
        let logger = context.logger();
        let config = context.config();
        context.log("stop snaps and unmount");

        for unit in systemd::query_units(executor, logger, &config.unit_filter) {
            context.log(&format!("stopping {unit}"));
            best_effort(context, &systemd::stop(&unit));
        }

        for unit in systemd::query_units(executor, logger, &config.unit_filter) {
            if let Some(output) = best_effort(context, &systemd::is_active(&unit)) {
                context.log(&format!("{unit} {}", output.trim()));
            }
        }

        let Some(listing) = systemd::query_mountpoints(executor, logger) else {
            return;
        };
        for filter in &config.mountpoint_filters {
            for mountpoint in systemd::matching_mountpoints(&listing, filter) {
                context.log(&format!("unmounting {mountpoint}"));
                best_effort(context, &systemd::umount(&mountpoint));
            }
        }
    }
}

impl EncryptionState for PrereqState {
    fn guard(&self) -> &StateGuard {
        &self.guard
    }

    fn guard_mut(&mut self) -> &mut StateGuard {
        &mut self.guard
    }

    fn should_enter(&self) -> bool {
        self.context().log("Verifying if machine should enter prereq state");

        if !self.guard.should_enter() {
            return false;
        }

        self.context().log("Performing enter checks for prereq state");
        true
    }

    fn enter(&mut self) -> EncryptionResult<()> {
        if !self.should_enter() {
            return Ok(());
        }

        self.context().log("Entering prereq state");
        self.check_distro()?;

        self.context().distro_patcher().install_extras()?;

        self.patch_agent_service()?;
        self.context()
            .executor()
            .execute(&systemd::daemon_reload(), true)?;

        self.install_boot_scripts()?;
        self.quiesce_snaps();
        Ok(())
    }

    fn should_exit(&mut self) -> EncryptionResult<bool> {
        self.context().log("Verifying if machine should exit prereq state");
        self.guard.should_exit()
    }
}

/// Insert `KillMode=process` after every `[Service]` header.
///
/// There is no presence check: patching an already patched unit adds the directive
/// again.
pub fn insert_kill_mode(unit: &str) -> String {
    unit.replace(SERVICE_HEADER, SERVICE_HEADER_WITH_KILL_MODE)
}

/// Run a command whose failure is tolerated. Returns stdout when it could be run.
fn best_effort(context: &EncryptionContext, command: &HostCommand) -> Option<String> {
    match context.executor().execute(command, false) {
        Ok(output) => {
            if !output.success() {
                context.log(&format!(
                    "`{command}` exited with status {} (ignored): {}",
                    output.status,
                    output.diagnostic()
                ));
            }
            Some(output.stdout)
        }
        Err(err) => {
            context.log(&format!("`{command}` could not run (ignored): {err}"));
            None
        }
    }
}
