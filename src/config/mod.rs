//! Runtime configuration.
//!
//! Every field has a default, and the defaults are the exact host paths and names the
//! encryption workflow expects on a supported image. A config file only needs to carry
//! the fields it overrides.

mod validation;

use crate::error::{EncryptionError, EncryptionResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use validation::ConfigViolation;

pub const DEFAULT_MARKERS_DIR: &str = "/var/lib/azure_disk_encryption_config/os_encryption_markers";
pub const ENCRYPT_SCRIPTS_DIR: &str = "encryptscripts";

/// The one OS family/version set a state machine variant is valid for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedDistro {
    /// Compared against the lower-cased detected family.
    pub family: String,
    pub versions: Vec<String>,
}

impl Default for SupportedDistro {
    fn default() -> Self {
        Self {
            family: "ubuntu".into(),
            versions: vec!["20.04".into()],
        }
    }
}

impl std::fmt::Display for SupportedDistro {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.family, self.versions.join("/"))
    }
}

/// On-disk encoding for run checkpoints.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointFormat {
    #[default]
    Json,
    Binary,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    pub supported_distro: SupportedDistro,
    /// Service whose unit file gets `KillMode=process`.
    pub agent_service: String,
    pub systemd_unit_dir: PathBuf,
    pub initramfs_hooks_dir: PathBuf,
    pub initramfs_premount_dir: PathBuf,
    pub hook_script: String,
    pub boot_script: String,
    /// Directory the state logic is installed in; early-boot scripts live in a
    /// sibling `encryptscripts` directory. Defaults to the running executable's
    /// directory.
    pub install_dir: Option<PathBuf>,
    pub markers_dir: PathBuf,
    /// Substring selecting the units to stop before disk operations.
    pub unit_filter: String,
    /// Substrings selecting the mountpoints to release, processed in order.
    pub mountpoint_filters: Vec<String>,
    pub extra_packages: Vec<String>,
    pub command_timeout_secs: u64,
    pub checkpoint_format: CheckpointFormat,
    pub max_enter_attempts: usize,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            supported_distro: SupportedDistro::default(),
            agent_service: "walinuxagent".into(),
            systemd_unit_dir: PathBuf::from("/lib/systemd/system"),
            initramfs_hooks_dir: PathBuf::from("/usr/share/initramfs-tools/hooks"),
            initramfs_premount_dir: PathBuf::from(
                "/usr/share/initramfs-tools/scripts/init-premount",
            ),
            hook_script: "crypt-ade-hook".into(),
            boot_script: "crypt-ade-boot".into(),
            install_dir: None,
            markers_dir: PathBuf::from(DEFAULT_MARKERS_DIR),
            unit_filter: "snap".into(),
            mountpoint_filters: vec![
                "/snap/lxd".into(),
                "/snap/core18".into(),
                "/snap/snapd".into(),
            ],
            extra_packages: Vec::new(),
            command_timeout_secs: 300,
            checkpoint_format: CheckpointFormat::Json,
            max_enter_attempts: 1,
        }
    }
}

impl EncryptionConfig {
    /// Read a JSON config file and validate it.
    pub fn load(path: &Path) -> EncryptionResult<Self> {
        let raw = fs::read_to_string(path).map_err(|err| EncryptionError::file(path, err))?;
        let config: Self = serde_json::from_str(&raw).map_err(|err| {
            EncryptionError::InvalidConfig(format!("{}: {err}", path.display()))
        })?;
        config.validated()
    }

    /// Return `self` if every check passes, otherwise all violations in one error.
    pub fn validated(self) -> EncryptionResult<Self> {
        match validation::violations(&self) {
            violations if violations.is_empty() => Ok(self),
            violations => Err(EncryptionError::InvalidConfig(
                violations
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            )),
        }
    }

    pub fn service_unit_path(&self) -> PathBuf {
        self.systemd_unit_dir
            .join(format!("{}.service", self.agent_service))
    }

    pub fn hook_script_dest(&self) -> PathBuf {
        self.initramfs_hooks_dir.join(&self.hook_script)
    }

    pub fn boot_script_dest(&self) -> PathBuf {
        self.initramfs_premount_dir.join(&self.boot_script)
    }

    /// `<install_dir>/../encryptscripts`, resolved against the executable when no
    /// install directory is configured.
    pub fn encrypt_scripts_dir(&self) -> EncryptionResult<PathBuf> {
        let install_dir = match &self.install_dir {
            Some(dir) => dir.clone(),
            None => {
                let exe = std::env::current_exe()?;
                exe.parent().map(Path::to_path_buf).ok_or_else(|| {
                    EncryptionError::InvalidConfig(format!(
                        "cannot determine install directory from {}",
                        exe.display()
                    ))
                })?
            }
        };
        Ok(install_dir.join("..").join(ENCRYPT_SCRIPTS_DIR))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}
