//! Config checks that report every problem in one pass.

use super::EncryptionConfig;
use std::path::Path;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigViolation {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} must be an absolute path (got {value})")]
    RelativePath { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} must be a bare file name (got {value})")]
    NotAFileName { field: &'static str, value: String },
}

type Check = Validation<(), NonEmptyVec<ConfigViolation>>;

pub(crate) fn violations(config: &EncryptionConfig) -> Vec<ConfigViolation> {
    let checks: Vec<Check> = vec![
        non_empty("supported_distro.family", &config.supported_distro.family),
        non_empty_list(
            "supported_distro.versions",
            &config.supported_distro.versions,
        ),
        non_empty("agent_service", &config.agent_service),
        absolute("systemd_unit_dir", &config.systemd_unit_dir),
        absolute("initramfs_hooks_dir", &config.initramfs_hooks_dir),
        absolute("initramfs_premount_dir", &config.initramfs_premount_dir),
        absolute("markers_dir", &config.markers_dir),
        file_name("hook_script", &config.hook_script),
        file_name("boot_script", &config.boot_script),
        non_empty("unit_filter", &config.unit_filter),
        // An empty filter would match every mountpoint on the host.
        no_empty_entries("mountpoint_filters", &config.mountpoint_filters),
        positive("command_timeout_secs", config.command_timeout_secs),
        positive("max_enter_attempts", config.max_enter_attempts),
    ];

    match Validation::all_vec(checks).map(|_| ()) {
        Validation::Success(_) => Vec::new(),
        Validation::Failure(errors) => errors.iter().cloned().collect(),
    }
}

fn non_empty(field: &'static str, value: &str) -> Check {
    if value.trim().is_empty() {
        Validation::fail(ConfigViolation::Empty { field })
    } else {
        Validation::success(())
    }
}

fn non_empty_list(field: &'static str, values: &[String]) -> Check {
    if values.iter().all(|value| value.trim().is_empty()) {
        Validation::fail(ConfigViolation::Empty { field })
    } else {
        Validation::success(())
    }
}

fn no_empty_entries(field: &'static str, values: &[String]) -> Check {
    if values.iter().any(|value| value.trim().is_empty()) {
        Validation::fail(ConfigViolation::Empty { field })
    } else {
        Validation::success(())
    }
}

fn absolute(field: &'static str, path: &Path) -> Check {
    if path.is_absolute() {
        Validation::success(())
    } else {
        Validation::fail(ConfigViolation::RelativePath {
            field,
            value: path.display().to_string(),
        })
    }
}

fn file_name(field: &'static str, value: &str) -> Check {
    if value.trim().is_empty() {
        Validation::fail(ConfigViolation::Empty { field })
    } else if value.contains('/') || value == "." || value == ".." {
        Validation::fail(ConfigViolation::NotAFileName {
            field,
            value: value.to_string(),
        })
    } else {
        Validation::success(())
    }
}

fn positive<T: Default + PartialEq>(field: &'static str, value: T) -> Check {
    if value == T::default() {
        Validation::fail(ConfigViolation::Zero { field })
    } else {
        Validation::success(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SupportedDistro;
    use std::path::PathBuf;

    #[test]
    fn default_config_has_no_violations() {
        assert!(violations(&EncryptionConfig::default()).is_empty());
    }

    #[test]
    fn violations_accumulate() {
        let config = EncryptionConfig {
            supported_distro: SupportedDistro {
                family: String::new(),
                versions: Vec::new(),
            },
            initramfs_hooks_dir: PathBuf::from("hooks"),
            boot_script: "../crypt-ade-boot".into(),
            max_enter_attempts: 0,
            ..EncryptionConfig::default()
        };

        let found = violations(&config);
        assert_eq!(found.len(), 5);
        assert!(found.contains(&ConfigViolation::Empty {
            field: "supported_distro.family"
        }));
        assert!(found.contains(&ConfigViolation::Empty {
            field: "supported_distro.versions"
        }));
        assert!(found.contains(&ConfigViolation::RelativePath {
            field: "initramfs_hooks_dir",
            value: "hooks".into(),
        }));
        assert!(found.contains(&ConfigViolation::NotAFileName {
            field: "boot_script",
            value: "../crypt-ade-boot".into(),
        }));
        assert!(found.contains(&ConfigViolation::Zero {
            field: "max_enter_attempts"
        }));
    }

    #[test]
    fn empty_mountpoint_filter_is_rejected() {
        let config = EncryptionConfig {
            mountpoint_filters: vec!["/snap/lxd".into(), " ".into()],
            ..EncryptionConfig::default()
        };
        assert_eq!(
            violations(&config),
            vec![ConfigViolation::Empty {
                field: "mountpoint_filters"
            }]
        );
    }

    #[test]
    fn zero_timeout_is_rejected_and_large_timeout_is_not() {
        let zero = EncryptionConfig {
            command_timeout_secs: 0,
            ..EncryptionConfig::default()
        };
        assert_eq!(
            violations(&zero),
            vec![ConfigViolation::Zero {
                field: "command_timeout_secs"
            }]
        );

        let large = EncryptionConfig {
            command_timeout_secs: 1 << 32,
            ..EncryptionConfig::default()
        };
        assert!(violations(&large).is_empty());
    }

    #[test]
    fn no_mountpoint_filters_is_allowed() {
        let config = EncryptionConfig {
            mountpoint_filters: Vec::new(),
            ..EncryptionConfig::default()
        };
        assert!(violations(&config).is_empty());
    }
}
