//! OS identity and distro-specific package installation.

use crate::error::{EncryptionError, EncryptionResult};
use crate::host::{CommandExecutor, HostFs, Logger};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub const OS_RELEASE_PATH: &str = "/etc/os-release";

/// Detected OS family and version, e.g. `("Ubuntu", "20.04")`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistroInfo {
    pub family: String,
    pub version: String,
}

impl DistroInfo {
    pub fn new(family: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for DistroInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.family, self.version)
    }
}

/// Reports the host OS and installs whatever extra packages encryption needs on it.
pub trait DistroPatcher: Send + Sync {
    fn distro_info(&self) -> DistroInfo;

    fn install_extras(&self) -> EncryptionResult<()>;
}

/// Patcher for apt-based hosts that identifies itself from `/etc/os-release`.
pub struct OsReleasePatcher {
    info: DistroInfo,
    packages: Vec<String>,
    executor: Arc<dyn CommandExecutor>,
    logger: Arc<dyn Logger>,
}

impl OsReleasePatcher {
    /// Read the OS identity once; it does not change during a run.
    pub fn detect(
        fs: &dyn HostFs,
        packages: Vec<String>,
        executor: Arc<dyn CommandExecutor>,
        logger: Arc<dyn Logger>,
    ) -> EncryptionResult<Self> {
        let path = Path::new(OS_RELEASE_PATH);
        let contents = fs
            .read_to_string(path)
            .map_err(|err| EncryptionError::file(path, err))?;
        Ok(Self {
            info: parse_os_release(&contents),
            packages,
            executor,
            logger,
        })
    }
}

impl DistroPatcher for OsReleasePatcher {
    fn distro_info(&self) -> DistroInfo {
        self.info.clone()
    }

    fn install_extras(&self) -> EncryptionResult<()> {
        if self.packages.is_empty() {
            self.logger.log("No extra packages configured");
            return Ok(());
        }

        let packages = self.packages.join(" ");
        self.logger
            .log(&format!("Installing extra packages: {packages}"));
        self.executor.execute_in_bash(
            &format!("DEBIAN_FRONTEND=noninteractive apt-get install -y {packages}"),
            true,
        )?;
        Ok(())
    }
}

/// Pull `ID` and `VERSION_ID` out of an os-release file.
///
/// Missing keys come back as empty strings, which no supported-distro check accepts.
pub fn parse_os_release(contents: &str) -> DistroInfo {
    let mut family = String::new();
    let mut version = String::new();

    for line in contents.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').trim_matches('\'');
        match key.trim() {
            "ID" => family = value.to_string(),
            "VERSION_ID" => version = value.to_string(),
            _ => {}
        }
    }

    DistroInfo { family, version }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeExecutor, Journal, MemoryFs, MemoryLogger};

    const FOCAL: &str = r#"NAME="Ubuntu"
VERSION="20.04.6 LTS (Focal Fossa)"
ID=ubuntu
ID_LIKE=debian
PRETTY_NAME="Ubuntu 20.04.6 LTS"
VERSION_ID="20.04"
"#;

    #[test]
    fn parses_ubuntu_os_release() {
        assert_eq!(parse_os_release(FOCAL), DistroInfo::new("ubuntu", "20.04"));
    }

    #[test]
    fn missing_keys_are_empty() {
        let info = parse_os_release("NAME=Mystery\n# comment\n");
        assert_eq!(info, DistroInfo::new("", ""));
    }

    #[test]
    fn detect_reads_os_release_through_host_fs() {
        let journal = Journal::default();
        let fs = MemoryFs::new(journal.clone());
        fs.insert(OS_RELEASE_PATH, FOCAL);
        let executor = Arc::new(FakeExecutor::new(journal));

        let patcher = OsReleasePatcher::detect(
            &fs,
            Vec::new(),
            executor,
            Arc::new(MemoryLogger::default()),
        )
        .unwrap();
        assert_eq!(patcher.distro_info().to_string(), "ubuntu 20.04");
    }

    #[test]
    fn install_extras_runs_apt_with_configured_packages() {
        let journal = Journal::default();
        let fs = MemoryFs::new(journal.clone());
        fs.insert(OS_RELEASE_PATH, FOCAL);
        let executor = Arc::new(FakeExecutor::new(journal.clone()));

        let patcher = OsReleasePatcher::detect(
            &fs,
            vec!["cryptsetup-bin".into(), "lvm2".into()],
            executor,
            Arc::new(MemoryLogger::default()),
        )
        .unwrap();
        patcher.install_extras().unwrap();

        assert_eq!(
            journal.commands(),
            vec!["bash: DEBIAN_FRONTEND=noninteractive apt-get install -y cryptsetup-bin lvm2"]
        );
    }

    #[test]
    fn install_extras_without_packages_runs_nothing() {
        let journal = Journal::default();
        let fs = MemoryFs::new(journal.clone());
        fs.insert(OS_RELEASE_PATH, FOCAL);
        let executor = Arc::new(FakeExecutor::new(journal.clone()));

        let patcher = OsReleasePatcher::detect(
            &fs,
            Vec::new(),
            executor,
            Arc::new(MemoryLogger::default()),
        )
        .unwrap();
        patcher.install_extras().unwrap();

        assert!(journal.commands().is_empty());
    }
}
