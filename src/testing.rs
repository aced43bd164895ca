//! In-memory stand-ins for every host seam.
//!
//! All doubles built from the same [`Journal`] append to it, so a test can assert the
//! exact order of host effects across the executor, the filesystem, and the distro
//! patcher. Reads are not journaled; only calls that could change the host are.

use crate::config::EncryptionConfig;
use crate::context::EncryptionContext;
use crate::error::{EncryptionError, EncryptionResult};
use crate::host::{CommandExecutor, CommandOutput, DistroInfo, DistroPatcher, HostCommand, HostFs, Logger};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// One potentially mutating call against the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// A command line, or `bash: <script>` for scripts.
    Command(String),
    InstallExtras,
    Write(PathBuf),
    Rename { from: PathBuf, to: PathBuf },
    Copy { from: PathBuf, to: PathBuf },
    SetExecutable(PathBuf),
    CreateDir(PathBuf),
}

/// Shared, ordered log of [`HostEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    events: Arc<Mutex<Vec<HostEvent>>>,
}

impl Journal {
    pub fn record(&self, event: HostEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Only the command lines, in order.
    pub fn commands(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HostEvent::Command(line) => Some(line),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

/// Collects every logged line.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    lines: Mutex<Vec<String>>,
}

impl MemoryLogger {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().unwrap().iter().any(|line| line.contains(needle))
    }
}

impl Logger for MemoryLogger {
    fn log(&self, message: &str) {
        self.lines.lock().unwrap().push(message.to_string());
    }
}

/// Executor that answers from canned outputs keyed by command-line prefix.
///
/// Commands without a canned answer succeed with empty output.
pub struct FakeExecutor {
    journal: Journal,
    responses: Mutex<Vec<(String, CommandOutput)>>,
    unavailable: Mutex<BTreeSet<String>>,
}

impl FakeExecutor {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            responses: Mutex::new(Vec::new()),
            unavailable: Mutex::new(BTreeSet::new()),
        }
    }

    /// Answer commands starting with `prefix`. Earlier registrations win.
    pub fn respond(&self, prefix: impl Into<String>, output: CommandOutput) {
        self.responses.lock().unwrap().push((prefix.into(), output));
    }

    /// Answer commands starting with `prefix` with a bare exit status.
    pub fn exit_with(&self, prefix: impl Into<String>, status: i32) {
        self.respond(
            prefix,
            CommandOutput {
                status,
                stdout: String::new(),
                stderr: format!("exit status {status}"),
            },
        );
    }

    /// Make `program` fail to spawn, as if it were not installed.
    pub fn make_unavailable(&self, program: impl Into<String>) {
        self.unavailable.lock().unwrap().insert(program.into());
    }

    fn answer(&self, line: &str) -> CommandOutput {
        self.responses
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default()
    }
}

impl CommandExecutor for FakeExecutor {
    fn run(&self, command: &HostCommand) -> EncryptionResult<CommandOutput> {
        let line = command.to_string();
        self.journal.record(HostEvent::Command(line.clone()));
        if self.unavailable.lock().unwrap().contains(command.program()) {
            return Err(EncryptionError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{}: not found", command.program()),
            )));
        }
        Ok(self.answer(&line))
    }

    fn run_script(&self, script: &str) -> EncryptionResult<CommandOutput> {
        let line = format!("bash: {script}");
        self.journal.record(HostEvent::Command(line.clone()));
        Ok(self.answer(&line))
    }
}

#[derive(Debug, Clone)]
struct MemoryFile {
    contents: Vec<u8>,
    mode: u32,
}

/// Filesystem held in memory.
pub struct MemoryFs {
    journal: Journal,
    files: Mutex<BTreeMap<PathBuf, MemoryFile>>,
    dirs: Mutex<BTreeSet<PathBuf>>,
    read_only: Mutex<BTreeSet<PathBuf>>,
}

impl MemoryFs {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            files: Mutex::new(BTreeMap::new()),
            dirs: Mutex::new(BTreeSet::new()),
            read_only: Mutex::new(BTreeSet::new()),
        }
    }

    /// Seed a file without journaling it.
    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl AsRef<[u8]>) {
        self.files.lock().unwrap().insert(
            path.into(),
            MemoryFile {
                contents: contents.as_ref().to_vec(),
                mode: 0o644,
            },
        );
    }

    pub fn remove(&self, path: &Path) {
        self.files.lock().unwrap().remove(path);
    }

    pub fn contents(&self, path: &Path) -> Option<String> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .map(|file| String::from_utf8_lossy(&file.contents).to_string())
    }

    pub fn mode(&self, path: &Path) -> Option<u32> {
        self.files.lock().unwrap().get(path).map(|file| file.mode)
    }

    /// Make writes, copies, and renames targeting `path` fail with `PermissionDenied`.
    pub fn make_read_only(&self, path: impl Into<PathBuf>) {
        self.read_only.lock().unwrap().insert(path.into());
    }

    fn check_writable(&self, path: &Path) -> io::Result<()> {
        if self.read_only.lock().unwrap().contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} is read-only", path.display()),
            ));
        }
        Ok(())
    }

    fn not_found(path: &Path) -> io::Error {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{}: no such file", path.display()),
        )
    }
}

impl HostFs for MemoryFs {
    fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path) || self.dirs.lock().unwrap().contains(path)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .map(|file| file.contents.clone())
            .ok_or_else(|| Self::not_found(path))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        self.journal.record(HostEvent::Write(path.to_path_buf()));
        self.check_writable(path)?;
        let mut files = self.files.lock().unwrap();
        let mode = files.get(path).map(|file| file.mode).unwrap_or(0o644);
        files.insert(
            path.to_path_buf(),
            MemoryFile {
                contents: contents.to_vec(),
                mode,
            },
        );
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.journal.record(HostEvent::Rename {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        });
        self.check_writable(to)?;
        let mut files = self.files.lock().unwrap();
        let file = files.remove(from).ok_or_else(|| Self::not_found(from))?;
        files.insert(to.to_path_buf(), file);
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.journal.record(HostEvent::Copy {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        });
        self.check_writable(to)?;
        let mut files = self.files.lock().unwrap();
        let file = files.get(from).cloned().ok_or_else(|| Self::not_found(from))?;
        files.insert(to.to_path_buf(), file);
        Ok(())
    }

    fn set_executable(&self, path: &Path) -> io::Result<()> {
        self.journal
            .record(HostEvent::SetExecutable(path.to_path_buf()));
        let mut files = self.files.lock().unwrap();
        let file = files.get_mut(path).ok_or_else(|| Self::not_found(path))?;
        file.mode |= 0o111;
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.journal.record(HostEvent::CreateDir(path.to_path_buf()));
        self.dirs.lock().unwrap().insert(path.to_path_buf());
        Ok(())
    }
}

/// Distro patcher reporting a fixed identity.
pub struct StaticDistroPatcher {
    info: DistroInfo,
    journal: Journal,
    install_error: Mutex<Option<String>>,
}

impl StaticDistroPatcher {
    pub fn new(info: DistroInfo, journal: Journal) -> Self {
        Self {
            info,
            journal,
            install_error: Mutex::new(None),
        }
    }

    /// Make `install_extras` fail with a `CommandFailed` carrying `message`.
    pub fn fail_install(&self, message: impl Into<String>) {
        *self.install_error.lock().unwrap() = Some(message.into());
    }
}

impl DistroPatcher for StaticDistroPatcher {
    fn distro_info(&self) -> DistroInfo {
        self.info.clone()
    }

    fn install_extras(&self) -> EncryptionResult<()> {
        self.journal.record(HostEvent::InstallExtras);
        match self.install_error.lock().unwrap().clone() {
            Some(message) => Err(EncryptionError::CommandFailed {
                command: "apt-get install".into(),
                status: 100,
                output: message,
            }),
            None => Ok(()),
        }
    }
}

/// A complete fake host: one journal shared by every double, plus the config the
/// context is built from.
pub struct TestHost {
    pub journal: Journal,
    pub fs: Arc<MemoryFs>,
    pub executor: Arc<FakeExecutor>,
    pub patcher: Arc<StaticDistroPatcher>,
    pub logger: Arc<MemoryLogger>,
    pub config: EncryptionConfig,
}

impl TestHost {
    /// Install directory used by [`TestHost::new`]; scripts resolve next to it.
    pub const INSTALL_DIR: &'static str = "/opt/ade/encryptstates";

    /// A supported Ubuntu 20.04 host.
    pub fn new() -> Self {
        Self::with_distro(DistroInfo::new("Ubuntu", "20.04"))
    }

    pub fn with_distro(info: DistroInfo) -> Self {
        let config = EncryptionConfig {
            install_dir: Some(PathBuf::from(Self::INSTALL_DIR)),
            ..EncryptionConfig::default()
        };
        Self::with_config(info, config)
    }

    pub fn with_config(info: DistroInfo, config: EncryptionConfig) -> Self {
        let journal = Journal::default();
        Self {
            fs: Arc::new(MemoryFs::new(journal.clone())),
            executor: Arc::new(FakeExecutor::new(journal.clone())),
            patcher: Arc::new(StaticDistroPatcher::new(info, journal.clone())),
            logger: Arc::new(MemoryLogger::default()),
            config,
            journal,
        }
    }

    /// A fresh context over the shared doubles.
    pub fn context(&self) -> Arc<EncryptionContext> {
        Arc::new(EncryptionContext::new(
            self.config.clone(),
            self.logger.clone(),
            self.patcher.clone(),
            self.executor.clone(),
            self.fs.clone(),
        ))
    }

    /// Where the state looks for an early-boot script named `name`.
    pub fn script_source(&self, name: &str) -> PathBuf {
        Path::new(Self::INSTALL_DIR)
            .join("..")
            .join(crate::config::ENCRYPT_SCRIPTS_DIR)
            .join(name)
    }

    /// Seed the agent unit file and both early-boot scripts.
    pub fn seed_prerequisites(&self, unit: &str) {
        self.fs.insert(self.config.service_unit_path(), unit);
        self.fs.insert(
            self.script_source(&self.config.hook_script),
            "#!/bin/sh\n# hook\n",
        );
        self.fs.insert(
            self.script_source(&self.config.boot_script),
            "#!/bin/sh\n# boot\n",
        );
    }
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new()
    }
}
