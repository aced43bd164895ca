//! Shared, read-mostly context handed to every state of a workflow run.

use crate::config::EncryptionConfig;
use crate::error::EncryptionResult;
use crate::host::{
    CommandExecutor, DistroPatcher, HostFs, LogLogger, Logger, OsReleasePatcher,
    SystemCommandExecutor, SystemFs,
};
use std::sync::Arc;

/// Everything a state needs to observe or mutate the host.
///
/// Built once by whoever owns the run and shared through `Arc`; there are no
/// mutating accessors, so states can only change the host, never the context.
pub struct EncryptionContext {
    config: EncryptionConfig,
    logger: Arc<dyn Logger>,
    distro_patcher: Arc<dyn DistroPatcher>,
    executor: Arc<dyn CommandExecutor>,
    fs: Arc<dyn HostFs>,
}

impl EncryptionContext {
    pub fn new(
        config: EncryptionConfig,
        logger: Arc<dyn Logger>,
        distro_patcher: Arc<dyn DistroPatcher>,
        executor: Arc<dyn CommandExecutor>,
        fs: Arc<dyn HostFs>,
    ) -> Self {
        Self {
            config,
            logger,
            distro_patcher,
            executor,
            fs,
        }
    }

    /// Wire the real host: `log` facade, `std::process`, the real filesystem, and an
    /// apt patcher identified from `/etc/os-release`.
    pub fn system(config: EncryptionConfig) -> EncryptionResult<Self> {
        Self::from_host(config, Arc::new(LogLogger), Arc::new(SystemFs))
    }

    /// Like [`system`](Self::system), but with the given logger and filesystem.
    /// Commands still run through `std::process`.
    pub fn from_host(
        config: EncryptionConfig,
        logger: Arc<dyn Logger>,
        fs: Arc<dyn HostFs>,
    ) -> EncryptionResult<Self> {
        let config = config.validated()?;
        let executor: Arc<dyn CommandExecutor> = Arc::new(SystemCommandExecutor::new(
            Arc::clone(&logger),
            config.command_timeout(),
        ));
        let distro_patcher = Arc::new(OsReleasePatcher::detect(
            fs.as_ref(),
            config.extra_packages.clone(),
            Arc::clone(&executor),
            Arc::clone(&logger),
        )?);

        Ok(Self::new(config, logger, distro_patcher, executor, fs))
    }

    pub fn config(&self) -> &EncryptionConfig {
        &self.config
    }

    pub fn logger(&self) -> &dyn Logger {
        self.logger.as_ref()
    }

    pub fn distro_patcher(&self) -> &dyn DistroPatcher {
        self.distro_patcher.as_ref()
    }

    pub fn executor(&self) -> &dyn CommandExecutor {
        self.executor.as_ref()
    }

    pub fn fs(&self) -> &dyn HostFs {
        self.fs.as_ref()
    }

    /// Owned handle for collaborators that outlive a borrow of the context.
    pub fn shared_fs(&self) -> Arc<dyn HostFs> {
        Arc::clone(&self.fs)
    }

    pub fn log(&self, message: &str) {
        self.logger.log(message);
    }
}
