//! Generic completion check shared by all states.
//!
//! A state counts as done once it has executed in this process or once its marker
//! file exists under the configured markers directory. Markers are what let a run
//! that was interrupted by a reboot skip the states it already finished.

use crate::context::EncryptionContext;
use crate::error::{EncryptionError, EncryptionResult};
use std::path::PathBuf;
use std::sync::Arc;

/// Per-state bookkeeping behind the default `should_enter` / `should_exit`.
pub struct StateGuard {
    name: String,
    context: Arc<EncryptionContext>,
    executed: bool,
}

impl StateGuard {
    pub fn new(name: impl Into<String>, context: Arc<EncryptionContext>) -> Self {
        Self {
            name: name.into(),
            context,
            executed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &EncryptionContext {
        &self.context
    }

    pub fn executed(&self) -> bool {
        self.executed
    }

    pub fn marker_path(&self) -> PathBuf {
        self.context.config().markers_dir.join(&self.name)
    }

    /// True unless the state already ran here or its marker exists. Reads only.
    pub fn should_enter(&self) -> bool {
        self.context.log(&format!("should_enter() called for {}", self.name));

        if self.executed {
            self.context.log(&format!(
                "State {} has already executed, not entering",
                self.name
            ));
            return false;
        }

        let marker = self.marker_path();
        if self.context.fs().exists(&marker) {
            self.context.log(&format!(
                "State marker {} exists, state {} has already executed",
                marker.display(),
                self.name
            ));
            return false;
        }

        self.context.log(&format!(
            "State marker {} does not exist, state {} can be entered",
            marker.display(),
            self.name
        ));
        true
    }

    /// Record completion: write the marker if missing and remember it in-process.
    pub fn should_exit(&mut self) -> EncryptionResult<bool> {
        self.context.log(&format!("should_exit() called for {}", self.name));

        let marker = self.marker_path();
        let fs = self.context.fs();
        if !fs.exists(&marker) {
            let markers_dir = &self.context.config().markers_dir;
            fs.create_dir_all(markers_dir)
                .map_err(|err| EncryptionError::file(markers_dir, err))?;
            self.context
                .log(&format!("Creating state marker {}", marker.display()));
            fs.write(&marker, b"")
                .map_err(|err| EncryptionError::file(&marker, err))?;
        }

        self.executed = true;
        Ok(true)
    }
}
