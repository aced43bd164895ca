//! Checkpoints of workflow runs.
//!
//! State markers decide what gets skipped; checkpoints keep the story of how the
//! workflow got there, so a run resumed after a reboot can report the earlier boot's
//! progress. Written after every completed state.

use crate::config::CheckpointFormat;
use crate::core::StateHistory;
use crate::host::HostFs;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod error;

pub use error::CheckpointError;

/// Version identifier for checkpoint format
pub const CHECKPOINT_VERSION: u32 = 1;

/// Metadata tracked across runs of the same workflow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// When the first run of this workflow started
    pub created_at: DateTime<Utc>,

    /// Last update time
    pub updated_at: DateTime<Utc>,

    /// Total `enter` calls per state name, across every run
    pub total_attempts: HashMap<String, usize>,
}

impl Default for RunMetadata {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            total_attempts: HashMap::new(),
        }
    }
}

/// Serializable snapshot of a workflow run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Checkpoint format version
    pub version: u32,

    /// Unique checkpoint identifier
    pub id: String,

    /// When checkpoint was created
    pub timestamp: DateTime<Utc>,

    /// Every state visit recorded so far
    pub history: StateHistory,

    pub metadata: RunMetadata,
}

impl Checkpoint {
    pub fn new(history: StateHistory, metadata: RunMetadata) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            history,
            metadata,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, CheckpointError> {
        serde_json::to_vec_pretty(self)
            .map_err(|err| CheckpointError::SerializationFailed(err.to_string()))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, CheckpointError> {
        let checkpoint: Self = serde_json::from_slice(bytes)
            .map_err(|err| CheckpointError::DeserializationFailed(err.to_string()))?;
        checkpoint.check_version()
    }

    pub fn to_binary(&self) -> Result<Vec<u8>, CheckpointError> {
        bincode::serialize(self)
            .map_err(|err| CheckpointError::SerializationFailed(err.to_string()))
    }

    pub fn from_binary(bytes: &[u8]) -> Result<Self, CheckpointError> {
        let checkpoint: Self = bincode::deserialize(bytes)
            .map_err(|err| CheckpointError::DeserializationFailed(err.to_string()))?;
        checkpoint.check_version()
    }

    fn check_version(self) -> Result<Self, CheckpointError> {
        if self.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: self.version,
                supported: CHECKPOINT_VERSION,
            });
        }
        Ok(self)
    }
}

/// Reads and writes the checkpoint file under the markers directory.
pub struct CheckpointStore {
    fs: Arc<dyn HostFs>,
    dir: PathBuf,
    format: CheckpointFormat,
}

impl CheckpointStore {
    pub fn new(fs: Arc<dyn HostFs>, dir: impl Into<PathBuf>, format: CheckpointFormat) -> Self {
        Self {
            fs,
            dir: dir.into(),
            format,
        }
    }

    pub fn path(&self) -> PathBuf {
        let file = match self.format {
            CheckpointFormat::Json => "checkpoint.json",
            CheckpointFormat::Binary => "checkpoint.bin",
        };
        self.dir.join(file)
    }

    /// The last saved checkpoint, or `None` if no run has saved one yet.
    pub fn load(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        let path = self.path();
        if !self.fs.exists(&path) {
            return Ok(None);
        }
        let bytes = self.fs.read(&path).map_err(|err| io_failed(&path, err))?;
        let checkpoint = match self.format {
            CheckpointFormat::Json => Checkpoint::from_json(&bytes)?,
            CheckpointFormat::Binary => Checkpoint::from_binary(&bytes)?,
        };
        Ok(Some(checkpoint))
    }

    /// Write to a temp file and rename over the previous checkpoint.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<PathBuf, CheckpointError> {
        let bytes = match self.format {
            CheckpointFormat::Json => checkpoint.to_json()?,
            CheckpointFormat::Binary => checkpoint.to_binary()?,
        };

        self.fs
            .create_dir_all(&self.dir)
            .map_err(|err| io_failed(&self.dir, err))?;

        let path = self.path();
        let temp_path = path.with_extension("tmp");
        self.fs
            .write(&temp_path, &bytes)
            .map_err(|err| io_failed(&temp_path, err))?;
        self.fs
            .rename(&temp_path, &path)
            .map_err(|err| io_failed(&path, err))?;
        Ok(path)
    }
}

fn io_failed(path: &Path, err: io::Error) -> CheckpointError {
    CheckpointError::Io(format!("{}: {err}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{StateOutcome, StateTransition};
    use crate::testing::{Journal, MemoryFs};

    fn sample() -> Checkpoint {
        let history = StateHistory::new().record(StateTransition {
            state: "PrereqState".into(),
            outcome: StateOutcome::Completed,
            timestamp: Utc::now(),
            attempt: 1,
        });
        let mut metadata = RunMetadata::default();
        metadata.total_attempts.insert("PrereqState".into(), 1);
        Checkpoint::new(history, metadata)
    }

    fn store(format: CheckpointFormat) -> (Arc<MemoryFs>, CheckpointStore) {
        let fs = Arc::new(MemoryFs::new(Journal::default()));
        let store = CheckpointStore::new(fs.clone(), "/var/lib/cryptprep", format);
        (fs, store)
    }

    #[test]
    fn missing_checkpoint_loads_as_none() {
        let (_fs, store) = store(CheckpointFormat::Json);
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn json_checkpoint_survives_save_and_load() {
        let (fs, store) = store(CheckpointFormat::Json);
        let checkpoint = sample();

        let path = store.save(&checkpoint).unwrap();
        assert_eq!(path, PathBuf::from("/var/lib/cryptprep/checkpoint.json"));
        assert!(!fs.exists(Path::new("/var/lib/cryptprep/checkpoint.tmp")));
        assert_eq!(store.load().unwrap(), Some(checkpoint));
    }

    #[test]
    fn binary_checkpoint_survives_save_and_load() {
        let (_fs, store) = store(CheckpointFormat::Binary);
        let checkpoint = sample();

        let path = store.save(&checkpoint).unwrap();
        assert_eq!(path, PathBuf::from("/var/lib/cryptprep/checkpoint.bin"));
        assert_eq!(store.load().unwrap(), Some(checkpoint));
    }

    #[test]
    fn newer_version_is_rejected() {
        let mut checkpoint = sample();
        checkpoint.version = CHECKPOINT_VERSION + 1;
        let bytes = serde_json::to_vec(&checkpoint).unwrap();

        let err = Checkpoint::from_json(&bytes).unwrap_err();
        assert!(matches!(
            err,
            CheckpointError::UnsupportedVersion { found, supported }
                if found == CHECKPOINT_VERSION + 1 && supported == CHECKPOINT_VERSION
        ));
    }

    #[test]
    fn corrupt_checkpoint_fails_to_load() {
        let (fs, store) = store(CheckpointFormat::Json);
        fs.insert("/var/lib/cryptprep/checkpoint.json", "{ truncated");

        assert!(matches!(
            store.load(),
            Err(CheckpointError::DeserializationFailed(_))
        ));
    }

    #[test]
    fn checkpoint_ids_are_unique() {
        assert_ne!(sample().id, sample().id);
    }
}
