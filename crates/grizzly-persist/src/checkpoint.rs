//! Checkpoint store (C8): a single crash-resume JSON record, written
//! atomically via temp-file-then-rename.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use grizzly_error::Result;
use serde::{Deserialize, Serialize};

/// A checkpoint record's lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckpointStatus {
    /// The step is underway; a crash leaves the record at this status.
    InProgress,
    /// The step finished successfully.
    Completed,
    /// The step failed.
    Failed,
}

/// Advisory crash-resume record. Purely informational: callers may choose
/// to skip any table whose last recorded status was `Completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Top-level task name, e.g. `"save"` or `"saveIncremental"`.
    pub task: String,
    /// Step within the task, e.g. `"writeTable"`.
    pub step: String,
    /// Table the step concerns.
    pub table: String,
    /// Column position within the table, if the step is column-grained.
    pub column_index: Option<usize>,
    /// Current status.
    pub status: CheckpointStatus,
    /// Unix timestamp (seconds) the record was written.
    pub timestamp: i64,
    /// Error message, present only when `status == Failed`.
    pub error: Option<String>,
}

/// A single well-known JSON file holding the latest [`CheckpointRecord`].
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// Point the store at a filesystem path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Current Unix timestamp in seconds, used to stamp new records.
    #[must_use]
    pub fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    /// Write `record`, replacing any existing one. Crash-atomic: the
    /// record is written to a temp path beside the target and renamed
    /// over it, so a reader never observes a half-written file.
    pub fn write(&self, record: &CheckpointRecord) -> Result<()> {
        let tmp_path = self.path.with_extension("tmp");
        let body = serde_json::to_vec_pretty(record)?;
        fs::write(&tmp_path, body)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Read the latest record, or `None` if no checkpoint exists.
    pub fn read(&self) -> Result<Option<CheckpointRecord>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let body = fs::read(&self.path)?;
        Ok(Some(serde_json::from_slice(&body)?))
    }

    /// Remove the checkpoint file, if present.
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    /// The path this store is backed by.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_before_any_write_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));
        assert!(store.read().unwrap().is_none());
    }

    #[test]
    fn write_then_read_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));
        let record = CheckpointRecord {
            task: "save".to_owned(),
            step: "writeTable".to_owned(),
            table: "metrics".to_owned(),
            column_index: Some(1),
            status: CheckpointStatus::InProgress,
            timestamp: CheckpointStore::now(),
            error: None,
        };
        store.write(&record).unwrap();
        let read_back = store.read().unwrap().unwrap();
        assert_eq!(read_back.table, "metrics");
        assert_eq!(read_back.status, CheckpointStatus::InProgress);
    }

    #[test]
    fn clear_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));
        store
            .write(&CheckpointRecord {
                task: "save".to_owned(),
                step: "writeTable".to_owned(),
                table: "t".to_owned(),
                column_index: None,
                status: CheckpointStatus::Completed,
                timestamp: 0,
                error: None,
            })
            .unwrap();
        store.clear().unwrap();
        assert!(store.read().unwrap().is_none());
    }
}
