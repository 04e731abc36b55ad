//! Manifest (C11): the JSON side-file tracking row counts and the delta
//! chain attached to a snapshot.

use std::fs;
use std::path::{Path, PathBuf};

use grizzly_error::Result;
use serde::{Deserialize, Serialize};

use crate::checkpoint::CheckpointStore;

/// Whether a snapshot's companion manifest currently reflects a full
/// rewrite or an incremental delta chain on top of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotType {
    /// The snapshot file alone is authoritative; no pending deltas.
    Full,
    /// The snapshot plus `deltas` (in order) is authoritative.
    Incremental,
}

/// A table's row count as of this manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRowCount {
    /// Table name.
    pub name: String,
    /// Row count recorded at manifest-write time.
    pub row_count: u64,
}

/// One applied (or pending-apply) delta file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaEntry {
    /// Path to the delta file, relative to the snapshot's directory.
    pub path: String,
    /// Unix timestamp (seconds) the delta was written.
    pub timestamp: i64,
}

/// Side-file describing a snapshot's current row counts and delta chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Snapshot format version this manifest describes.
    pub version: u16,
    /// Whether the snapshot is self-contained or needs `deltas` applied.
    pub snapshot_type: SnapshotType,
    /// Unix timestamp (seconds) the manifest was last written.
    pub timestamp: i64,
    /// Per-table row counts.
    pub tables: Vec<TableRowCount>,
    /// Delta chain, oldest first.
    pub deltas: Vec<DeltaEntry>,
}

/// Threshold at which `saveIncremental` compacts the delta chain into a
/// fresh full snapshot (spec §4.9 step 5).
pub const COMPACTION_THRESHOLD: usize = 5;

impl Manifest {
    /// A fresh manifest for a brand-new full snapshot.
    #[must_use]
    pub fn new_full(tables: Vec<TableRowCount>, timestamp: i64) -> Self {
        Self {
            version: crate::snapshot::FORMAT_VERSION,
            snapshot_type: SnapshotType::Full,
            timestamp,
            tables,
            deltas: Vec::new(),
        }
    }

    /// The lakehouse directory that sits beside `snapshot_path`.
    #[must_use]
    pub fn lakehouse_dir(snapshot_path: &Path) -> PathBuf {
        let mut name = snapshot_path.as_os_str().to_owned();
        name.push(".lakehouse");
        PathBuf::from(name)
    }

    fn manifest_path(snapshot_path: &Path) -> PathBuf {
        Self::lakehouse_dir(snapshot_path).join("manifest.json")
    }

    /// Load the manifest belonging to `snapshot_path`.
    pub fn load(snapshot_path: &Path) -> Result<Self> {
        let body = fs::read(Self::manifest_path(snapshot_path))?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Persist this manifest beside `snapshot_path`, creating the
    /// lakehouse directory structure if it does not already exist.
    /// Written via the same temp-then-rename pattern as the checkpoint
    /// store, so readers never see a half-written manifest.
    pub fn save(&self, snapshot_path: &Path) -> Result<()> {
        let dir = Self::lakehouse_dir(snapshot_path);
        for sub in ["metadata", "data", "unstructured"] {
            fs::create_dir_all(dir.join(sub))?;
        }
        let target = Self::manifest_path(snapshot_path);
        let tmp = target.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&tmp, &target)?;
        Ok(())
    }

    /// Row count recorded for `table`, if present.
    #[must_use]
    pub fn table_row_count(&self, table: &str) -> Option<u64> {
        self.tables.iter().find(|t| t.name == table).map(|t| t.row_count)
    }

    /// Number of deltas currently chained onto the snapshot.
    #[must_use]
    pub fn delta_chain_length(&self) -> usize {
        self.deltas.len()
    }

    /// `now()` helper shared with the checkpoint store.
    #[must_use]
    pub fn now() -> i64 {
        CheckpointStore::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot_path = dir.path().join("snap.griz");
        let manifest = Manifest::new_full(
            vec![TableRowCount { name: "metrics".to_owned(), row_count: 3 }],
            42,
        );
        manifest.save(&snapshot_path).unwrap();
        let loaded = Manifest::load(&snapshot_path).unwrap();
        assert_eq!(loaded.table_row_count("metrics"), Some(3));
        assert_eq!(loaded.snapshot_type, SnapshotType::Full);
    }

    #[test]
    fn lakehouse_directory_structure_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot_path = dir.path().join("snap.griz");
        Manifest::new_full(vec![], 0).save(&snapshot_path).unwrap();
        let lakehouse = Manifest::lakehouse_dir(&snapshot_path);
        assert!(lakehouse.join("metadata").is_dir());
        assert!(lakehouse.join("data").is_dir());
        assert!(lakehouse.join("unstructured").is_dir());
    }
}
