//! Lakehouse persistence: checkpointed snapshots, incremental deltas, and
//! the manifest tying a delta chain back to its base snapshot.

pub mod checkpoint;
pub mod delta;
pub mod manifest;
pub mod snapshot;
pub mod wire;

pub use checkpoint::{CheckpointRecord, CheckpointStatus, CheckpointStore};
pub use manifest::{DeltaEntry, Manifest, SnapshotType, TableRowCount, COMPACTION_THRESHOLD};
pub use snapshot::{load, save};
pub use delta::{apply_incremental, save_incremental};
