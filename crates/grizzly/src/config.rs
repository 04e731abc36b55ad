//! [`GrizzlyConfig`]: the TOML-backed runtime configuration for an
//! embedded [`crate::Grizzly`] instance.

use std::path::{Path, PathBuf};

use grizzly_error::Result;
use serde::{Deserialize, Serialize};

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("grizzly.checkpoint.json")
}

const fn default_delta_compaction_threshold() -> usize {
    grizzly_persist::COMPACTION_THRESHOLD
}

const fn default_hll_precision() -> u8 {
    14
}

const fn default_scheduler_tick_secs() -> u64 {
    60
}

const fn default_retry_max() -> u32 {
    3
}

/// Runtime configuration, loaded from a TOML file or built with
/// [`GrizzlyConfig::default`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GrizzlyConfig {
    /// Directory holding snapshot files and their `.lakehouse/` siblings.
    pub data_dir: PathBuf,
    /// Path to the crash-resume checkpoint file.
    pub checkpoint_path: PathBuf,
    /// Delta chain length at which `saveIncrementalState` compacts into a
    /// fresh full snapshot.
    pub delta_compaction_threshold: usize,
    /// HyperLogLog precision (`p`); fixed at 14 per spec, exposed for
    /// forward compatibility with alternate sketch sizes.
    pub hll_precision: u8,
    /// How often the periodic refresh scheduler's background thread wakes.
    pub scheduler_tick_secs: u64,
    /// Default `max_retries` for a periodic schedule that doesn't specify one.
    pub default_retry_max: u32,
}

impl Default for GrizzlyConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            checkpoint_path: default_checkpoint_path(),
            delta_compaction_threshold: default_delta_compaction_threshold(),
            hll_precision: default_hll_precision(),
            scheduler_tick_secs: default_scheduler_tick_secs(),
            default_retry_max: default_retry_max(),
        }
    }
}

impl GrizzlyConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// any field the file omits.
    pub fn load(path: &Path) -> Result<Self> {
        let body = std::fs::read_to_string(path)?;
        toml::from_str(&body).map_err(|e| grizzly_error::GrizzlyError::internal(format!("invalid config at {}: {e}", path.display())))
    }

    /// Serialize this configuration back to TOML (round-trips with [`load`](Self::load)).
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| grizzly_error::GrizzlyError::internal(e.to_string()))
    }

    /// Path the main snapshot file lives at within `data_dir`.
    #[must_use]
    pub fn snapshot_path(&self, dbname: &str) -> PathBuf {
        self.data_dir.join(format!("{dbname}.griz"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_values() {
        let config = GrizzlyConfig::default();
        assert_eq!(config.delta_compaction_threshold, 5);
        assert_eq!(config.hll_precision, 14);
        assert_eq!(config.scheduler_tick_secs, 60);
        assert_eq!(config.default_retry_max, 3);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grizzly.toml");
        std::fs::write(&path, "data_dir = \"/var/lib/grizzly\"\n").unwrap();
        let config = GrizzlyConfig::load(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/grizzly"));
        assert_eq!(config.hll_precision, 14);
    }

    #[test]
    fn roundtrips_through_toml() {
        let config = GrizzlyConfig::default();
        let text = config.to_toml().unwrap();
        let parsed: GrizzlyConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.scheduler_tick_secs, config.scheduler_tick_secs);
    }
}
