//! Store configuration.
//!
//! [`SnapshotConfig`] says where blobs and the record database live and how
//! often the expiry sweeper runs. Every field has a default, so an empty or
//! missing TOML file is valid. The `SNAPSHOT_DATA_DIR` environment variable
//! overrides `data_dir`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{StoreError, StoreResult};

/// Environment variable that overrides [`SnapshotConfig::data_dir`].
pub const DATA_DIR_ENV: &str = "SNAPSHOT_DATA_DIR";

/// Shortest allowed sweep interval, in seconds.
pub const MIN_SWEEP_INTERVAL_SECS: u64 = 5;
/// Longest allowed sweep interval, in seconds.
pub const MAX_SWEEP_INTERVAL_SECS: u64 = 10;

/// Locations and timing for the image store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Base directory for all persisted state.
    ///
    /// Default: **`data`**.
    pub data_dir: PathBuf,

    /// Blob subdirectory under `data_dir`.
    ///
    /// Default: **`images`**.
    pub image_dir: String,

    /// Record database file under `data_dir`.
    ///
    /// Default: **`database.sqlite`**.
    pub database_file: String,

    /// Extension given to generated blob keys.
    ///
    /// Default: **`jpg`**.
    pub file_extension: String,

    /// Seconds between expiry sweeps while a sweeper is running.
    ///
    /// Default: **10**. Clamped to 5..=10.
    pub sweep_interval_secs: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            image_dir: "images".into(),
            database_file: "database.sqlite".into(),
            file_extension: "jpg".into(),
            sweep_interval_secs: MAX_SWEEP_INTERVAL_SECS,
        }
    }
}

impl SnapshotConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a TOML file, then apply environment overrides.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| {
                StoreError::Config(format!("failed to read {}: {e}", path.display()))
            })?;
            let config = Self::from_toml_str(&content)?;
            info!(path = %path.display(), "configuration loaded from file");
            config
        } else {
            info!(path = %path.display(), "configuration file not found, using defaults");
            Self::default()
        };

        Ok(config.with_data_dir_override(std::env::var(DATA_DIR_ENV).ok()))
    }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> StoreResult<Self> {
        toml::from_str(content)
            .map_err(|e| StoreError::Config(format!("failed to parse TOML config: {e}")))
    }

    /// Replace `data_dir` when an override is present and non-empty.
    pub fn with_data_dir_override(self, data_dir: Option<String>) -> Self {
        match data_dir {
            Some(dir) if !dir.trim().is_empty() => self.with_data_dir(dir),
            _ => self,
        }
    }

    /// Set the base directory.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Set the generated-file extension.
    pub fn with_file_extension(mut self, extension: impl Into<String>) -> Self {
        self.file_extension = extension.into();
        self
    }

    /// Set the sweep interval in seconds.
    pub fn with_sweep_interval_secs(mut self, secs: u64) -> Self {
        self.sweep_interval_secs = secs;
        self
    }

    /// Directory holding blob files.
    pub fn image_path(&self) -> PathBuf {
        self.data_dir.join(&self.image_dir)
    }

    /// Path of the record database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    /// Sweep interval, clamped into the supported range.
    pub fn sweep_interval(&self) -> Duration {
        let secs = self
            .sweep_interval_secs
            .clamp(MIN_SWEEP_INTERVAL_SECS, MAX_SWEEP_INTERVAL_SECS);
        if secs != self.sweep_interval_secs {
            warn!(
                requested = self.sweep_interval_secs,
                used = secs,
                "sweep interval out of range, clamped"
            );
        }
        Duration::from_secs(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = SnapshotConfig::default();
        assert_eq!(cfg.data_dir, PathBuf::from("data"));
        assert_eq!(cfg.image_path(), PathBuf::from("data").join("images"));
        assert_eq!(cfg.database_path(), PathBuf::from("data").join("database.sqlite"));
        assert_eq!(cfg.file_extension, "jpg");
        assert_eq!(cfg.sweep_interval(), Duration::from_secs(10));
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(SnapshotConfig::from_toml_str("").unwrap(), SnapshotConfig::default());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let cfg = SnapshotConfig::from_toml_str(
            "data_dir = \"/var/lib/snapshot\"\nsweep_interval_secs = 7\n",
        )
        .unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/snapshot"));
        assert_eq!(cfg.sweep_interval(), Duration::from_secs(7));
        assert_eq!(cfg.image_dir, "images");
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = SnapshotConfig::from_toml_str("data_dir = [").unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn sweep_interval_is_clamped() {
        let fast = SnapshotConfig::new().with_sweep_interval_secs(1);
        assert_eq!(fast.sweep_interval(), Duration::from_secs(5));

        let slow = SnapshotConfig::new().with_sweep_interval_secs(600);
        assert_eq!(slow.sweep_interval(), Duration::from_secs(10));
    }

    #[test]
    fn data_dir_override_ignores_blank_values() {
        let cfg = SnapshotConfig::new().with_data_dir_override(Some("  ".into()));
        assert_eq!(cfg.data_dir, PathBuf::from("data"));

        let cfg = SnapshotConfig::new().with_data_dir_override(Some("/tmp/snap".into()));
        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/snap"));
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = SnapshotConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.image_dir, "images");
    }
}
