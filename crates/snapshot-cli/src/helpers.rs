//! Shared helper functions used across CLI subcommands.
//!
//! Includes tracing initialization, configuration loading and listing
//! output.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use snapshot_store::{ImageRecord, SnapshotConfig, timestamp};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Load the config file named on the command line and apply `--data-dir`.
pub fn load_config(cli: &Cli) -> Result<SnapshotConfig> {
    let config = SnapshotConfig::load(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;
    Ok(apply_data_dir_flag(config, cli.data_dir.clone()))
}

fn apply_data_dir_flag(config: SnapshotConfig, data_dir: Option<PathBuf>) -> SnapshotConfig {
    match data_dir {
        Some(dir) => config.with_data_dir(dir),
        None => config,
    }
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// One row of `list` output.
#[derive(Debug, Serialize)]
pub struct ListEntry {
    pub file_name: String,
    pub expire_at: DateTime<Utc>,
    pub remaining: String,
}

impl ListEntry {
    pub fn from_record(record: &ImageRecord, now: DateTime<Utc>) -> Self {
        Self {
            file_name: record.file_name.clone(),
            expire_at: record.expire_at,
            remaining: record.remaining_text(now),
        }
    }
}

/// Render records as an aligned text table.
pub fn render_table(records: &[ImageRecord], now: DateTime<Utc>) -> String {
    if records.is_empty() {
        return "No images stored.\n".to_string();
    }

    let width = records
        .iter()
        .map(|r| r.file_name.len())
        .max()
        .unwrap_or(0)
        .max("FILE".len());

    let mut out = format!("{:<width$}  {:<23}  {}\n", "FILE", "EXPIRES", "REMAINING");
    for record in records {
        out.push_str(&format!(
            "{:<width$}  {:<23}  {}\n",
            record.file_name,
            timestamp::display(record.expire_at),
            record.remaining_text(now),
        ));
    }
    out
}

/// Render records as a JSON array.
pub fn render_json(records: &[ImageRecord], now: DateTime<Utc>) -> Result<String> {
    let entries: Vec<ListEntry> = records
        .iter()
        .map(|r| ListEntry::from_record(r, now))
        .collect();
    serde_json::to_string_pretty(&entries).context("failed to serialize image list")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
    }

    #[test]
    fn empty_table_says_so() {
        assert_eq!(render_table(&[], now()), "No images stored.\n");
    }

    #[test]
    fn table_lists_each_record() {
        let records = vec![
            ImageRecord::new("image-a.jpg", now() + TimeDelta::hours(2)),
            ImageRecord::new("image-b.jpg", now() - TimeDelta::hours(1)),
        ];
        let table = render_table(&records, now());
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("FILE"));
        assert!(lines[1].contains("2026-10-18 14:00:00 UTC"));
        assert!(lines[1].ends_with("Expires in 2 hours"));
        assert!(lines[2].ends_with("Expired"));
    }

    #[test]
    fn json_output_has_no_selection_state() {
        let mut record = ImageRecord::new("image-a.jpg", now() + TimeDelta::days(1));
        record.selected = true;

        let json = render_json(&[record], now()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["file_name"], "image-a.jpg");
        assert_eq!(value[0]["remaining"], "Expires in 1 day");
        assert!(value[0].get("selected").is_none());
    }

    #[test]
    fn data_dir_flag_wins() {
        let config = apply_data_dir_flag(SnapshotConfig::new(), Some(PathBuf::from("/srv/snap")));
        assert_eq!(config.data_dir, PathBuf::from("/srv/snap"));

        let config = apply_data_dir_flag(SnapshotConfig::new(), None);
        assert_eq!(config.data_dir, PathBuf::from("data"));
    }
}
