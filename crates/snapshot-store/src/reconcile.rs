//! Startup repair of blob/record drift.
//!
//! Any blob without a matching row is deleted. The opposite case, a row
//! whose blob is gone, is repaired lazily when the blob is read (see
//! [`ImageRecordManager::load_image`](crate::ImageRecordManager::load_image)).

use tracing::{debug, info, warn};

use crate::blob::BlobStore;
use crate::error::{StoreError, StoreResult};
use crate::record::RecordStore;

/// Outcome of one orphan sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Number of blob keys examined.
    pub scanned: usize,
    /// Orphan blobs that were deleted.
    pub removed: Vec<String>,
    /// Orphan blobs that could not be deleted; retried on the next sweep.
    pub failed: Vec<String>,
}

impl SweepReport {
    /// True when the sweep found nothing to do.
    pub fn is_clean(&self) -> bool {
        self.removed.is_empty() && self.failed.is_empty()
    }
}

/// Delete every blob that has no row in `records`.
///
/// A record store failure aborts the sweep: without an answer we cannot
/// tell an orphan from a live image. A row that exists but cannot be decoded
/// still counts as a match.
pub fn remove_orphan_blobs<B, R>(blobs: &B, records: &R) -> StoreResult<SweepReport>
where
    B: BlobStore + ?Sized,
    R: RecordStore + ?Sized,
{
    let keys = blobs.list_keys()?;
    let mut report = SweepReport {
        scanned: keys.len(),
        ..SweepReport::default()
    };

    for key in keys {
        match records.get_by_key(&key) {
            Ok(Some(_)) | Err(StoreError::Parse { .. }) => continue,
            Ok(None) => {}
            Err(err) => return Err(err),
        }

        match blobs.delete(&key) {
            Ok(()) => {
                debug!(file_name = %key, "removed orphan blob");
                report.removed.push(key);
            }
            // Already gone; nothing left to repair.
            Err(err) if err.is_not_found() => {}
            Err(err) => {
                warn!(file_name = %key, %err, "failed to remove orphan blob");
                report.failed.push(key);
            }
        }
    }

    if report.is_clean() {
        debug!(scanned = report.scanned, "no orphan blobs");
    } else {
        info!(
            scanned = report.scanned,
            removed = report.removed.len(),
            failed = report.failed.len(),
            "orphan sweep finished"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use crate::db::Database;
    use crate::record::{ImageRecord, SqliteRecordStore};
    use chrono::Utc;

    fn stores() -> (MemoryBlobStore, SqliteRecordStore) {
        let records = SqliteRecordStore::new(Database::open_in_memory().unwrap());
        records.initialize().unwrap();
        (MemoryBlobStore::new(), records)
    }

    #[test]
    fn removes_only_unmatched_blobs() {
        let (blobs, records) = stores();
        blobs.write("kept.jpg", b"k").unwrap();
        blobs.write("orphan.jpg", b"o").unwrap();
        records
            .insert(&ImageRecord::new("kept.jpg", Utc::now()))
            .unwrap();

        let report = remove_orphan_blobs(&blobs, &records).unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.removed, vec!["orphan.jpg"]);
        assert!(blobs.contains("kept.jpg"));
        assert!(!blobs.contains("orphan.jpg"));
    }

    #[test]
    fn second_sweep_changes_nothing() {
        let (blobs, records) = stores();
        blobs.write("orphan.jpg", b"o").unwrap();

        assert!(!remove_orphan_blobs(&blobs, &records).unwrap().is_clean());
        let again = remove_orphan_blobs(&blobs, &records).unwrap();
        assert!(again.is_clean());
        assert_eq!(again.scanned, 0);
    }

    #[test]
    fn rows_without_blobs_are_left_alone() {
        let (blobs, records) = stores();
        records
            .insert(&ImageRecord::new("rowonly.jpg", Utc::now()))
            .unwrap();

        let report = remove_orphan_blobs(&blobs, &records).unwrap();
        assert!(report.is_clean());
        assert!(records.get_by_key("rowonly.jpg").unwrap().is_some());
    }
}
