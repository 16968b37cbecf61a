//! The image record manager: the only writer of the authoritative record set.
//!
//! Every record in the cache has one blob and one row. The manager keeps it
//! that way by sequencing the two stores:
//!
//! - **save**: write the blob, then insert the row. If the insert fails the
//!   blob is deleted again, so a failed save leaves nothing behind.
//! - **delete**: remove the row, then the blob. If the row cannot be removed
//!   the blob is not touched and the record stays listed.
//!
//! The cache is rebuilt from the record store by [`ImageRecordManager::setup`]
//! and mirrors it write-through afterwards. Callers only read it through
//! [`ImageRecordManager::list`]; the `selected` flag is the one field they can
//! change, through the selection methods.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::blob::{BlobStore, FsBlobStore};
use crate::clock::{Clock, SystemClock};
use crate::config::SnapshotConfig;
use crate::error::{StoreError, StoreResult};
use crate::expiry::ExpiryRequest;
use crate::naming::FileNameGenerator;
use crate::reconcile::{self, SweepReport};
use crate::record::{ImageRecord, RecordStore, SqliteRecordStore};
use crate::timestamp;

/// The production manager: files on disk, rows in SQLite, wall-clock time.
pub type FsImageManager = ImageRecordManager<FsBlobStore, SqliteRecordStore, SystemClock>;

/// What [`ImageRecordManager::setup`] found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupReport {
    /// Records loaded into the cache.
    pub loaded: usize,
    /// Orphan blobs removed by the startup sweep.
    pub orphans_removed: usize,
    /// Storage could not be initialised; the cache is empty and writes fail.
    pub degraded: bool,
}

/// Outcome of [`ImageRecordManager::delete_selected`].
#[derive(Debug, Default)]
pub struct DeleteReport {
    /// Records fully removed.
    pub deleted: Vec<String>,
    /// Records that could not be removed, with the reason. They stay listed
    /// and selected.
    pub failed: Vec<(String, StoreError)>,
}

impl DeleteReport {
    /// Number of successful deletions.
    pub fn count(&self) -> usize {
        self.deleted.len()
    }
}

/// Orchestrates a [`BlobStore`] and a [`RecordStore`] behind one cache.
pub struct ImageRecordManager<B, R, C = SystemClock> {
    blobs: B,
    records: R,
    clock: C,
    names: FileNameGenerator,
    cache: Vec<ImageRecord>,
    ready: bool,
}

impl FsImageManager {
    /// Build a manager from configuration.
    ///
    /// Touches no storage. Creating `data_dir`, opening the database and
    /// loading the cache all happen in [`setup`](Self::setup), which degrades
    /// to an empty cache if any of them fail.
    pub fn open(config: &SnapshotConfig) -> Self {
        Self::new(
            FsBlobStore::new(config.image_path()),
            SqliteRecordStore::at_path(config.database_path()),
            SystemClock,
            FileNameGenerator::new(config.file_extension.clone()),
        )
    }
}

impl<B, R, C> ImageRecordManager<B, R, C>
where
    B: BlobStore,
    R: RecordStore,
    C: Clock,
{
    /// Assemble a manager. Nothing is read until [`setup`](Self::setup).
    pub fn new(blobs: B, records: R, clock: C, names: FileNameGenerator) -> Self {
        Self {
            blobs,
            records,
            clock,
            names,
            cache: Vec::new(),
            ready: false,
        }
    }

    // ── lifecycle ────────────────────────────────────────────────────

    /// Prepare both stores, load every record and remove orphan blobs.
    ///
    /// Storage failures are logged and leave an empty cache rather than an
    /// error, so the caller can always start.
    pub fn setup(&mut self) -> SetupReport {
        self.cache.clear();
        self.ready = false;

        if let Err(err) = self.blobs.ensure_ready() {
            error!(%err, "blob store unavailable, starting with no images");
            return SetupReport {
                degraded: true,
                ..SetupReport::default()
            };
        }

        if let Err(err) = self.records.initialize() {
            error!(%err, "record store unavailable, starting with no images");
            return SetupReport {
                degraded: true,
                ..SetupReport::default()
            };
        }

        match self.records.get_all() {
            Ok(records) => {
                self.cache = records
                    .into_iter()
                    .map(|mut record| {
                        record.selected = false;
                        record
                    })
                    .collect();
            }
            Err(err) => {
                error!(%err, "failed to load image records, starting with no images");
                return SetupReport {
                    degraded: true,
                    ..SetupReport::default()
                };
            }
        }
        self.ready = true;

        let orphans_removed = match self.reconcile() {
            Ok(report) => report.removed.len(),
            Err(err) => {
                warn!(%err, "orphan sweep failed, will retry on next startup");
                0
            }
        };

        info!(
            loaded = self.cache.len(),
            orphans_removed, "image store ready"
        );
        SetupReport {
            loaded: self.cache.len(),
            orphans_removed,
            degraded: false,
        }
    }

    /// Stop serving: drop the cache and refuse further writes until the next
    /// [`setup`](Self::setup).
    pub fn teardown(&mut self) {
        self.cache.clear();
        self.ready = false;
        debug!("image store torn down");
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    fn ensure_ready(&self) -> StoreResult<()> {
        if self.ready {
            Ok(())
        } else {
            Err(StoreError::InvalidArgument(
                "image store is not set up".into(),
            ))
        }
    }

    /// Delete blobs that have no record.
    pub fn reconcile(&mut self) -> StoreResult<SweepReport> {
        self.ensure_ready()?;
        reconcile::remove_orphan_blobs(&self.blobs, &self.records)
    }

    // ── reads ────────────────────────────────────────────────────────

    /// Current records, in load/save order. No I/O.
    pub fn list(&self) -> &[ImageRecord] {
        &self.cache
    }

    pub fn get(&self, file_name: &str) -> Option<&ImageRecord> {
        self.cache.iter().find(|r| r.file_name == file_name)
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Read an image's bytes.
    ///
    /// If the record exists but its blob is gone, the stale row is deleted
    /// and the record dropped from the cache before `NotFound` is returned.
    pub fn load_image(&mut self, file_name: &str) -> StoreResult<Vec<u8>> {
        self.ensure_ready()?;
        match self.blobs.read(file_name) {
            Err(err) if err.is_not_found() => {
                if self.position(file_name).is_some() {
                    warn!(file_name, "blob missing for record, dropping stale row");
                    match self.records.delete_by_key(file_name) {
                        Ok(()) => {}
                        Err(e) if e.is_not_found() => {}
                        Err(e) => return Err(e),
                    }
                    self.remove_cached(file_name);
                }
                Err(err)
            }
            other => other,
        }
    }

    // ── writes ───────────────────────────────────────────────────────

    /// Store `bytes` under a fresh key that expires at `expire_at`.
    pub fn save(&mut self, bytes: &[u8], expire_at: DateTime<Utc>) -> StoreResult<ImageRecord> {
        self.ensure_ready()?;
        let file_name = self.names.next_name(self.clock.now());
        self.save_as(file_name, bytes, expire_at)
    }

    /// Resolve `request` against the clock, then [`save`](Self::save).
    pub fn save_for(
        &mut self,
        bytes: &[u8],
        request: &ExpiryRequest,
    ) -> StoreResult<ImageRecord> {
        let expire_at = request.resolve(self.clock.now())?;
        self.save(bytes, expire_at)
    }

    fn save_as(
        &mut self,
        file_name: String,
        bytes: &[u8],
        expire_at: DateTime<Utc>,
    ) -> StoreResult<ImageRecord> {
        self.ensure_ready()?;

        // Checked before the blob write so an existing image is never
        // overwritten. A row that exists but cannot be decoded still counts.
        let row_exists = match self.records.get_by_key(&file_name) {
            Ok(row) => row.is_some(),
            Err(StoreError::Parse { .. }) => true,
            Err(err) => return Err(err),
        };
        if row_exists || self.position(&file_name).is_some() {
            return Err(StoreError::DuplicateKey { file_name });
        }

        let record = ImageRecord::new(file_name, timestamp::normalize(expire_at));

        self.blobs.write(&record.file_name, bytes)?;

        if let Err(err) = self.records.insert(&record) {
            match self.blobs.delete(&record.file_name) {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    warn!(file_name = %record.file_name, err = %e, "rollback of blob failed")
                }
            }
            warn!(file_name = %record.file_name, %err, "save rolled back");
            return Err(err);
        }

        info!(
            file_name = %record.file_name,
            expire_at = %timestamp::display(record.expire_at),
            "image saved"
        );
        self.cache.push(record.clone());
        Ok(record)
    }

    /// Remove a record: row first, then blob.
    ///
    /// A row or blob that is already gone is not an error. If either removal
    /// fails the record stays in the cache with its selection unchanged, and a
    /// retry picks up where this call stopped.
    pub fn delete(&mut self, file_name: &str) -> StoreResult<()> {
        self.ensure_ready()?;
        if self.position(file_name).is_none() {
            return Err(StoreError::NotFound {
                entity: "record",
                id: file_name.to_string(),
            });
        }

        match self.records.delete_by_key(file_name) {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                debug!(file_name, "row already gone");
            }
            Err(err) => {
                warn!(file_name, %err, "row delete failed, blob left in place");
                return Err(err);
            }
        }

        match self.blobs.delete(file_name) {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                debug!(file_name, "blob already gone");
            }
            Err(err) => {
                warn!(file_name, %err, "blob delete failed after row removal");
                return Err(err);
            }
        }

        self.remove_cached(file_name);
        info!(file_name, "image deleted");
        Ok(())
    }

    /// Delete every selected record. Each one is attempted independently.
    pub fn delete_selected(&mut self) -> DeleteReport {
        // Keys are collected back to front before anything is removed.
        let targets: Vec<String> = self
            .cache
            .iter()
            .rev()
            .filter(|r| r.selected)
            .map(|r| r.file_name.clone())
            .collect();

        let mut report = DeleteReport::default();
        for file_name in targets {
            match self.delete(&file_name) {
                Ok(()) => report.deleted.push(file_name),
                Err(err) => {
                    warn!(file_name = %file_name, %err, "selected image not deleted");
                    report.failed.push((file_name, err));
                }
            }
        }

        info!(
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "bulk delete finished"
        );
        report
    }

    /// Delete every record whose expiry is strictly before now.
    ///
    /// Returns the keys that were removed. Records that fail to delete stay
    /// listed and are retried on the next sweep.
    pub fn expire_now(&mut self) -> Vec<String> {
        if !self.ready {
            return Vec::new();
        }
        let now = self.clock.now();
        let expired: Vec<String> = self
            .cache
            .iter()
            .rev()
            .filter(|r| r.is_expired(now))
            .map(|r| r.file_name.clone())
            .collect();

        let mut removed = Vec::with_capacity(expired.len());
        for file_name in expired {
            match self.delete(&file_name) {
                Ok(()) => removed.push(file_name),
                Err(err) => warn!(file_name = %file_name, %err, "expired image not deleted"),
            }
        }

        if !removed.is_empty() {
            info!(count = removed.len(), "expired images removed");
        }
        removed
    }

    // ── selection ────────────────────────────────────────────────────

    pub fn selected_count(&self) -> usize {
        self.cache.iter().filter(|r| r.selected).count()
    }

    /// Set the selection flag. Returns `false` if no such record is cached.
    pub fn set_selected(&mut self, file_name: &str, selected: bool) -> bool {
        match self.cache.iter_mut().find(|r| r.file_name == file_name) {
            Some(record) => {
                record.selected = selected;
                true
            }
            None => false,
        }
    }

    /// Flip the selection flag, returning the new value.
    pub fn toggle_selected(&mut self, file_name: &str) -> Option<bool> {
        let record = self.cache.iter_mut().find(|r| r.file_name == file_name)?;
        record.selected = !record.selected;
        Some(record.selected)
    }

    pub fn clear_selection(&mut self) {
        for record in &mut self.cache {
            record.selected = false;
        }
    }

    // ── internals ────────────────────────────────────────────────────

    fn position(&self, file_name: &str) -> Option<usize> {
        self.cache.iter().position(|r| r.file_name == file_name)
    }

    fn remove_cached(&mut self, file_name: &str) {
        if let Some(index) = self.position(file_name) {
            self.cache.remove(index);
        }
    }
}

impl<B, R, C> std::fmt::Debug for ImageRecordManager<B, R, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageRecordManager")
            .field("records", &self.cache.len())
            .field("ready", &self.ready)
            .finish_non_exhaustive()
    }
}

// ── tests ────────────────────────────────────────────────────────────
