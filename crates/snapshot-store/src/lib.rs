//! # snapshot-store
//!
//! Expiring image storage for Snapshot.
//!
//! Each saved image is a blob file plus a row holding its expiry instant.
//! [`ImageRecordManager`] keeps the two in step, purges expired images on
//! demand or from an [`ExpirySweeper`], and removes stray blob files at
//! startup.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  ExpirySweeper (tokio interval, optional)    │
//! ├──────────────────────────────────────────────┤
//! │  ImageRecordManager (cache + save/delete     │
//! │  protocol + expiry + selection)              │
//! ├──────────────────────┬───────────────────────┤
//! │  BlobStore           │  RecordStore          │
//! │  (FsBlobStore)       │  (SqliteRecordStore)  │
//! │                      │  Database + migrations│
//! └──────────────────────┴───────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use snapshot_store::{ExpiryRequest, FsImageManager, SnapshotConfig, TimeUnit};
//!
//! let config = SnapshotConfig::load("snapshot.toml")?;
//! let mut images = FsImageManager::open(&config);
//! let report = images.setup(); // storage failures show up as `report.degraded`
//! let record = images.save_for(&bytes, &ExpiryRequest::For { amount: 3, unit: TimeUnit::Days })?;
//! images.expire_now();
//! ```

pub mod blob;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod expiry;
pub mod manager;
pub mod migration;
pub mod naming;
pub mod reconcile;
pub mod record;
pub mod sweeper;
pub mod timestamp;

// ── re-exports ───────────────────────────────────────────────────────

pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SnapshotConfig;
pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use expiry::{ExpiryRequest, TimeUnit};
pub use manager::{DeleteReport, FsImageManager, ImageRecordManager, SetupReport};
pub use naming::FileNameGenerator;
pub use reconcile::SweepReport;
pub use record::{ImageRecord, RecordStore, SqliteRecordStore};
pub use sweeper::{ExpirySweeper, SharedManager};
