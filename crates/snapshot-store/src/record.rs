//! Image records and their SQLite-backed store.
//!
//! A record pairs a blob key (`image_file`) with the instant it expires.
//! [`SqliteRecordStore`] persists one row per record in the `saved_images`
//! table; the `selected` flag never reaches the database.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use rusqlite::ErrorCode;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};
use crate::expiry;
use crate::timestamp;

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// A saved image as tracked by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRecord {
    /// Blob key, unique across live records.
    pub file_name: String,
    /// Instant (UTC, millisecond precision) after which the image is purged.
    pub expire_at: DateTime<Utc>,
    /// UI selection state. Only lives in the in-memory cache.
    #[serde(skip)]
    pub selected: bool,
}

impl ImageRecord {
    /// Create an unselected record.
    pub fn new(file_name: impl Into<String>, expire_at: DateTime<Utc>) -> Self {
        Self {
            file_name: file_name.into(),
            expire_at,
            selected: false,
        }
    }

    /// Expired means strictly before `now`; a record expiring exactly now stays.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire_at < now
    }

    /// Human-readable time left, e.g. `Expires in 2 hours`.
    pub fn remaining_text(&self, now: DateTime<Utc>) -> String {
        expiry::remaining_text(self.expire_at, now)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  RecordStore
// ═══════════════════════════════════════════════════════════════════════

/// Durable `(file_name, expire_at)` rows.
pub trait RecordStore: Send {
    /// Open the backing store and make sure the schema exists. Idempotent.
    fn initialize(&self) -> StoreResult<()>;

    /// Add a row. Fails with [`StoreError::DuplicateKey`] if the key exists.
    fn insert(&self, record: &ImageRecord) -> StoreResult<()>;

    /// Remove a row. Fails with [`StoreError::NotFound`] if it is absent.
    fn delete_by_key(&self, file_name: &str) -> StoreResult<()>;

    fn get_by_key(&self, file_name: &str) -> StoreResult<Option<ImageRecord>>;

    /// Every row, in insertion order.
    fn get_all(&self) -> StoreResult<Vec<ImageRecord>>;
}

/// [`RecordStore`] over the `saved_images` SQLite table.
///
/// Clones share one connection, including one opened later by
/// [`initialize`](RecordStore::initialize).
#[derive(Clone, Debug)]
pub struct SqliteRecordStore {
    path: Option<PathBuf>,
    db: Arc<OnceLock<Database>>,
}

impl SqliteRecordStore {
    /// Create a record store backed by an already open `db`.
    pub fn new(db: Database) -> Self {
        Self {
            path: None,
            db: Arc::new(OnceLock::from(db)),
        }
    }

    /// Create a record store for the database file at `path`.
    ///
    /// Nothing is opened until [`initialize`](RecordStore::initialize), so a
    /// missing or corrupt file surfaces there instead of here.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            db: Arc::new(OnceLock::new()),
        }
    }

    fn db(&self) -> StoreResult<&Database> {
        self.db
            .get()
            .ok_or_else(|| StoreError::InvalidArgument("record store is not initialized".into()))
    }

    fn open(&self) -> StoreResult<Database> {
        let path = self.path.as_ref().ok_or_else(|| {
            StoreError::InvalidArgument("record store has no database path".into())
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::io(format!("creating data directory {}", parent.display()), e)
            })?;
        }
        Database::open_and_migrate(path)
    }

    fn decode(file_name: String, expire_millis: i64) -> StoreResult<ImageRecord> {
        let expire_at = timestamp::from_epoch_millis(expire_millis).map_err(|e| match e {
            StoreError::Parse { value, reason } => StoreError::Parse {
                value,
                reason: format!("{reason} (row {file_name})"),
            },
            other => other,
        })?;
        Ok(ImageRecord::new(file_name, expire_at))
    }
}

impl RecordStore for SqliteRecordStore {
    fn initialize(&self) -> StoreResult<()> {
        if let Some(db) = self.db.get() {
            return db.run_migrations();
        }
        // A concurrent initializer may win the race; its handle is kept.
        let _ = self.db.set(self.open()?);
        Ok(())
    }

    #[instrument(skip(self, record), fields(file_name = %record.file_name))]
    fn insert(&self, record: &ImageRecord) -> StoreResult<()> {
        let expire_at = timestamp::to_epoch_millis(record.expire_at);
        self.db()?.execute(|conn| {
            let result = conn.execute(
                "INSERT INTO saved_images (image_file, expire_at) VALUES (?1, ?2)",
                rusqlite::params![record.file_name, expire_at],
            );
            match result {
                Ok(_) => {
                    debug!("image record inserted");
                    Ok(())
                }
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    Err(StoreError::DuplicateKey {
                        file_name: record.file_name.clone(),
                    })
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    #[instrument(skip(self))]
    fn delete_by_key(&self, file_name: &str) -> StoreResult<()> {
        self.db()?.execute(|conn| {
            let deleted = conn.execute(
                "DELETE FROM saved_images WHERE image_file = ?1",
                rusqlite::params![file_name],
            )?;
            if deleted == 0 {
                return Err(StoreError::NotFound {
                    entity: "record",
                    id: file_name.to_string(),
                });
            }
            debug!("image record deleted");
            Ok(())
        })
    }

    fn get_by_key(&self, file_name: &str) -> StoreResult<Option<ImageRecord>> {
        let row = self.db()?.execute(|conn| {
            let result = conn.query_row(
                "SELECT image_file, expire_at FROM saved_images WHERE image_file = ?1",
                rusqlite::params![file_name],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            );
            match result {
                Ok(row) => Ok(Some(row)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })?;

        row.map(|(name, millis)| Self::decode(name, millis))
            .transpose()
    }

    /// Rows whose timestamp cannot be decoded are skipped with a warning so
    /// one bad row does not hide every other image.
    fn get_all(&self) -> StoreResult<Vec<ImageRecord>> {
        let rows: Vec<(String, i64)> = self.db()?.execute(|conn| {
            let mut stmt =
                conn.prepare("SELECT image_file, expire_at FROM saved_images ORDER BY rowid")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let mut records = Vec::with_capacity(rows.len());
        for (name, millis) in rows {
            match Self::decode(name, millis) {
                Ok(record) => records.push(record),
                Err(err) => warn!(%err, "skipping unreadable image record"),
            }
        }
        debug!(count = records.len(), "loaded image records");
        Ok(records)
    }
}

// ── tests ────────────────────────────────────────────────────────────
