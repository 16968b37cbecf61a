//! SQLite database setup with WAL mode and durability pragmas.
//!
//! The [`Database`] struct wraps a `rusqlite::Connection` behind an
//! `Arc<Mutex<>>` and exposes a synchronous closure API. Every operation in
//! this crate runs on the caller's context; the mutex only exists so that a
//! manager can be handed to the background expiry sweeper.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::migration;

/// Shareable handle to a SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a database at `path` and apply pragmas.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening database");

        let conn = Connection::open(path)?;
        Self::apply_pragmas(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory database. Used by tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        debug!("opening in-memory database");

        let conn = Connection::open_in_memory()?;
        Self::apply_pragmas(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open the database and run all pending migrations.
    pub fn open_and_migrate(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db = Self::open(path)?;
        db.run_migrations()?;
        Ok(db)
    }

    /// Bring the schema up to date. Safe to call on every startup.
    pub fn run_migrations(&self) -> StoreResult<()> {
        self.execute_mut(migration::run_all)
    }

    /// Execute a closure against the connection.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let count: i64 = db.execute(|conn| {
    ///     let count = conn.query_row("SELECT count(*) FROM saved_images", [], |row| row.get(0))?;
    ///     Ok(count)
    /// })?;
    /// ```
    pub fn execute<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::TaskJoin(format!("mutex poisoned: {e}")))?;
        f(&conn)
    }

    /// Execute a closure that needs `&mut Connection`, e.g. to open a
    /// [`rusqlite::Transaction`].
    pub fn execute_mut<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::TaskJoin(format!("mutex poisoned: {e}")))?;
        f(&mut conn)
    }

    // ── pragmas ──────────────────────────────────────────────────────

    fn apply_pragmas(conn: &Connection) -> StoreResult<()> {
        debug!("applying SQLite pragmas");

        // WAL mode: a crash mid-write never leaves a torn row behind.
        conn.pragma_update(None, "journal_mode", "WAL")?;

        // NORMAL sync is safe with WAL; we only lose the last transaction
        // on a power failure, not corruption.
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        conn.pragma_update(None, "temp_store", "MEMORY")?;

        // Wait for a competing writer instead of failing immediately.
        conn.pragma_update(None, "busy_timeout", 5_000_i32)?;

        debug!("database pragmas applied (WAL, synchronous=NORMAL)");
        Ok(())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_works() {
        let db = Database::open_in_memory().unwrap();
        let version: String = db
            .execute(|conn| {
                let v: String =
                    conn.query_row("SELECT sqlite_version()", [], |row| row.get(0))?;
                Ok(v)
            })
            .unwrap();
        assert!(!version.is_empty());
    }

    #[test]
    fn migrations_run_on_fresh_db() {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().unwrap();

        let count: i64 = db
            .execute(|conn| {
                let c: i64 =
                    conn.query_row("SELECT count(*) FROM saved_images", [], |row| row.get(0))?;
                Ok(c)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn open_and_migrate_on_disk_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database.sqlite");

        drop(Database::open_and_migrate(&path).unwrap());
        let db = Database::open_and_migrate(&path).unwrap();

        let journal: String = db
            .execute(|conn| {
                let v: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
                Ok(v)
            })
            .unwrap();
        assert_eq!(journal.to_lowercase(), "wal");
    }
}
