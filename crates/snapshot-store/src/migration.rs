//! Schema versioning.
//!
//! The schema version lives in SQLite's `user_version` header field. Each
//! entry of [`SCHEMA`] moves the database up one version and is applied in
//! its own immediate transaction together with the version bump, so an
//! interrupted upgrade leaves the database at the previous version.

use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};

/// Upgrade steps. Entry `i` moves the schema from version `i` to `i + 1`.
/// Only ever append.
static SCHEMA: &[&str] = &[
    // v1: one row per stored image. expire_at is epoch milliseconds, UTC.
    "CREATE TABLE saved_images (
         image_file  TEXT PRIMARY KEY NOT NULL,
         expire_at   INTEGER NOT NULL
     );
     CREATE INDEX idx_saved_images_expire_at ON saved_images(expire_at);",
];

/// Version a fully upgraded database reports.
pub fn latest_version() -> u32 {
    SCHEMA.len() as u32
}

/// Version recorded in the database header; 0 for a fresh file.
pub fn current_version(conn: &Connection) -> StoreResult<u32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| StoreError::Migration {
            version: 0,
            message: format!("failed to read schema version: {e}"),
        })
}

/// Bring the schema up to [`latest_version`]. Safe to call on every startup.
pub fn run_all(conn: &mut Connection) -> StoreResult<()> {
    let current = current_version(conn)?;
    let latest = latest_version();

    if current > latest {
        warn!(current, latest, "database schema is newer than this build, leaving it alone");
        return Ok(());
    }
    if current == latest {
        debug!(version = current, "database schema is up to date");
        return Ok(());
    }

    for (version, sql) in (1..).zip(SCHEMA).skip(current as usize) {
        upgrade(conn, version, sql)?;
    }
    info!(from = current, to = latest, "database schema upgraded");
    Ok(())
}

fn upgrade(conn: &mut Connection, version: u32, sql: &str) -> StoreResult<()> {
    let fail = |message: String| StoreError::Migration { version, message };

    // Dropping `tx` on any early return rolls the step back.
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| fail(format!("failed to begin transaction: {e}")))?;
    tx.execute_batch(sql)
        .map_err(|e| fail(format!("SQL execution failed: {e}")))?;
    tx.pragma_update(None, "user_version", version)
        .map_err(|e| fail(format!("failed to record version: {e}")))?;
    tx.commit()
        .map_err(|e| fail(format!("failed to commit: {e}")))?;

    debug!(version, "schema step applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_is_upgraded_to_latest() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(current_version(&conn).unwrap(), 0);

        run_all(&mut conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), latest_version());
        assert_eq!(latest_version(), 1);
    }

    #[test]
    fn run_all_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_all(&mut conn).unwrap();
        run_all(&mut conn).unwrap();

        assert_eq!(current_version(&conn).unwrap(), latest_version());
    }

    #[test]
    fn failed_step_rolls_back_and_keeps_version() {
        let mut conn = Connection::open_in_memory().unwrap();

        let err = upgrade(&mut conn, 1, "CREATE TABLE half_done (x); NOT VALID SQL;").unwrap_err();
        assert!(matches!(err, StoreError::Migration { version: 1, .. }));

        assert_eq!(current_version(&conn).unwrap(), 0);
        let tables: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE name = 'half_done'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 0);
    }

    #[test]
    fn newer_schema_is_left_untouched() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", 99_u32).unwrap();

        run_all(&mut conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), 99);
    }

    #[test]
    fn saved_images_rejects_duplicate_file_names() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_all(&mut conn).unwrap();

        conn.execute(
            "INSERT INTO saved_images (image_file, expire_at) VALUES ('a.jpg', 0)",
            [],
        )
        .unwrap();
        let dup = conn.execute(
            "INSERT INTO saved_images (image_file, expire_at) VALUES ('a.jpg', 1)",
            [],
        );
        assert!(dup.is_err());
    }
}
