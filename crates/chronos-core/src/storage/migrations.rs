//! Database schema migrations for chronos.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn)?;

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> SqliteResult<i32> {
    match conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    }) {
        Ok(v) => Ok(v),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
        Err(e) => Err(e),
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: cycle records.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS cycles (
            id                      TEXT PRIMARY KEY,
            activity_id             TEXT NOT NULL,
            status                  TEXT NOT NULL,
            is_break                INTEGER NOT NULL DEFAULT 0,
            current_cycle_index     INTEGER NOT NULL DEFAULT 1,
            target_cycles           INTEGER NOT NULL,
            focus_duration_minutes  INTEGER NOT NULL,
            rest_duration_minutes   INTEGER NOT NULL,
            sessions                TEXT NOT NULL DEFAULT '[]',
            started_at              TEXT,
            last_checkpoint_remaining_seconds INTEGER,
            last_checkpoint_at      TEXT,
            created_at              TEXT NOT NULL,
            updated_at              TEXT NOT NULL,
            completed_at            TEXT
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_cycles_activity ON cycles(activity_id);",
    )?;
    set_schema_version(&tx, 1)?;
    tx.commit()
}

/// Migration v2: accrued phase metrics and the cleanup index.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "ALTER TABLE cycles ADD COLUMN total_focus_seconds INTEGER NOT NULL DEFAULT 0;
         ALTER TABLE cycles ADD COLUMN total_break_seconds INTEGER NOT NULL DEFAULT 0;
         CREATE INDEX IF NOT EXISTS idx_cycles_status_completed ON cycles(status, completed_at);",
    )?;
    set_schema_version(&tx, 2)?;
    tx.commit()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_fresh_database_to_latest() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
        let cols: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('cycles') WHERE name = 'total_focus_seconds'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(cols, 1);
    }
}
