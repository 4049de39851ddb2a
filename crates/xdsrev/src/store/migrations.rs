//! Schema versions of the record store.
//!
//! Applied versions are tracked in `_migrations`. Each pending step runs in
//! its own transaction together with its bookkeeping row, so a failed step
//! leaves the file at the previous version.

use rusqlite::Connection;

use super::error::StoreError;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "create_records_table",
    sql: include_str!("sql/001_create_records.sql"),
}];

/// Brings the schema on `conn` up to the latest version.
pub fn run_all(conn: &mut Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current = schema_version(conn)?;
    let latest = MIGRATIONS.last().map(|m| m.version).unwrap_or(0);
    if current > latest {
        return Err(StoreError::Migration {
            version: current,
            reason: format!("database schema is newer than this build (v{})", latest),
        });
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        log::info!(
            "Applying schema v{}: {}",
            migration.version,
            migration.description
        );

        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql)
            .map_err(|e| StoreError::Migration {
                version: migration.version,
                reason: e.to_string(),
            })?;
        tx.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
        tx.commit()?;
    }

    Ok(())
}

fn schema_version(conn: &Connection) -> Result<u32, StoreError> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?)
}
