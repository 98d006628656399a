//! Chart schema migrations.
//!
//! Steps are numbered from 1 and applied in one transaction. The number of
//! the last applied step is stored in `PRAGMA user_version`.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

/// One schema step: `(name, sql)`. Its version is its 1-based position.
const STEPS: &[(&str, &str)] = &[
    ("chart_hierarchy", include_str!("0001_chart_hierarchy.sql")),
    ("history_log", include_str!("0002_history_log.sql")),
];

/// Schema version produced by applying every known step.
pub fn latest_version() -> u32 {
    STEPS.len() as u32
}

/// Brings the schema up to `latest_version()`.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the file was written by a newer engine.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let stored: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let latest = latest_version();
    if stored > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: stored,
            latest_supported: latest,
        });
    }

    let pending: Vec<(u32, &str, &str)> = STEPS
        .iter()
        .zip(1u32..)
        .filter(|(_, version)| *version > stored)
        .map(|((name, sql), version)| (version, *name, *sql))
        .collect();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for &(version, name, sql) in &pending {
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version)?;
        info!("event=db_migrate module=db status=ok version={version} step={name}");
    }
    tx.commit()?;
    Ok(())
}
