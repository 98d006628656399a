//! Append-only history log repository.
//!
//! # Responsibility
//! - Append history entries and query them by tooth, version and snapshot
//!   position.
//!
//! # Invariants
//! - Entries are only ever inserted; UPDATE/DELETE are rejected by triggers.
//! - "Before" and "preceding" queries order by `(recorded_at, seq)` so equal
//!   timestamps still have a deterministic predecessor.

use crate::model::chart::ToothId;
use crate::model::history::{ChangeKind, HistoryEntry, NewHistoryEntry};
use crate::model::{PatientId, VersionId};
use crate::repo::{parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, Row};

const HISTORY_SELECT_SQL: &str = "SELECT
    seq,
    patient_uuid,
    tooth_uuid,
    change_kind,
    clinician_uuid,
    recorded_at,
    version_id,
    before_payload,
    after_payload,
    description
FROM history_entries";

/// Repository interface for the chart history log.
pub trait HistoryLog {
    /// Appends one entry and returns its assigned sequence number.
    fn append(&self, entry: &NewHistoryEntry) -> RepoResult<i64>;
    /// Entries anchored to one tooth, oldest first.
    fn entries_for_tooth(&self, tooth_id: ToothId) -> RepoResult<Vec<HistoryEntry>>;
    /// Entries written by one logical write, in append order.
    fn entries_by_version(&self, version_id: VersionId) -> RepoResult<Vec<HistoryEntry>>;
    fn latest_snapshot(&self, patient_id: PatientId) -> RepoResult<Option<HistoryEntry>>;
    /// Newest snapshot recorded strictly before `timestamp`.
    fn latest_snapshot_before(
        &self,
        patient_id: PatientId,
        timestamp: i64,
    ) -> RepoResult<Option<HistoryEntry>>;
    fn snapshot_for_version(
        &self,
        patient_id: PatientId,
        version_id: VersionId,
    ) -> RepoResult<Option<HistoryEntry>>;
    /// Snapshot immediately before `entry` in `(recorded_at, seq)` order.
    fn snapshot_preceding(
        &self,
        patient_id: PatientId,
        entry: &HistoryEntry,
    ) -> RepoResult<Option<HistoryEntry>>;
}

/// SQLite-backed history log.
pub struct SqliteHistoryLog<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteHistoryLog<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn query_entries(
        &self,
        filter_sql: &str,
        params: impl rusqlite::Params,
    ) -> RepoResult<Vec<HistoryEntry>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{HISTORY_SELECT_SQL} {filter_sql}"))?;
        let mut rows = stmt.query(params)?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_history_row(row)?);
        }
        Ok(entries)
    }

    fn query_one(
        &self,
        filter_sql: &str,
        params: impl rusqlite::Params,
    ) -> RepoResult<Option<HistoryEntry>> {
        Ok(self.query_entries(filter_sql, params)?.into_iter().next())
    }
}

impl HistoryLog for SqliteHistoryLog<'_> {
    fn append(&self, entry: &NewHistoryEntry) -> RepoResult<i64> {
        let encoded = entry.change.encode()?;
        self.conn.execute(
            "INSERT INTO history_entries (
                patient_uuid,
                tooth_uuid,
                change_kind,
                clinician_uuid,
                recorded_at,
                version_id,
                before_payload,
                after_payload,
                description
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                entry.patient_id.to_string(),
                entry.tooth_id.to_string(),
                encoded.kind,
                entry.clinician_id.to_string(),
                entry.recorded_at,
                entry.version_id.map(|id| id.to_string()),
                encoded.before,
                encoded.after,
                entry.description.as_str(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn entries_for_tooth(&self, tooth_id: ToothId) -> RepoResult<Vec<HistoryEntry>> {
        self.query_entries(
            "WHERE tooth_uuid = ?1 ORDER BY recorded_at ASC, seq ASC;",
            [tooth_id.to_string()],
        )
    }

    fn entries_by_version(&self, version_id: VersionId) -> RepoResult<Vec<HistoryEntry>> {
        self.query_entries(
            "WHERE version_id = ?1 ORDER BY seq ASC;",
            [version_id.to_string()],
        )
    }

    fn latest_snapshot(&self, patient_id: PatientId) -> RepoResult<Option<HistoryEntry>> {
        self.query_one(
            "WHERE patient_uuid = ?1
               AND change_kind = 'full_snapshot'
             ORDER BY recorded_at DESC, seq DESC
             LIMIT 1;",
            [patient_id.to_string()],
        )
    }

    fn latest_snapshot_before(
        &self,
        patient_id: PatientId,
        timestamp: i64,
    ) -> RepoResult<Option<HistoryEntry>> {
        self.query_one(
            "WHERE patient_uuid = ?1
               AND change_kind = 'full_snapshot'
               AND recorded_at < ?2
             ORDER BY recorded_at DESC, seq DESC
             LIMIT 1;",
            params![patient_id.to_string(), timestamp],
        )
    }

    fn snapshot_for_version(
        &self,
        patient_id: PatientId,
        version_id: VersionId,
    ) -> RepoResult<Option<HistoryEntry>> {
        self.query_one(
            "WHERE patient_uuid = ?1
               AND version_id = ?2
               AND change_kind = 'full_snapshot'
             ORDER BY seq DESC
             LIMIT 1;",
            params![patient_id.to_string(), version_id.to_string()],
        )
    }

    fn snapshot_preceding(
        &self,
        patient_id: PatientId,
        entry: &HistoryEntry,
    ) -> RepoResult<Option<HistoryEntry>> {
        self.query_one(
            "WHERE patient_uuid = ?1
               AND change_kind = 'full_snapshot'
               AND (recorded_at < ?2 OR (recorded_at = ?2 AND seq < ?3))
             ORDER BY recorded_at DESC, seq DESC
             LIMIT 1;",
            params![patient_id.to_string(), entry.recorded_at, entry.seq],
        )
    }
}

fn parse_history_row(row: &Row<'_>) -> RepoResult<HistoryEntry> {
    let patient_text: String = row.get("patient_uuid")?;
    let tooth_text: String = row.get("tooth_uuid")?;
    let clinician_text: String = row.get("clinician_uuid")?;
    let kind: String = row.get("change_kind")?;
    let before: Option<String> = row.get("before_payload")?;
    let after: Option<String> = row.get("after_payload")?;

    let change = ChangeKind::decode(&kind, before.as_deref(), after.as_deref())
        .map_err(|message| RepoError::InvalidData(format!("history_entries: {message}")))?;

    let version_id = match row.get::<_, Option<String>>("version_id")? {
        Some(value) => Some(parse_uuid(&value, "history_entries.version_id")?),
        None => None,
    };

    Ok(HistoryEntry {
        seq: row.get("seq")?,
        patient_id: parse_uuid(&patient_text, "history_entries.patient_uuid")?,
        tooth_id: parse_uuid(&tooth_text, "history_entries.tooth_uuid")?,
        change,
        clinician_id: parse_uuid(&clinician_text, "history_entries.clinician_uuid")?,
        recorded_at: row.get("recorded_at")?,
        version_id,
        description: row.get("description")?,
    })
}
