//! Historical chart reads and version diffs.
//!
//! # Responsibility
//! - Rebuild "what was new in version X" from full-snapshot payloads.
//! - Expose per-tooth and per-version audit trails.
//!
//! # Invariants
//! - Diffs compare full snapshots only, never individual change events.
//! - The predecessor of a snapshot is the previous snapshot of the same
//!   patient in `(recorded_at, seq)` order.

use crate::model::chart::ToothCode;
use crate::model::history::HistoryEntry;
use crate::model::projection::{ChartProjection, VersionDiff, VersionedDiagnosis};
use crate::model::{PatientId, VersionId};
use crate::repo::chart_repo::{ChartRepository, SqliteChartRepository};
use crate::repo::history_repo::{HistoryLog, SqliteHistoryLog};
use crate::repo::RepoError;
use crate::service::{ChartContext, ChartResult, MissingReference};
use rusqlite::Connection;
use std::collections::BTreeSet;

pub struct HistoryService<'conn> {
    conn: &'conn Connection,
    ctx: ChartContext,
}

impl<'conn> HistoryService<'conn> {
    pub fn new(conn: &'conn Connection, ctx: ChartContext) -> Self {
        Self { conn, ctx }
    }

    /// Diffs the snapshot written by `version_id` against its predecessor.
    pub fn get_version_diff(
        &self,
        patient_id: PatientId,
        version_id: VersionId,
    ) -> ChartResult<VersionDiff> {
        self.ctx.ensure_patient(patient_id)?;
        let history = SqliteHistoryLog::new(self.conn);
        let target = history
            .snapshot_for_version(patient_id, version_id)?
            .ok_or(MissingReference::Version(version_id))?;
        self.diff_entry(&history, patient_id, &target)
    }

    /// Diff of the newest snapshot, or `None` before the first write.
    pub fn latest_version_diff(&self, patient_id: PatientId) -> ChartResult<Option<VersionDiff>> {
        self.ctx.ensure_patient(patient_id)?;
        let history = SqliteHistoryLog::new(self.conn);
        match history.latest_snapshot(patient_id)? {
            Some(target) => Ok(Some(self.diff_entry(&history, patient_id, &target)?)),
            None => Ok(None),
        }
    }

    /// Every history entry anchored to one tooth, oldest first.
    pub fn tooth_history(
        &self,
        patient_id: PatientId,
        code: &str,
    ) -> ChartResult<Vec<HistoryEntry>> {
        let code = ToothCode::parse(code)?;
        self.ctx.ensure_patient(patient_id)?;
        let tooth = SqliteChartRepository::new(self.conn)
            .find_tooth(patient_id, &code)?
            .ok_or_else(|| MissingReference::Tooth(code.to_string()))?;
        Ok(SqliteHistoryLog::new(self.conn).entries_for_tooth(tooth.id)?)
    }

    /// Every entry written by one logical write; empty for unknown versions.
    pub fn version_entries(&self, version_id: VersionId) -> ChartResult<Vec<HistoryEntry>> {
        Ok(SqliteHistoryLog::new(self.conn).entries_by_version(version_id)?)
    }

    fn diff_entry(
        &self,
        history: &impl HistoryLog,
        patient_id: PatientId,
        target: &HistoryEntry,
    ) -> ChartResult<VersionDiff> {
        let target_chart = snapshot_chart(target)?;
        let predecessor = history.snapshot_preceding(patient_id, target)?;
        let predecessor_chart = predecessor.as_ref().map(snapshot_chart).transpose()?;

        Ok(VersionDiff {
            version_id: target
                .version_id
                .ok_or_else(|| RepoError::InvalidData("snapshot entry without version".into()))?,
            snapshot_at: target.recorded_at,
            predecessor_version_id: predecessor.as_ref().and_then(|entry| entry.version_id),
            diagnoses: diff_snapshots(target_chart, predecessor_chart),
        })
    }
}

fn snapshot_chart(entry: &HistoryEntry) -> ChartResult<&ChartProjection> {
    entry.change.snapshot().ok_or_else(|| {
        RepoError::InvalidData(format!("history entry {} is not a full snapshot", entry.seq)).into()
    })
}

/// Annotates every diagnosis of `target` with whether its id is absent from
/// `predecessor`. With no predecessor everything is new.
pub fn diff_snapshots(
    target: &ChartProjection,
    predecessor: Option<&ChartProjection>,
) -> Vec<VersionedDiagnosis> {
    let previous_ids = predecessor
        .map(ChartProjection::instance_ids)
        .unwrap_or_else(BTreeSet::new);

    target
        .iter()
        .map(|(tooth_code, surface, diagnosis)| VersionedDiagnosis {
            tooth_code: tooth_code.clone(),
            surface,
            diagnosis: diagnosis.clone(),
            is_new: !previous_ids.contains(&diagnosis.id),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::diff_snapshots;
    use crate::model::chart::{SurfaceName, ToothCode};
    use crate::model::diagnosis::{AttributeMap, TreatmentState};
    use crate::model::projection::{ChartProjection, EnrichedDiagnosis};
    use uuid::Uuid;

    fn diagnosis() -> EnrichedDiagnosis {
        EnrichedDiagnosis {
            id: Uuid::new_v4(),
            catalog_key: "caries_icdas_3".to_string(),
            name: "Caries".to_string(),
            siglas: String::new(),
            color: String::new(),
            category: String::new(),
            priority: Some(4),
            applicable_areas: Vec::new(),
            attributes: AttributeMap::new(),
            description: String::new(),
            treatment_state: TreatmentState::Diagnosed,
            treated_at: None,
            clinician_id: Uuid::nil(),
            created_at: 0,
        }
    }

    #[test]
    fn without_predecessor_everything_is_new() {
        let mut target = ChartProjection::new();
        target.push(ToothCode::parse("16").unwrap(), SurfaceName::Oclusal, diagnosis());
        target.push(ToothCode::parse("17").unwrap(), SurfaceName::Distal, diagnosis());

        let diff = diff_snapshots(&target, None);
        assert_eq!(diff.len(), 2);
        assert!(diff.iter().all(|entry| entry.is_new));
    }

    #[test]
    fn only_ids_missing_from_predecessor_are_new() {
        let kept = diagnosis();
        let removed = diagnosis();
        let added = diagnosis();
        let tooth = ToothCode::parse("16").unwrap();

        let mut previous = ChartProjection::new();
        previous.push(tooth.clone(), SurfaceName::Oclusal, kept.clone());
        previous.push(tooth.clone(), SurfaceName::Mesial, removed);

        let mut modified_kept = kept.clone();
        modified_kept.description = "updated".to_string();
        let mut target = ChartProjection::new();
        target.push(tooth.clone(), SurfaceName::Oclusal, modified_kept);
        target.push(tooth, SurfaceName::Oclusal, added.clone());

        let diff = diff_snapshots(&target, Some(&previous));
        let new_ids: Vec<_> = diff
            .iter()
            .filter(|entry| entry.is_new)
            .map(|entry| entry.diagnosis.id)
            .collect();
        assert_eq!(new_ids, vec![added.id]);
        assert_eq!(diff.len(), 2);
    }
}
