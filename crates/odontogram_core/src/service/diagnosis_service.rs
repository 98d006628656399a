//! Single-instance and batch diagnosis mutations.
//!
//! # Responsibility
//! - Mark instances treated, update fields, soft-delete one or many.
//! - Log the matching history entries inside the same transaction.
//!
//! # Invariants
//! - Only active instances can be mutated.
//! - Single-instance mutations write no snapshot.
//! - Batch soft-delete is all-or-nothing and writes exactly one snapshot.

use crate::db::begin_immediate;
use crate::model::diagnosis::{
    validate_attributes, validate_priority, DiagnosisId, DiagnosisInstance, DiagnosisUpdate,
    TreatmentState,
};
use crate::model::history::{ChangeKind, NewHistoryEntry};
use crate::model::validation::ValidationError;
use crate::model::{now_epoch_ms, ClinicianId, PatientId, VersionId};
use crate::repo::chart_repo::{ChartRepository, LocatedDiagnosis, SqliteChartRepository};
use crate::repo::history_repo::{HistoryLog, SqliteHistoryLog};
use crate::service::snapshot::{record_full_snapshot, SnapshotRequest};
use crate::service::{ChartContext, ChartResult, MissingReference};
use log::info;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

/// Result of a batch soft-delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchDeleteOutcome {
    pub deleted_count: usize,
    pub version_id: VersionId,
    pub description: String,
}

pub struct DiagnosisService<'conn> {
    conn: &'conn Connection,
    ctx: ChartContext,
}

impl<'conn> DiagnosisService<'conn> {
    pub fn new(conn: &'conn Connection, ctx: ChartContext) -> Self {
        Self { conn, ctx }
    }

    /// Sets the instance to `treated` with the current timestamp.
    ///
    /// Calling it on an already treated instance refreshes `treated_at`.
    pub fn mark_treated(
        &self,
        diagnosis_id: DiagnosisId,
        clinician_id: ClinicianId,
    ) -> ChartResult<DiagnosisInstance> {
        self.ctx.ensure_clinician(clinician_id)?;

        let tx = begin_immediate(self.conn)?;
        let charts = SqliteChartRepository::new(&tx);
        let located = load_active(&charts, diagnosis_id)?;

        let mut updated = located.instance.clone();
        updated.treatment_state = TreatmentState::Treated;
        updated.treated_at = Some(now_epoch_ms());
        charts.update_diagnosis(&updated)?;
        self.log_modified(&tx, &located, &updated, clinician_id, "treated")?;
        tx.commit()?;
        self.ctx.cache.invalidate(located.patient_id);

        info!(
            "event=diagnosis_mark_treated module=diagnosis status=ok diagnosis_id={} patient_id={}",
            diagnosis_id, located.patient_id
        );
        Ok(updated)
    }

    /// Applies a field update. Attributes are merged into the stored map.
    ///
    /// Writes history only when a field actually changed.
    pub fn update_diagnosis(
        &self,
        diagnosis_id: DiagnosisId,
        clinician_id: ClinicianId,
        update: &DiagnosisUpdate,
    ) -> ChartResult<DiagnosisInstance> {
        let priority = update.priority_override.map(validate_priority).transpose()?;
        if let Some(attributes) = update.attributes.as_ref() {
            validate_attributes(attributes)?;
        }
        self.ctx.ensure_clinician(clinician_id)?;

        let tx = begin_immediate(self.conn)?;
        let charts = SqliteChartRepository::new(&tx);
        let located = load_active(&charts, diagnosis_id)?;

        let mut updated = located.instance.clone();
        if let Some(description) = update.description.as_ref() {
            updated.description = description.clone();
        }
        if let Some(attributes) = update.attributes.as_ref() {
            updated
                .attributes
                .extend(attributes.iter().map(|(key, value)| (key.clone(), value.clone())));
        }
        if priority.is_some() {
            updated.priority_override = priority;
        }

        let changed = updated != located.instance;
        if changed {
            charts.update_diagnosis(&updated)?;
            self.log_modified(&tx, &located, &updated, clinician_id, "updated")?;
        }
        tx.commit()?;
        self.ctx.cache.invalidate(located.patient_id);

        info!(
            "event=diagnosis_update module=diagnosis status=ok diagnosis_id={} changed={}",
            diagnosis_id, changed
        );
        Ok(updated)
    }

    /// Soft-deletes one active instance and logs a `deleted` entry.
    pub fn soft_delete(
        &self,
        diagnosis_id: DiagnosisId,
        clinician_id: ClinicianId,
    ) -> ChartResult<()> {
        self.ctx.ensure_clinician(clinician_id)?;

        let tx = begin_immediate(self.conn)?;
        let charts = SqliteChartRepository::new(&tx);
        let located = load_active(&charts, diagnosis_id)?;
        charts.soft_delete_diagnosis(diagnosis_id)?;
        SqliteHistoryLog::new(&tx).append(&deleted_entry(
            &self.ctx,
            &located,
            clinician_id,
            now_epoch_ms(),
            None,
        ))?;
        tx.commit()?;
        self.ctx.cache.invalidate(located.patient_id);

        info!(
            "event=diagnosis_soft_delete module=diagnosis status=ok diagnosis_id={} patient_id={}",
            diagnosis_id, located.patient_id
        );
        Ok(())
    }

    /// Soft-deletes every listed instance of one patient under one version.
    ///
    /// Duplicate ids are ignored. Any unknown, inactive or foreign id aborts
    /// the whole batch.
    pub fn soft_delete_batch(
        &self,
        patient_id: PatientId,
        clinician_id: ClinicianId,
        diagnosis_ids: &[DiagnosisId],
    ) -> ChartResult<BatchDeleteOutcome> {
        if diagnosis_ids.is_empty() {
            return Err(ValidationError::EmptyBatch.into());
        }
        self.ctx.ensure_patient(patient_id)?;
        self.ctx.ensure_clinician(clinician_id)?;

        let tx = begin_immediate(self.conn)?;
        let charts = SqliteChartRepository::new(&tx);
        let history = SqliteHistoryLog::new(&tx);
        let version_id = Uuid::new_v4();
        let now = now_epoch_ms();

        let mut seen = HashSet::new();
        let mut anchor_tooth = None;
        for &diagnosis_id in diagnosis_ids {
            if !seen.insert(diagnosis_id) {
                continue;
            }
            let located = load_active(&charts, diagnosis_id)?;
            if located.patient_id != patient_id {
                return Err(MissingReference::Diagnosis(diagnosis_id).into());
            }
            charts.soft_delete_diagnosis(diagnosis_id)?;
            history.append(&deleted_entry(
                &self.ctx,
                &located,
                clinician_id,
                now,
                Some(version_id),
            ))?;
            anchor_tooth.get_or_insert(located.tooth_id);
        }

        let deleted_count = seen.len();
        let description = format!("{deleted_count} diagnoses removed");
        if let Some(anchor_tooth) = anchor_tooth {
            record_full_snapshot(
                &charts,
                &history,
                self.ctx.catalog.as_ref(),
                &SnapshotRequest {
                    patient_id,
                    clinician_id,
                    anchor_tooth,
                    version_id,
                    description: &description,
                    recorded_at: now,
                },
            )?;
        }
        tx.commit()?;
        self.ctx.cache.invalidate(patient_id);

        info!(
            "event=diagnosis_batch_delete module=diagnosis status=ok patient_id={} deleted={} version_id={}",
            patient_id, deleted_count, version_id
        );
        Ok(BatchDeleteOutcome {
            deleted_count,
            version_id,
            description,
        })
    }

    fn log_modified(
        &self,
        conn: &Connection,
        located: &LocatedDiagnosis,
        updated: &DiagnosisInstance,
        clinician_id: ClinicianId,
        verb: &str,
    ) -> ChartResult<()> {
        SqliteHistoryLog::new(conn).append(&NewHistoryEntry {
            patient_id: located.patient_id,
            tooth_id: located.tooth_id,
            change: ChangeKind::Modified {
                before: located.instance.state(located.surface),
                after: updated.state(located.surface),
            },
            clinician_id,
            recorded_at: now_epoch_ms(),
            version_id: None,
            description: format!(
                "{} {verb} on tooth {}, {}",
                self.ctx.catalog_name(&located.instance.catalog_key),
                located.tooth_code,
                located.surface.label()
            ),
        })?;
        Ok(())
    }
}

fn load_active(
    charts: &impl ChartRepository,
    diagnosis_id: DiagnosisId,
) -> ChartResult<LocatedDiagnosis> {
    charts
        .get_diagnosis(diagnosis_id, false)?
        .ok_or_else(|| MissingReference::Diagnosis(diagnosis_id).into())
}

fn deleted_entry(
    ctx: &ChartContext,
    located: &LocatedDiagnosis,
    clinician_id: ClinicianId,
    recorded_at: i64,
    version_id: Option<VersionId>,
) -> NewHistoryEntry {
    NewHistoryEntry {
        patient_id: located.patient_id,
        tooth_id: located.tooth_id,
        change: ChangeKind::Deleted {
            before: located.instance.state(located.surface),
        },
        clinician_id,
        recorded_at,
        version_id,
        description: format!(
            "{} removed from tooth {}, {}",
            ctx.catalog_name(&located.instance.catalog_key),
            located.tooth_code,
            located.surface.label()
        ),
    }
}
