//! Chart projection and full-snapshot recording.
//!
//! # Responsibility
//! - Enrich active instances with catalog display data.
//! - Recompute the complete chart and append it as one `full_snapshot`
//!   history entry.
//!
//! # Invariants
//! - A snapshot enumerates exactly the patient's active instances at the time
//!   it is written, inside the caller's transaction.

use crate::external::catalog::CatalogStore;
use crate::model::chart::ToothId;
use crate::model::history::{ChangeKind, NewHistoryEntry};
use crate::model::projection::{ChartProjection, EnrichedDiagnosis};
use crate::model::{ClinicianId, PatientId, VersionId};
use crate::repo::chart_repo::{ChartRepository, LocatedDiagnosis};
use crate::repo::history_repo::HistoryLog;
use crate::repo::RepoResult;
use log::warn;

/// Merges one instance with its catalog entry.
///
/// A key missing from the catalog keeps the instance visible with the key as
/// its name and empty display fields.
pub fn enrich(located: &LocatedDiagnosis, catalog: &dyn CatalogStore) -> EnrichedDiagnosis {
    let instance = &located.instance;
    let entry = catalog.resolve(&instance.catalog_key);
    if entry.is_none() {
        warn!(
            "event=catalog_lookup module=snapshot status=missing diagnosis_id={} catalog_key={}",
            instance.id, instance.catalog_key
        );
    }

    let (name, siglas, color, category, catalog_priority, applicable_areas) = match entry {
        Some(entry) => (
            entry.name,
            entry.siglas,
            entry.color,
            entry.category,
            Some(entry.priority),
            entry.applicable_areas,
        ),
        None => (
            instance.catalog_key.clone(),
            String::new(),
            String::new(),
            String::new(),
            None,
            Vec::new(),
        ),
    };

    EnrichedDiagnosis {
        id: instance.id,
        catalog_key: instance.catalog_key.clone(),
        name,
        siglas,
        color,
        category,
        priority: instance.priority_override.or(catalog_priority),
        applicable_areas,
        attributes: instance.attributes.clone(),
        description: instance.description.clone(),
        treatment_state: instance.treatment_state,
        treated_at: instance.treated_at,
        clinician_id: instance.clinician_id,
        created_at: instance.created_at,
    }
}

/// Groups active instances by tooth and surface, preserving input order
/// within each surface.
pub fn project_chart(rows: &[LocatedDiagnosis], catalog: &dyn CatalogStore) -> ChartProjection {
    let mut chart = ChartProjection::new();
    for located in rows.iter().filter(|located| located.instance.is_active) {
        chart.push(
            located.tooth_code.clone(),
            located.surface,
            enrich(located, catalog),
        );
    }
    chart
}

/// Inputs shared by every snapshot append.
pub struct SnapshotRequest<'a> {
    pub patient_id: PatientId,
    pub clinician_id: ClinicianId,
    pub anchor_tooth: ToothId,
    pub version_id: VersionId,
    pub description: &'a str,
    pub recorded_at: i64,
}

/// Recomputes the patient's chart and appends it as a `full_snapshot` entry.
pub fn record_full_snapshot(
    charts: &impl ChartRepository,
    history: &impl HistoryLog,
    catalog: &dyn CatalogStore,
    request: &SnapshotRequest<'_>,
) -> RepoResult<ChartProjection> {
    let rows = charts.list_active_diagnoses(request.patient_id)?;
    let chart = project_chart(&rows, catalog);

    history.append(&NewHistoryEntry {
        patient_id: request.patient_id,
        tooth_id: request.anchor_tooth,
        change: ChangeKind::FullSnapshot {
            chart: chart.clone(),
        },
        clinician_id: request.clinician_id,
        recorded_at: request.recorded_at,
        version_id: Some(request.version_id),
        description: request.description.to_string(),
    })?;

    Ok(chart)
}
