//! Bulk chart reconciliation (write path).
//!
//! # Responsibility
//! - Match a desired-state payload against stored instances.
//! - Persist only the delta, log `added`/`modified` entries and one
//!   `full_snapshot` per state-changing call.
//!
//! # Invariants
//! - Surfaces absent from the payload are left untouched.
//! - Unchanged descriptors write nothing.
//! - Per-item input errors never abort the call; identity and storage
//!   errors abort and roll back everything.
//! - All entries of one call share its version id.
//! - Teeth are visited in tooth-code order; the snapshot is anchored to the
//!   first tooth, in that order, that changed.

use crate::db::begin_immediate;
use crate::model::chart::{SurfaceName, ToothCode, ToothId};
use crate::model::diagnosis::{ChartPayload, DiagnosisDescriptor, DiagnosisInstance};
use crate::model::history::{ChangeKind, NewHistoryEntry};
use crate::model::{now_epoch_ms, ClinicianId, PatientId, VersionId};
use crate::repo::chart_repo::{ChartRepository, SqliteChartRepository};
use crate::repo::history_repo::{HistoryLog, SqliteHistoryLog};
use crate::service::matching::{resolve_target, MatchTarget};
use crate::service::snapshot::{record_full_snapshot, SnapshotRequest};
use crate::service::{ChartContext, ChartResult};
use log::{debug, error, info};
use rusqlite::Connection;
use serde::Serialize;
use std::time::Instant;
use uuid::Uuid;

/// Result of one reconciliation call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    /// Valid tooth codes seen in the payload, sorted by tooth code.
    pub teeth_processed: Vec<String>,
    pub created_count: usize,
    pub modified_count: usize,
    /// Per-item problems; the rest of the payload was still applied.
    pub errors: Vec<String>,
    /// Set only when the call changed state.
    pub version_id: Option<VersionId>,
    pub has_changes: bool,
}

/// Write facade for bulk chart submissions.
pub struct ReconcileService<'conn> {
    conn: &'conn Connection,
    ctx: ChartContext,
}

/// Per-call state threaded through the surface loop.
struct CallScope {
    patient_id: PatientId,
    clinician_id: ClinicianId,
    version_id: VersionId,
    now: i64,
    anchor_tooth: Option<ToothId>,
}

impl<'conn> ReconcileService<'conn> {
    pub fn new(conn: &'conn Connection, ctx: ChartContext) -> Self {
        Self { conn, ctx }
    }

    /// Applies `payload` as the desired state of the mentioned surfaces.
    ///
    /// # Errors
    /// - `ReferenceNotFound` for an unknown patient or clinician.
    /// - `ConcurrencyConflict` when the write lock cannot be taken in time.
    /// - `Repo` for storage failures; nothing is persisted in that case.
    pub fn reconcile(
        &self,
        patient_id: PatientId,
        clinician_id: ClinicianId,
        payload: &ChartPayload,
    ) -> ChartResult<ReconcileOutcome> {
        let started_at = Instant::now();
        self.ctx.ensure_patient(patient_id)?;
        self.ctx.ensure_clinician(clinician_id)?;

        let result: ChartResult<ReconcileOutcome> = begin_immediate(self.conn)
            .map_err(Into::into)
            .and_then(|tx| {
                let outcome = self.reconcile_in_tx(&tx, patient_id, clinician_id, payload)?;
                tx.commit()?;
                Ok(outcome)
            });

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(
                    "event=chart_reconcile module=reconcile status=error patient_id={} duration_ms={} error_code={}",
                    patient_id,
                    started_at.elapsed().as_millis(),
                    err.code()
                );
                return Err(err);
            }
        };

        if outcome.has_changes {
            self.ctx.cache.invalidate(patient_id);
        }

        info!(
            "event=chart_reconcile module=reconcile status=ok patient_id={} created={} modified={} item_errors={} version_id={} duration_ms={}",
            patient_id,
            outcome.created_count,
            outcome.modified_count,
            outcome.errors.len(),
            outcome
                .version_id
                .map_or_else(|| "none".to_string(), |id| id.to_string()),
            started_at.elapsed().as_millis()
        );
        Ok(outcome)
    }

    fn reconcile_in_tx(
        &self,
        conn: &Connection,
        patient_id: PatientId,
        clinician_id: ClinicianId,
        payload: &ChartPayload,
    ) -> ChartResult<ReconcileOutcome> {
        let charts = SqliteChartRepository::new(conn);
        let history = SqliteHistoryLog::new(conn);
        let mut scope = CallScope {
            patient_id,
            clinician_id,
            version_id: Uuid::new_v4(),
            now: now_epoch_ms(),
            anchor_tooth: None,
        };
        let mut outcome = ReconcileOutcome::default();

        for (raw_code, surfaces) in payload {
            let code = match ToothCode::parse(raw_code) {
                Ok(code) => code,
                Err(err) => {
                    outcome.errors.push(err.to_string());
                    continue;
                }
            };
            let tooth = charts.get_or_create_tooth(patient_id, &code)?;
            outcome.teeth_processed.push(code.to_string());

            for (raw_surface, descriptors) in surfaces {
                let surface_name = match SurfaceName::parse(raw_surface) {
                    Ok(name) => name,
                    Err(err) => {
                        outcome.errors.push(format!("tooth {code}: {err}"));
                        continue;
                    }
                };
                self.reconcile_surface(
                    &charts,
                    &history,
                    &mut scope,
                    (tooth.id, &code, surface_name),
                    descriptors,
                    &mut outcome,
                )?;
            }
        }

        if let Some(anchor_tooth) = scope.anchor_tooth {
            let description = format!(
                "Chart updated: {} added, {} modified",
                outcome.created_count, outcome.modified_count
            );
            record_full_snapshot(
                &charts,
                &history,
                self.ctx.catalog.as_ref(),
                &SnapshotRequest {
                    patient_id,
                    clinician_id,
                    anchor_tooth,
                    version_id: scope.version_id,
                    description: &description,
                    recorded_at: scope.now,
                },
            )?;
            outcome.version_id = Some(scope.version_id);
            outcome.has_changes = true;
        }

        Ok(outcome)
    }

    fn reconcile_surface(
        &self,
        charts: &impl ChartRepository,
        history: &impl HistoryLog,
        scope: &mut CallScope,
        (tooth_id, code, surface_name): (ToothId, &ToothCode, SurfaceName),
        descriptors: &[DiagnosisDescriptor],
        outcome: &mut ReconcileOutcome,
    ) -> ChartResult<()> {
        let surface = charts.get_or_create_surface(tooth_id, surface_name)?;
        // Instances created earlier in this call stay matchable.
        let mut existing = charts.list_surface_diagnoses(surface.id, false)?;

        for descriptor in descriptors {
            if let Err(err) = descriptor.validate() {
                outcome
                    .errors
                    .push(format!("tooth {code} {surface_name}: {err}"));
                continue;
            }
            let catalog_key = descriptor.catalog_key.trim();
            let entry = match self.ctx.catalog.require(catalog_key) {
                Ok(entry) => entry,
                Err(err) => {
                    outcome
                        .errors
                        .push(format!("tooth {code} {surface_name}: {err}"));
                    continue;
                }
            };

            match resolve_target(&existing, descriptor) {
                MatchTarget::Existing { index, rule } => {
                    let current = &existing[index];
                    debug!(
                        "event=diagnosis_match module=reconcile status=ok diagnosis_id={} rule={}",
                        current.id,
                        rule.as_str()
                    );
                    if !current.differs_from(descriptor) {
                        continue;
                    }

                    let mut updated = current.clone();
                    updated.description = descriptor.description.clone();
                    updated.attributes = descriptor.attributes.clone();
                    charts.update_diagnosis(&updated)?;
                    history.append(&NewHistoryEntry {
                        patient_id: scope.patient_id,
                        tooth_id,
                        change: ChangeKind::Modified {
                            before: current.state(surface_name),
                            after: updated.state(surface_name),
                        },
                        clinician_id: scope.clinician_id,
                        recorded_at: scope.now,
                        version_id: Some(scope.version_id),
                        description: format!(
                            "{} updated on tooth {code}, {}",
                            entry.name,
                            surface_name.label()
                        ),
                    })?;
                    existing[index] = updated;
                    outcome.modified_count += 1;
                }
                MatchTarget::New => {
                    let instance = DiagnosisInstance::from_descriptor(
                        surface.id,
                        descriptor,
                        scope.clinician_id,
                        scope.now,
                    );
                    charts.insert_diagnosis(&instance)?;
                    history.append(&NewHistoryEntry {
                        patient_id: scope.patient_id,
                        tooth_id,
                        change: ChangeKind::Added {
                            after: instance.state(surface_name),
                        },
                        clinician_id: scope.clinician_id,
                        recorded_at: scope.now,
                        version_id: Some(scope.version_id),
                        description: format!(
                            "{} added on tooth {code}, {}",
                            entry.name,
                            surface_name.label()
                        ),
                    })?;
                    existing.push(instance);
                    outcome.created_count += 1;
                }
            }
            scope.anchor_tooth.get_or_insert(tooth_id);
        }

        Ok(())
    }
}
