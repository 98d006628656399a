//! Tooth-level chart operations.

use crate::db::begin_immediate;
use crate::model::chart::{Tooth, ToothCode};
use crate::model::history::{ChangeKind, NewHistoryEntry, ToothAbsence};
use crate::model::{now_epoch_ms, ClinicianId, PatientId};
use crate::repo::chart_repo::{ChartRepository, SqliteChartRepository};
use crate::repo::history_repo::{HistoryLog, SqliteHistoryLog};
use crate::service::{ChartContext, ChartResult};
use log::info;
use rusqlite::Connection;

pub struct ToothService<'conn> {
    conn: &'conn Connection,
    ctx: ChartContext,
}

impl<'conn> ToothService<'conn> {
    pub fn new(conn: &'conn Connection, ctx: ChartContext) -> Self {
        Self { conn, ctx }
    }

    /// Marks a tooth absent, creating it first if needed.
    ///
    /// Returns `true` when the tooth flipped to absent. Repeating the call is
    /// a no-op that writes no history.
    pub fn mark_absent(
        &self,
        patient_id: PatientId,
        code: &str,
        clinician_id: ClinicianId,
    ) -> ChartResult<bool> {
        let code = ToothCode::parse(code)?;
        self.ctx.ensure_patient(patient_id)?;
        self.ctx.ensure_clinician(clinician_id)?;

        let tx = begin_immediate(self.conn)?;
        let charts = SqliteChartRepository::new(&tx);
        let tooth = charts.get_or_create_tooth(patient_id, &code)?;
        let flipped = charts.mark_tooth_absent(tooth.id)?;
        if flipped {
            SqliteHistoryLog::new(&tx).append(&NewHistoryEntry {
                patient_id,
                tooth_id: tooth.id,
                change: ChangeKind::ToothMarkedAbsent {
                    after: ToothAbsence {
                        tooth_code: code.clone(),
                        is_absent: true,
                    },
                },
                clinician_id,
                recorded_at: now_epoch_ms(),
                version_id: None,
                description: format!("Tooth {code} marked absent"),
            })?;
        }
        tx.commit()?;
        self.ctx.cache.invalidate(patient_id);

        info!(
            "event=tooth_mark_absent module=tooth status=ok patient_id={} tooth_code={} changed={}",
            patient_id, code, flipped
        );
        Ok(flipped)
    }

    pub fn find_tooth(&self, patient_id: PatientId, code: &str) -> ChartResult<Option<Tooth>> {
        let code = ToothCode::parse(code)?;
        self.ctx.ensure_patient(patient_id)?;
        Ok(SqliteChartRepository::new(self.conn).find_tooth(patient_id, &code)?)
    }

    /// Teeth referenced so far, ordered by code.
    pub fn list_teeth(&self, patient_id: PatientId) -> ChartResult<Vec<Tooth>> {
        self.ctx.ensure_patient(patient_id)?;
        Ok(SqliteChartRepository::new(self.conn).list_teeth(patient_id)?)
    }
}
