//! Current-chart reads backed by the per-patient cache.

use crate::model::diagnosis::TreatmentState;
use crate::model::projection::ChartProjection;
use crate::model::PatientId;
use crate::repo::chart_repo::{ChartRepository, LocatedDiagnosis, SqliteChartRepository};
use crate::service::snapshot::project_chart;
use crate::service::{ChartContext, ChartResult};
use log::debug;
use rusqlite::Connection;

pub struct ChartReadService<'conn> {
    conn: &'conn Connection,
    ctx: ChartContext,
}

impl<'conn> ChartReadService<'conn> {
    pub fn new(conn: &'conn Connection, ctx: ChartContext) -> Self {
        Self { conn, ctx }
    }

    /// Returns the patient's enriched current chart.
    ///
    /// Serves an unexpired cached projection when present; otherwise projects
    /// from storage and caches the result.
    pub fn get_current_chart(&self, patient_id: PatientId) -> ChartResult<ChartProjection> {
        self.ctx.ensure_patient(patient_id)?;

        if let Some(chart) = self.ctx.cache.get(patient_id) {
            debug!("event=chart_read module=read status=ok patient_id={patient_id} cache=hit");
            return Ok(chart);
        }

        let rows = SqliteChartRepository::new(self.conn).list_active_diagnoses(patient_id)?;
        let chart = project_chart(&rows, self.ctx.catalog.as_ref());
        self.ctx.cache.put(patient_id, chart.clone());

        debug!(
            "event=chart_read module=read status=ok patient_id={} cache=miss diagnoses={}",
            patient_id,
            chart.len()
        );
        Ok(chart)
    }

    /// Flat list of active instances, optionally filtered by treatment
    /// state. Always reads storage.
    pub fn list_diagnoses(
        &self,
        patient_id: PatientId,
        state: Option<TreatmentState>,
    ) -> ChartResult<Vec<LocatedDiagnosis>> {
        self.ctx.ensure_patient(patient_id)?;
        let mut rows = SqliteChartRepository::new(self.conn).list_active_diagnoses(patient_id)?;
        if let Some(state) = state {
            rows.retain(|located| located.instance.treatment_state == state);
        }
        Ok(rows)
    }
}
