//! Owned entry point bundling one connection with the chart services.
//!
//! # Responsibility
//! - Open and migrate the database, then hand out services borrowing it.
//! - Expose the write/read entrypoints consumed by host layers.

use crate::config::EngineConfig;
use crate::db::{open_db_in_memory_with_config, open_db_with_config, DbResult};
use crate::external::catalog::CatalogStore;
use crate::external::directory::IdentityDirectory;
use crate::model::diagnosis::ChartPayload;
use crate::model::projection::{ChartProjection, VersionDiff};
use crate::model::{ClinicianId, PatientId, VersionId};
use crate::service::chart_read_service::ChartReadService;
use crate::service::diagnosis_service::DiagnosisService;
use crate::service::history_service::HistoryService;
use crate::service::reconcile_service::{ReconcileOutcome, ReconcileService};
use crate::service::tooth_service::ToothService;
use crate::service::{ChartContext, ChartResult};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;

pub struct ChartEngine {
    conn: Connection,
    ctx: ChartContext,
}

impl ChartEngine {
    /// Wraps an already migrated connection.
    pub fn new(conn: Connection, ctx: ChartContext) -> Self {
        Self { conn, ctx }
    }

    pub fn open(
        path: impl AsRef<Path>,
        config: &EngineConfig,
        catalog: Arc<dyn CatalogStore>,
        directory: Arc<dyn IdentityDirectory>,
    ) -> DbResult<Self> {
        let conn = open_db_with_config(path, config)?;
        Ok(Self::new(conn, ChartContext::new(catalog, directory, config)))
    }

    pub fn open_in_memory(
        config: &EngineConfig,
        catalog: Arc<dyn CatalogStore>,
        directory: Arc<dyn IdentityDirectory>,
    ) -> DbResult<Self> {
        let conn = open_db_in_memory_with_config(config)?;
        Ok(Self::new(conn, ChartContext::new(catalog, directory, config)))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn context(&self) -> &ChartContext {
        &self.ctx
    }

    pub fn reconciler(&self) -> ReconcileService<'_> {
        ReconcileService::new(&self.conn, self.ctx.clone())
    }

    pub fn diagnoses(&self) -> DiagnosisService<'_> {
        DiagnosisService::new(&self.conn, self.ctx.clone())
    }

    pub fn teeth(&self) -> ToothService<'_> {
        ToothService::new(&self.conn, self.ctx.clone())
    }

    pub fn reads(&self) -> ChartReadService<'_> {
        ChartReadService::new(&self.conn, self.ctx.clone())
    }

    pub fn history(&self) -> HistoryService<'_> {
        HistoryService::new(&self.conn, self.ctx.clone())
    }

    pub fn reconcile(
        &self,
        patient_id: PatientId,
        clinician_id: ClinicianId,
        payload: &ChartPayload,
    ) -> ChartResult<ReconcileOutcome> {
        self.reconciler().reconcile(patient_id, clinician_id, payload)
    }

    pub fn get_current_chart(&self, patient_id: PatientId) -> ChartResult<ChartProjection> {
        self.reads().get_current_chart(patient_id)
    }

    pub fn get_version_diff(
        &self,
        patient_id: PatientId,
        version_id: VersionId,
    ) -> ChartResult<VersionDiff> {
        self.history().get_version_diff(patient_id, version_id)
    }
}
