//! Dental chart (odontogram) engine.
//! Versioned diagnosis reconciliation, append-only chart history and cached
//! current-chart reads over embedded SQLite.

pub mod config;
pub mod db;
pub mod engine;
pub mod external;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, EngineConfig, LoggingConfig};
pub use engine::ChartEngine;
pub use external::catalog::{CatalogEntry, CatalogError, CatalogStore, InMemoryCatalog};
pub use external::directory::{IdentityDirectory, InMemoryDirectory};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::chart::{Surface, SurfaceName, Tooth, ToothCode};
pub use model::diagnosis::{
    AttributeMap, ChartPayload, DiagnosisDescriptor, DiagnosisId, DiagnosisInstance,
    DiagnosisUpdate, TreatmentState,
};
pub use model::history::{ChangeKind, HistoryEntry};
pub use model::projection::{ChartProjection, EnrichedDiagnosis, VersionDiff, VersionedDiagnosis};
pub use model::validation::ValidationError;
pub use model::{ClinicianId, PatientId, VersionId};
pub use repo::{RepoError, RepoResult};
pub use service::diagnosis_service::BatchDeleteOutcome;
pub use service::reconcile_service::ReconcileOutcome;
pub use service::{ChartContext, ChartError, ChartResult, MissingReference};

/// Returns the engine crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
