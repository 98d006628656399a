//! Chart use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into transactional chart operations.
//! - Translate storage failures into the engine error taxonomy.
//!
//! # Invariants
//! - Every mutation runs inside one `BEGIN IMMEDIATE` transaction.
//! - The patient's cached chart is evicted only after a successful commit.
//! - Identity references are checked before any write starts.

pub mod chart_cache;
pub mod chart_read_service;
pub mod diagnosis_service;
pub mod history_service;
pub mod matching;
pub mod reconcile_service;
pub mod snapshot;
pub mod tooth_service;

use crate::config::EngineConfig;
use crate::db::DbError;
use crate::external::catalog::CatalogStore;
use crate::external::directory::IdentityDirectory;
use crate::model::diagnosis::DiagnosisId;
use crate::model::validation::ValidationError;
use crate::model::{ClinicianId, PatientId, VersionId};
use crate::repo::RepoError;
use crate::service::chart_cache::ChartCache;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub type ChartResult<T> = Result<T, ChartError>;

/// Reference that a hard-failing operation could not resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingReference {
    Patient(PatientId),
    Clinician(ClinicianId),
    Diagnosis(DiagnosisId),
    Version(VersionId),
    Tooth(String),
}

impl Display for MissingReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Patient(id) => write!(f, "patient not found: {id}"),
            Self::Clinician(id) => write!(f, "clinician not found: {id}"),
            Self::Diagnosis(id) => write!(f, "active diagnosis not found: {id}"),
            Self::Version(id) => write!(f, "chart version not found: {id}"),
            Self::Tooth(code) => write!(f, "tooth not found: {code}"),
        }
    }
}

/// Errors returned by chart services.
#[derive(Debug)]
pub enum ChartError {
    /// A patient, clinician, diagnosis, version or tooth does not exist.
    ReferenceNotFound(MissingReference),
    /// Input rejected before persistence.
    Validation(ValidationError),
    /// Another writer held the database lock past the busy timeout.
    ConcurrencyConflict(DbError),
    /// Repository-level failure.
    Repo(RepoError),
}

impl ChartError {
    /// Short stable code for log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ReferenceNotFound(_) => "reference_not_found",
            Self::Validation(_) => "validation_failed",
            Self::ConcurrencyConflict(_) => "concurrency_conflict",
            Self::Repo(_) => "storage_failed",
        }
    }
}

impl Display for ChartError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReferenceNotFound(reference) => write!(f, "{reference}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::ConcurrencyConflict(err) => {
                write!(f, "chart is being modified by another writer: {err}")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ChartError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ReferenceNotFound(_) => None,
            Self::Validation(err) => Some(err),
            Self::ConcurrencyConflict(err) => Some(err),
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<MissingReference> for ChartError {
    fn from(value: MissingReference) -> Self {
        Self::ReferenceNotFound(value)
    }
}

impl From<ValidationError> for ChartError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for ChartError {
    fn from(value: DbError) -> Self {
        if value.is_busy() {
            Self::ConcurrencyConflict(value)
        } else {
            Self::Repo(RepoError::Db(value))
        }
    }
}

impl From<rusqlite::Error> for ChartError {
    fn from(value: rusqlite::Error) -> Self {
        Self::from(DbError::Sqlite(value))
    }
}

impl From<RepoError> for ChartError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Db(err) => Self::from(err),
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}

/// Collaborators shared by every chart service.
#[derive(Clone)]
pub struct ChartContext {
    pub catalog: Arc<dyn CatalogStore>,
    pub directory: Arc<dyn IdentityDirectory>,
    pub cache: Arc<ChartCache>,
}

impl ChartContext {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        directory: Arc<dyn IdentityDirectory>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            catalog,
            directory,
            cache: Arc::new(ChartCache::new(config.cache_ttl())),
        }
    }

    pub(crate) fn ensure_patient(&self, patient_id: PatientId) -> ChartResult<()> {
        if self.directory.patient_exists(patient_id) {
            Ok(())
        } else {
            Err(MissingReference::Patient(patient_id).into())
        }
    }

    pub(crate) fn ensure_clinician(&self, clinician_id: ClinicianId) -> ChartResult<()> {
        if self.directory.clinician_exists(clinician_id) {
            Ok(())
        } else {
            Err(MissingReference::Clinician(clinician_id).into())
        }
    }

    /// Display name for history descriptions; falls back to the raw key.
    pub(crate) fn catalog_name(&self, key: &str) -> String {
        self.catalog
            .resolve(key)
            .map(|entry| entry.name)
            .unwrap_or_else(|| key.to_string())
    }
}
