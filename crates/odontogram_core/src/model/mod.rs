//! Domain model for patient dental charts and their history.
//!
//! # Responsibility
//! - Define the chart hierarchy (tooth -> surface -> diagnosis instance).
//! - Define the tagged history payloads and the enriched read projection.
//!
//! # Invariants
//! - Every persisted object is identified by a stable UUID.
//! - Deletion is represented by soft-delete tombstones, not hard delete.
//! - Timestamps are Unix epoch milliseconds.

pub mod chart;
pub mod diagnosis;
pub mod history;
pub mod projection;
pub mod validation;

use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Opaque patient reference owned by the external identity directory.
pub type PatientId = Uuid;
/// Opaque clinician reference owned by the external identity directory.
pub type ClinicianId = Uuid;
/// Groups every history entry produced by one logical write.
pub type VersionId = Uuid;

/// Current wall-clock time in epoch milliseconds.
pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
