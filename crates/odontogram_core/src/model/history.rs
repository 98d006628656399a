//! Append-only chart history model.
//!
//! # Responsibility
//! - Define the tagged change kinds and their typed payloads.
//! - Map change kinds to and from the `(change_kind, before, after)` columns.
//!
//! # Invariants
//! - Entries are never mutated or deleted once appended.
//! - Entries sharing a `version_id` were written in one transaction.

use crate::model::chart::{ToothCode, ToothId};
use crate::model::diagnosis::DiagnosisState;
use crate::model::projection::ChartProjection;
use crate::model::{ClinicianId, PatientId, VersionId};
use serde::{Deserialize, Serialize};

/// Tooth absence payload for `tooth_marked_absent` entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToothAbsence {
    pub tooth_code: ToothCode,
    pub is_absent: bool,
}

/// What one history entry records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeKind {
    Added {
        after: DiagnosisState,
    },
    Modified {
        before: DiagnosisState,
        after: DiagnosisState,
    },
    Deleted {
        before: DiagnosisState,
    },
    ToothMarkedAbsent {
        after: ToothAbsence,
    },
    /// Complete enriched chart after a state-changing write.
    FullSnapshot {
        chart: ChartProjection,
    },
}

/// Encoded column form of a change kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChange {
    pub kind: &'static str,
    pub before: Option<String>,
    pub after: Option<String>,
}

impl ChangeKind {
    pub const ADDED: &'static str = "added";
    pub const MODIFIED: &'static str = "modified";
    pub const DELETED: &'static str = "deleted";
    pub const TOOTH_MARKED_ABSENT: &'static str = "tooth_marked_absent";
    pub const FULL_SNAPSHOT: &'static str = "full_snapshot";

    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Added { .. } => Self::ADDED,
            Self::Modified { .. } => Self::MODIFIED,
            Self::Deleted { .. } => Self::DELETED,
            Self::ToothMarkedAbsent { .. } => Self::TOOTH_MARKED_ABSENT,
            Self::FullSnapshot { .. } => Self::FULL_SNAPSHOT,
        }
    }

    pub fn is_snapshot(&self) -> bool {
        matches!(self, Self::FullSnapshot { .. })
    }

    pub fn snapshot(&self) -> Option<&ChartProjection> {
        match self {
            Self::FullSnapshot { chart } => Some(chart),
            _ => None,
        }
    }

    /// Splits the payload into storage columns. Snapshots keep the chart in
    /// the `after` column.
    pub fn encode(&self) -> serde_json::Result<EncodedChange> {
        let (before, after) = match self {
            Self::Added { after } => (None, Some(serde_json::to_string(after)?)),
            Self::Modified { before, after } => (
                Some(serde_json::to_string(before)?),
                Some(serde_json::to_string(after)?),
            ),
            Self::Deleted { before } => (Some(serde_json::to_string(before)?), None),
            Self::ToothMarkedAbsent { after } => (None, Some(serde_json::to_string(after)?)),
            Self::FullSnapshot { chart } => (None, Some(serde_json::to_string(chart)?)),
        };
        Ok(EncodedChange {
            kind: self.kind_str(),
            before,
            after,
        })
    }

    /// Rebuilds a change kind from storage columns.
    pub fn decode(
        kind: &str,
        before: Option<&str>,
        after: Option<&str>,
    ) -> Result<Self, String> {
        fn required<'a>(
            kind: &str,
            column: &str,
            value: Option<&'a str>,
        ) -> Result<&'a str, String> {
            value.ok_or_else(|| format!("`{kind}` entry is missing its {column} payload"))
        }
        fn parse<T: serde::de::DeserializeOwned>(kind: &str, raw: &str) -> Result<T, String> {
            serde_json::from_str(raw).map_err(|err| format!("invalid `{kind}` payload: {err}"))
        }

        match kind {
            Self::ADDED => Ok(Self::Added {
                after: parse(kind, required(kind, "after", after)?)?,
            }),
            Self::MODIFIED => Ok(Self::Modified {
                before: parse(kind, required(kind, "before", before)?)?,
                after: parse(kind, required(kind, "after", after)?)?,
            }),
            Self::DELETED => Ok(Self::Deleted {
                before: parse(kind, required(kind, "before", before)?)?,
            }),
            Self::TOOTH_MARKED_ABSENT => Ok(Self::ToothMarkedAbsent {
                after: parse(kind, required(kind, "after", after)?)?,
            }),
            Self::FULL_SNAPSHOT => Ok(Self::FullSnapshot {
                chart: parse(kind, required(kind, "after", after)?)?,
            }),
            other => Err(format!("unknown change kind `{other}`")),
        }
    }
}

/// One persisted history row.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// Monotonic row sequence; breaks ties between equal timestamps.
    pub seq: i64,
    pub patient_id: PatientId,
    /// Anchor tooth. Snapshots anchor to the first tooth changed by the write.
    pub tooth_id: ToothId,
    pub change: ChangeKind,
    pub clinician_id: ClinicianId,
    pub recorded_at: i64,
    pub version_id: Option<VersionId>,
    pub description: String,
}

/// Append input; `seq` is assigned by storage.
#[derive(Debug, Clone, PartialEq)]
pub struct NewHistoryEntry {
    pub patient_id: PatientId,
    pub tooth_id: ToothId,
    pub change: ChangeKind,
    pub clinician_id: ClinicianId,
    pub recorded_at: i64,
    pub version_id: Option<VersionId>,
    pub description: String,
}
