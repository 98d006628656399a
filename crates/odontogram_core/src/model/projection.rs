//! Enriched chart read model.
//!
//! # Responsibility
//! - Define the tooth -> surface -> enriched diagnosis projection served to
//!   readers and stored inside full-snapshot history entries.
//! - Define the version diff result shape.
//!
//! # Invariants
//! - A projection contains only active instances.
//! - Teeth and surfaces without active instances are omitted.

use crate::model::chart::{SurfaceName, ToothCode};
use crate::model::diagnosis::{AttributeMap, DiagnosisId, TreatmentState};
use crate::model::{ClinicianId, VersionId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Active diagnosis instance merged with catalog display metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedDiagnosis {
    pub id: DiagnosisId,
    pub catalog_key: String,
    pub name: String,
    pub siglas: String,
    pub color: String,
    pub category: String,
    /// Effective priority: instance override, else catalog priority.
    pub priority: Option<u8>,
    #[serde(default)]
    pub applicable_areas: Vec<String>,
    #[serde(default)]
    pub attributes: AttributeMap,
    #[serde(default)]
    pub description: String,
    pub treatment_state: TreatmentState,
    pub treated_at: Option<i64>,
    pub clinician_id: ClinicianId,
    pub created_at: i64,
}

/// Full current chart of one patient.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChartProjection {
    teeth: BTreeMap<ToothCode, BTreeMap<SurfaceName, Vec<EnrichedDiagnosis>>>,
}

impl ChartProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one diagnosis under its tooth and surface, keeping insertion
    /// order within the surface.
    pub fn push(&mut self, tooth: ToothCode, surface: SurfaceName, diagnosis: EnrichedDiagnosis) {
        self.teeth
            .entry(tooth)
            .or_default()
            .entry(surface)
            .or_default()
            .push(diagnosis);
    }

    pub fn teeth(&self) -> &BTreeMap<ToothCode, BTreeMap<SurfaceName, Vec<EnrichedDiagnosis>>> {
        &self.teeth
    }

    pub fn surface(&self, tooth: &ToothCode, surface: SurfaceName) -> &[EnrichedDiagnosis] {
        self.teeth
            .get(tooth)
            .and_then(|surfaces| surfaces.get(&surface))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Flattens the chart into `(tooth, surface, diagnosis)` triples in
    /// tooth/surface order.
    pub fn iter(&self) -> impl Iterator<Item = (&ToothCode, SurfaceName, &EnrichedDiagnosis)> {
        self.teeth.iter().flat_map(|(tooth, surfaces)| {
            surfaces.iter().flat_map(move |(surface, diagnoses)| {
                diagnoses
                    .iter()
                    .map(move |diagnosis| (tooth, *surface, diagnosis))
            })
        })
    }

    pub fn instance_ids(&self) -> BTreeSet<DiagnosisId> {
        self.iter().map(|(_, _, diagnosis)| diagnosis.id).collect()
    }

    /// Number of diagnosis instances across all teeth.
    pub fn len(&self) -> usize {
        self.teeth
            .values()
            .flat_map(|surfaces| surfaces.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.teeth.is_empty()
    }
}

/// One diagnosis of a target snapshot, flagged when it did not exist in the
/// preceding snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedDiagnosis {
    pub tooth_code: ToothCode,
    pub surface: SurfaceName,
    pub diagnosis: EnrichedDiagnosis,
    pub is_new: bool,
}

/// Result of diffing a version's snapshot against its predecessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionDiff {
    pub version_id: VersionId,
    pub snapshot_at: i64,
    pub predecessor_version_id: Option<VersionId>,
    pub diagnoses: Vec<VersionedDiagnosis>,
}

impl VersionDiff {
    pub fn new_diagnoses(&self) -> impl Iterator<Item = &VersionedDiagnosis> {
        self.diagnoses.iter().filter(|entry| entry.is_new)
    }
}

#[cfg(test)]
mod tests {
    use super::{ChartProjection, EnrichedDiagnosis};
    use crate::model::chart::{SurfaceName, ToothCode};
    use crate::model::diagnosis::{AttributeMap, TreatmentState};
    use uuid::Uuid;

    fn enriched(key: &str) -> EnrichedDiagnosis {
        EnrichedDiagnosis {
            id: Uuid::new_v4(),
            catalog_key: key.to_string(),
            name: key.to_string(),
            siglas: String::new(),
            color: String::new(),
            category: String::new(),
            priority: None,
            applicable_areas: Vec::new(),
            attributes: AttributeMap::new(),
            description: String::new(),
            treatment_state: TreatmentState::Diagnosed,
            treated_at: None,
            clinician_id: Uuid::nil(),
            created_at: 0,
        }
    }

    #[test]
    fn projection_groups_by_tooth_then_surface() {
        let mut chart = ChartProjection::new();
        let first = enriched("caries");
        let second = enriched("obturacion");
        let tooth = ToothCode::parse("16").unwrap();
        chart.push(tooth.clone(), SurfaceName::Oclusal, first.clone());
        chart.push(tooth.clone(), SurfaceName::Oclusal, second.clone());
        chart.push(
            ToothCode::parse("21").unwrap(),
            SurfaceName::Mesial,
            enriched("fractura"),
        );

        assert_eq!(chart.len(), 3);
        assert_eq!(
            chart.surface(&tooth, SurfaceName::Oclusal),
            &[first.clone(), second.clone()]
        );
        assert!(chart.surface(&tooth, SurfaceName::Distal).is_empty());
        assert!(chart.instance_ids().contains(&second.id));
    }

    #[test]
    fn projection_serializes_as_nested_string_keyed_map() {
        let mut chart = ChartProjection::new();
        chart.push(
            ToothCode::parse("85").unwrap(),
            SurfaceName::RaizPrincipal,
            enriched("absceso"),
        );

        let value = serde_json::to_value(&chart).unwrap();
        assert!(value["85"]["raiz_principal"].is_array());

        let decoded: ChartProjection = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, chart);
    }
}
