//! Diagnosis instance model and bulk-submission descriptors.
//!
//! # Responsibility
//! - Define the persisted `DiagnosisInstance` and its treatment lifecycle.
//! - Define the incoming `DiagnosisDescriptor` / `ChartPayload` shapes.
//! - Provide the field-level comparison used by the update path.
//!
//! # Invariants
//! - Only active instances participate in current state.
//! - `diagnosed -> treated` is one-way; re-diagnosis creates a new instance.
//! - Once soft-deleted an instance is never mutated again.

use crate::model::chart::SurfaceId;
use crate::model::chart::SurfaceName;
use crate::model::validation::ValidationError;
use crate::model::ClinicianId;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub type DiagnosisId = Uuid;

/// Clinical attribute map (material, severity, ...). Key order is irrelevant
/// for equality.
pub type AttributeMap = BTreeMap<String, serde_json::Value>;

/// Bulk write payload: tooth code -> surface name -> ordered descriptors.
///
/// Keys stay raw strings so invalid codes can be reported per item instead of
/// failing the whole payload at decode time. Iteration is sorted by key, not
/// by submission order.
pub type ChartPayload = BTreeMap<String, BTreeMap<String, Vec<DiagnosisDescriptor>>>;

/// Treatment lifecycle of one diagnosis instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreatmentState {
    Diagnosed,
    Treated,
}

impl TreatmentState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Diagnosed => "diagnosed",
            Self::Treated => "treated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "diagnosed" => Some(Self::Diagnosed),
            "treated" => Some(Self::Treated),
            _ => None,
        }
    }
}

/// One diagnosis attached to one surface.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosisInstance {
    pub id: DiagnosisId,
    pub surface_id: SurfaceId,
    /// Key into the external diagnosis catalog.
    pub catalog_key: String,
    pub description: String,
    pub attributes: AttributeMap,
    pub treatment_state: TreatmentState,
    /// Overrides the catalog priority when set. Must be within `1..=5`.
    pub priority_override: Option<u8>,
    pub is_active: bool,
    pub clinician_id: ClinicianId,
    pub created_at: i64,
    pub treated_at: Option<i64>,
}

impl DiagnosisInstance {
    /// Creates a new active `diagnosed` instance from a submitted descriptor.
    pub fn from_descriptor(
        surface_id: SurfaceId,
        descriptor: &DiagnosisDescriptor,
        clinician_id: ClinicianId,
        created_at: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            surface_id,
            catalog_key: descriptor.catalog_key.trim().to_string(),
            description: descriptor.description.clone(),
            attributes: descriptor.attributes.clone(),
            treatment_state: TreatmentState::Diagnosed,
            priority_override: None,
            is_active: true,
            clinician_id,
            created_at,
            treated_at: None,
        }
    }

    /// Validates persisted-field constraints.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.catalog_key.trim().is_empty() {
            return Err(ValidationError::BlankCatalogKey);
        }
        validate_attributes(&self.attributes)?;
        if let Some(priority) = self.priority_override {
            validate_priority(i64::from(priority))?;
        }
        Ok(())
    }

    /// Returns whether the descriptor's description or attributes differ.
    pub fn differs_from(&self, descriptor: &DiagnosisDescriptor) -> bool {
        self.description != descriptor.description || self.attributes != descriptor.attributes
    }

    /// Payload shape stored in history entries for this instance.
    pub fn state(&self, surface: SurfaceName) -> DiagnosisState {
        DiagnosisState {
            diagnosis_id: self.id,
            catalog_key: self.catalog_key.clone(),
            surface,
            description: self.description.clone(),
            attributes: self.attributes.clone(),
            treatment_state: self.treatment_state,
            priority_override: self.priority_override,
            treated_at: self.treated_at,
        }
    }
}

/// Desired state for one diagnosis inside a bulk submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisDescriptor {
    /// Stable id of an existing instance, or a client-side placeholder.
    #[serde(default, deserialize_with = "deserialize_loose_id")]
    pub id: Option<String>,
    #[serde(alias = "procedimientoId")]
    pub catalog_key: String,
    #[serde(default, alias = "secondaryOptions", deserialize_with = "deserialize_attributes")]
    pub attributes: AttributeMap,
    #[serde(default, alias = "descripcion")]
    pub description: String,
}

impl DiagnosisDescriptor {
    pub fn new(catalog_key: impl Into<String>) -> Self {
        Self {
            id: None,
            catalog_key: catalog_key.into(),
            attributes: AttributeMap::new(),
            description: String::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Returns the id only when it parses as a UUID.
    ///
    /// Chart editors send numeric/timestamp placeholders for unsaved rows;
    /// those must fall through to equivalence matching.
    pub fn stable_id(&self) -> Option<DiagnosisId> {
        self.id
            .as_deref()
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.catalog_key.trim().is_empty() {
            return Err(ValidationError::BlankCatalogKey);
        }
        validate_attributes(&self.attributes)
    }
}

/// Single-instance field update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiagnosisUpdate {
    pub description: Option<String>,
    /// Merged into the stored map; existing keys are overwritten.
    pub attributes: Option<AttributeMap>,
    pub priority_override: Option<i64>,
}

/// Serialized instance state carried by `added`/`modified`/`deleted` entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisState {
    pub diagnosis_id: DiagnosisId,
    pub catalog_key: String,
    pub surface: SurfaceName,
    pub description: String,
    pub attributes: AttributeMap,
    pub treatment_state: TreatmentState,
    pub priority_override: Option<u8>,
    pub treated_at: Option<i64>,
}

/// Attribute values may be any JSON value, nested objects included; only
/// keys are checked.
pub fn validate_attributes(attributes: &AttributeMap) -> Result<(), ValidationError> {
    if attributes.keys().any(|key| key.trim().is_empty()) {
        return Err(ValidationError::BlankAttributeKey);
    }
    Ok(())
}

pub fn validate_priority(value: i64) -> Result<u8, ValidationError> {
    if (1..=5).contains(&value) {
        Ok(value as u8)
    } else {
        Err(ValidationError::PriorityOutOfRange(value))
    }
}

fn deserialize_loose_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(text)) => Some(text),
        Some(serde_json::Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

fn deserialize_attributes<'de, D>(deserializer: D) -> Result<AttributeMap, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<AttributeMap>::deserialize(deserializer)?.unwrap_or_default())
}
