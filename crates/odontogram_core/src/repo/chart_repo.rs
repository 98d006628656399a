//! Chart hierarchy repository: teeth, surfaces and diagnosis instances.
//!
//! # Responsibility
//! - Lazily create teeth and surfaces on first reference.
//! - Persist diagnosis instances and their soft-delete tombstones.
//!
//! # Invariants
//! - `get_or_create_*` never duplicates a `(patient, code)` tooth or a
//!   `(tooth, name)` surface.
//! - Surface diagnosis lists are returned in insertion order.
//! - Inactive instances are only visible when explicitly requested.

use crate::model::chart::{Surface, SurfaceId, SurfaceName, Tooth, ToothCode, ToothId};
use crate::model::diagnosis::{AttributeMap, DiagnosisId, DiagnosisInstance, TreatmentState};
use crate::model::{now_epoch_ms, PatientId};
use crate::repo::{bool_to_int, parse_flag, parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

const TOOTH_SELECT_SQL: &str = "SELECT
    tooth_uuid,
    patient_uuid,
    tooth_code,
    is_absent,
    created_at
FROM teeth";

const DIAGNOSIS_SELECT_SQL: &str = "SELECT
    d.diagnosis_uuid AS diagnosis_uuid,
    d.surface_uuid AS surface_uuid,
    d.catalog_key AS catalog_key,
    d.description AS description,
    d.attributes_json AS attributes_json,
    d.treatment_state AS treatment_state,
    d.priority_override AS priority_override,
    d.is_active AS is_active,
    d.clinician_uuid AS clinician_uuid,
    d.created_at AS created_at,
    d.treated_at AS treated_at,
    t.patient_uuid AS patient_uuid,
    t.tooth_uuid AS tooth_uuid,
    t.tooth_code AS tooth_code,
    s.surface_name AS surface_name
FROM diagnoses d
JOIN surfaces s ON s.surface_uuid = d.surface_uuid
JOIN teeth t ON t.tooth_uuid = s.tooth_uuid";

/// Diagnosis instance together with the tooth/surface it hangs from.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedDiagnosis {
    pub patient_id: PatientId,
    pub tooth_id: ToothId,
    pub tooth_code: ToothCode,
    pub surface: SurfaceName,
    pub instance: DiagnosisInstance,
}

/// Repository interface for the chart hierarchy.
pub trait ChartRepository {
    fn get_or_create_tooth(&self, patient_id: PatientId, code: &ToothCode) -> RepoResult<Tooth>;
    fn find_tooth(&self, patient_id: PatientId, code: &ToothCode) -> RepoResult<Option<Tooth>>;
    fn list_teeth(&self, patient_id: PatientId) -> RepoResult<Vec<Tooth>>;
    /// Returns `true` only when the tooth flipped from present to absent.
    fn mark_tooth_absent(&self, tooth_id: ToothId) -> RepoResult<bool>;
    fn get_or_create_surface(&self, tooth_id: ToothId, name: SurfaceName) -> RepoResult<Surface>;
    fn list_surface_diagnoses(
        &self,
        surface_id: SurfaceId,
        include_inactive: bool,
    ) -> RepoResult<Vec<DiagnosisInstance>>;
    fn get_diagnosis(
        &self,
        id: DiagnosisId,
        include_inactive: bool,
    ) -> RepoResult<Option<LocatedDiagnosis>>;
    /// Active instances of one patient, ordered by tooth, surface and
    /// insertion order.
    fn list_active_diagnoses(&self, patient_id: PatientId) -> RepoResult<Vec<LocatedDiagnosis>>;
    fn insert_diagnosis(&self, instance: &DiagnosisInstance) -> RepoResult<DiagnosisId>;
    /// Rewrites mutable fields of an active instance.
    fn update_diagnosis(&self, instance: &DiagnosisInstance) -> RepoResult<()>;
    fn soft_delete_diagnosis(&self, id: DiagnosisId) -> RepoResult<()>;
}

/// SQLite-backed chart repository. Accepts a plain connection or an open
/// transaction (via deref).
pub struct SqliteChartRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteChartRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ChartRepository for SqliteChartRepository<'_> {
    fn get_or_create_tooth(&self, patient_id: PatientId, code: &ToothCode) -> RepoResult<Tooth> {
        let now = now_epoch_ms();
        self.conn.execute(
            "INSERT INTO teeth (tooth_uuid, patient_uuid, tooth_code, is_absent, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?4)
             ON CONFLICT (patient_uuid, tooth_code) DO NOTHING;",
            params![
                Uuid::new_v4().to_string(),
                patient_id.to_string(),
                code.as_str(),
                now
            ],
        )?;

        self.find_tooth(patient_id, code)?.ok_or_else(|| {
            RepoError::InvalidData(format!("tooth `{code}` missing right after upsert"))
        })
    }

    fn find_tooth(&self, patient_id: PatientId, code: &ToothCode) -> RepoResult<Option<Tooth>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TOOTH_SELECT_SQL}
             WHERE patient_uuid = ?1 AND tooth_code = ?2;"
        ))?;
        let mut rows = stmt.query(params![patient_id.to_string(), code.as_str()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_tooth_row(row)?));
        }
        Ok(None)
    }

    fn list_teeth(&self, patient_id: PatientId) -> RepoResult<Vec<Tooth>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TOOTH_SELECT_SQL}
             WHERE patient_uuid = ?1
             ORDER BY tooth_code ASC;"
        ))?;
        let mut rows = stmt.query([patient_id.to_string()])?;
        let mut teeth = Vec::new();
        while let Some(row) = rows.next()? {
            teeth.push(parse_tooth_row(row)?);
        }
        Ok(teeth)
    }

    fn mark_tooth_absent(&self, tooth_id: ToothId) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE teeth
             SET is_absent = 1, updated_at = ?2
             WHERE tooth_uuid = ?1 AND is_absent = 0;",
            params![tooth_id.to_string(), now_epoch_ms()],
        )?;
        if changed > 0 {
            return Ok(true);
        }

        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM teeth WHERE tooth_uuid = ?1;",
                [tooth_id.to_string()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            return Err(RepoError::NotFound(tooth_id));
        }
        Ok(false)
    }

    fn get_or_create_surface(&self, tooth_id: ToothId, name: SurfaceName) -> RepoResult<Surface> {
        self.conn.execute(
            "INSERT INTO surfaces (surface_uuid, tooth_uuid, surface_name, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (tooth_uuid, surface_name) DO NOTHING;",
            params![
                Uuid::new_v4().to_string(),
                tooth_id.to_string(),
                name.as_str(),
                now_epoch_ms()
            ],
        )?;

        let surface_text: String = self.conn.query_row(
            "SELECT surface_uuid FROM surfaces WHERE tooth_uuid = ?1 AND surface_name = ?2;",
            params![tooth_id.to_string(), name.as_str()],
            |row| row.get(0),
        )?;

        Ok(Surface {
            id: parse_uuid(&surface_text, "surfaces.surface_uuid")?,
            tooth_id,
            name,
        })
    }

    fn list_surface_diagnoses(
        &self,
        surface_id: SurfaceId,
        include_inactive: bool,
    ) -> RepoResult<Vec<DiagnosisInstance>> {
        let mut stmt = self.conn.prepare(&format!(
            "{DIAGNOSIS_SELECT_SQL}
             WHERE d.surface_uuid = ?1
               AND (?2 = 1 OR d.is_active = 1)
             ORDER BY d.created_at ASC, d.rowid ASC;"
        ))?;
        let mut rows = stmt.query(params![surface_id.to_string(), bool_to_int(include_inactive)])?;
        let mut instances = Vec::new();
        while let Some(row) = rows.next()? {
            instances.push(parse_diagnosis_row(row)?.instance);
        }
        Ok(instances)
    }

    fn get_diagnosis(
        &self,
        id: DiagnosisId,
        include_inactive: bool,
    ) -> RepoResult<Option<LocatedDiagnosis>> {
        let mut stmt = self.conn.prepare(&format!(
            "{DIAGNOSIS_SELECT_SQL}
             WHERE d.diagnosis_uuid = ?1
               AND (?2 = 1 OR d.is_active = 1);"
        ))?;
        let mut rows = stmt.query(params![id.to_string(), bool_to_int(include_inactive)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_diagnosis_row(row)?));
        }
        Ok(None)
    }

    fn list_active_diagnoses(&self, patient_id: PatientId) -> RepoResult<Vec<LocatedDiagnosis>> {
        let mut stmt = self.conn.prepare(&format!(
            "{DIAGNOSIS_SELECT_SQL}
             WHERE t.patient_uuid = ?1
               AND d.is_active = 1
             ORDER BY t.tooth_code ASC, s.surface_name ASC, d.created_at ASC, d.rowid ASC;"
        ))?;
        let mut rows = stmt.query([patient_id.to_string()])?;
        let mut located = Vec::new();
        while let Some(row) = rows.next()? {
            located.push(parse_diagnosis_row(row)?);
        }
        Ok(located)
    }

    fn insert_diagnosis(&self, instance: &DiagnosisInstance) -> RepoResult<DiagnosisId> {
        instance.validate()?;

        self.conn.execute(
            "INSERT INTO diagnoses (
                diagnosis_uuid,
                surface_uuid,
                catalog_key,
                description,
                attributes_json,
                treatment_state,
                priority_override,
                is_active,
                clinician_uuid,
                created_at,
                treated_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?10);",
            params![
                instance.id.to_string(),
                instance.surface_id.to_string(),
                instance.catalog_key.as_str(),
                instance.description.as_str(),
                serde_json::to_string(&instance.attributes)?,
                instance.treatment_state.as_str(),
                instance.priority_override,
                bool_to_int(instance.is_active),
                instance.clinician_id.to_string(),
                instance.created_at,
                instance.treated_at,
            ],
        )?;

        Ok(instance.id)
    }

    fn update_diagnosis(&self, instance: &DiagnosisInstance) -> RepoResult<()> {
        instance.validate()?;

        let changed = self.conn.execute(
            "UPDATE diagnoses
             SET
                description = ?1,
                attributes_json = ?2,
                treatment_state = ?3,
                priority_override = ?4,
                treated_at = ?5,
                updated_at = ?6
             WHERE diagnosis_uuid = ?7
               AND is_active = 1;",
            params![
                instance.description.as_str(),
                serde_json::to_string(&instance.attributes)?,
                instance.treatment_state.as_str(),
                instance.priority_override,
                instance.treated_at,
                now_epoch_ms(),
                instance.id.to_string(),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(instance.id));
        }
        Ok(())
    }

    fn soft_delete_diagnosis(&self, id: DiagnosisId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE diagnoses
             SET is_active = 0, updated_at = ?2
             WHERE diagnosis_uuid = ?1
               AND is_active = 1;",
            params![id.to_string(), now_epoch_ms()],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }
}

fn parse_tooth_row(row: &Row<'_>) -> RepoResult<Tooth> {
    let id_text: String = row.get("tooth_uuid")?;
    let patient_text: String = row.get("patient_uuid")?;
    let code_text: String = row.get("tooth_code")?;
    let code = ToothCode::parse(&code_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid tooth code `{code_text}` in teeth.tooth_code"))
    })?;

    Ok(Tooth {
        id: parse_uuid(&id_text, "teeth.tooth_uuid")?,
        patient_id: parse_uuid(&patient_text, "teeth.patient_uuid")?,
        code,
        is_absent: parse_flag(row.get("is_absent")?, "teeth.is_absent")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_diagnosis_row(row: &Row<'_>) -> RepoResult<LocatedDiagnosis> {
    let id_text: String = row.get("diagnosis_uuid")?;
    let surface_text: String = row.get("surface_uuid")?;
    let clinician_text: String = row.get("clinician_uuid")?;
    let patient_text: String = row.get("patient_uuid")?;
    let tooth_text: String = row.get("tooth_uuid")?;

    let attributes_text: String = row.get("attributes_json")?;
    let attributes: AttributeMap = serde_json::from_str(&attributes_text).map_err(|err| {
        RepoError::InvalidData(format!("invalid diagnoses.attributes_json: {err}"))
    })?;

    let state_text: String = row.get("treatment_state")?;
    let treatment_state = TreatmentState::parse(&state_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid treatment state `{state_text}` in diagnoses.treatment_state"
        ))
    })?;

    let priority_override = match row.get::<_, Option<i64>>("priority_override")? {
        Some(value) => Some(u8::try_from(value).map_err(|_| {
            RepoError::InvalidData(format!(
                "invalid priority `{value}` in diagnoses.priority_override"
            ))
        })?),
        None => None,
    };

    let code_text: String = row.get("tooth_code")?;
    let tooth_code = ToothCode::parse(&code_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid tooth code `{code_text}` in teeth.tooth_code"))
    })?;
    let surface_name: String = row.get("surface_name")?;
    let surface = SurfaceName::parse(&surface_name).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid surface `{surface_name}` in surfaces.surface_name"
        ))
    })?;

    let instance = DiagnosisInstance {
        id: parse_uuid(&id_text, "diagnoses.diagnosis_uuid")?,
        surface_id: parse_uuid(&surface_text, "diagnoses.surface_uuid")?,
        catalog_key: row.get("catalog_key")?,
        description: row.get("description")?,
        attributes,
        treatment_state,
        priority_override,
        is_active: parse_flag(row.get("is_active")?, "diagnoses.is_active")?,
        clinician_id: parse_uuid(&clinician_text, "diagnoses.clinician_uuid")?,
        created_at: row.get("created_at")?,
        treated_at: row.get("treated_at")?,
    };
    instance.validate()?;

    Ok(LocatedDiagnosis {
        patient_id: parse_uuid(&patient_text, "teeth.patient_uuid")?,
        tooth_id: parse_uuid(&tooth_text, "teeth.tooth_uuid")?,
        tooth_code,
        surface,
        instance,
    })
}
