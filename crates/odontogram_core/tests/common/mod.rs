#![allow(dead_code)]

use odontogram_core::{
    CatalogEntry, ChartEngine, ChartPayload, DiagnosisDescriptor, EngineConfig, InMemoryCatalog,
    InMemoryDirectory,
};
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

pub struct Fixture {
    pub engine: ChartEngine,
    pub patient: Uuid,
    pub clinician: Uuid,
}

pub fn catalog() -> InMemoryCatalog {
    let mut caries3 = CatalogEntry::new("caries_icdas_3", "Caries ICDAS 3", 4);
    caries3.siglas = "C3".to_string();
    caries3.color = "#d32f2f".to_string();
    caries3.category = "patologia".to_string();
    caries3.applicable_areas = vec!["corona".to_string()];

    let caries4 = CatalogEntry::new("caries_icdas_4", "Caries ICDAS 4", 5);
    let mut filling = CatalogEntry::new("obturacion", "Obturacion", 2);
    filling.category = "tratamiento".to_string();

    InMemoryCatalog::new()
        .with_entry(caries3)
        .and_then(|catalog| catalog.with_entry(caries4))
        .and_then(|catalog| catalog.with_entry(filling))
        .unwrap()
}

pub fn fixture() -> Fixture {
    fixture_with_config(&EngineConfig::default())
}

pub fn fixture_with_config(config: &EngineConfig) -> Fixture {
    let patient = Uuid::new_v4();
    let clinician = Uuid::new_v4();
    let directory = InMemoryDirectory::new()
        .with_patient(patient)
        .with_clinician(clinician);
    let engine =
        ChartEngine::open_in_memory(config, Arc::new(catalog()), Arc::new(directory)).unwrap();
    Fixture {
        engine,
        patient,
        clinician,
    }
}

/// Single tooth/surface payload.
pub fn payload(tooth: &str, surface: &str, descriptors: Vec<DiagnosisDescriptor>) -> ChartPayload {
    let mut surfaces = BTreeMap::new();
    surfaces.insert(surface.to_string(), descriptors);
    let mut payload = ChartPayload::new();
    payload.insert(tooth.to_string(), surfaces);
    payload
}

pub fn count_rows(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

pub fn count_history(conn: &Connection, kind: &str) -> i64 {
    conn.query_row(
        "SELECT COUNT(*) FROM history_entries WHERE change_kind = ?1;",
        [kind],
        |row| row.get(0),
    )
    .unwrap()
}

/// Ids of active diagnoses straight from storage.
pub fn active_ids(conn: &Connection) -> Vec<Uuid> {
    let mut stmt = conn
        .prepare("SELECT diagnosis_uuid FROM diagnoses WHERE is_active = 1;")
        .unwrap();
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .unwrap();
    let mut ids: Vec<Uuid> = rows
        .map(|row| Uuid::parse_str(&row.unwrap()).unwrap())
        .collect();
    ids.sort();
    ids
}
