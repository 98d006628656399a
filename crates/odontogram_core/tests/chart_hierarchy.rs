use odontogram_core::db::open_db_in_memory;
use odontogram_core::repo::chart_repo::{ChartRepository, SqliteChartRepository};
use odontogram_core::{
    DiagnosisDescriptor, DiagnosisInstance, RepoError, SurfaceName, ToothCode, ValidationError,
};
use serde_json::json;
use uuid::Uuid;

fn code(value: &str) -> ToothCode {
    ToothCode::parse(value).unwrap()
}

#[test]
fn get_or_create_is_idempotent_per_patient_and_code() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteChartRepository::new(&conn);
    let patient = Uuid::new_v4();

    let first = repo.get_or_create_tooth(patient, &code("16")).unwrap();
    let again = repo.get_or_create_tooth(patient, &code("16")).unwrap();
    assert_eq!(first.id, again.id);
    assert!(!first.is_absent);

    let other_patient = repo.get_or_create_tooth(Uuid::new_v4(), &code("16")).unwrap();
    assert_ne!(other_patient.id, first.id);

    let occlusal = repo.get_or_create_surface(first.id, SurfaceName::Oclusal).unwrap();
    let occlusal_again = repo.get_or_create_surface(first.id, SurfaceName::Oclusal).unwrap();
    let mesial = repo.get_or_create_surface(first.id, SurfaceName::Mesial).unwrap();
    assert_eq!(occlusal.id, occlusal_again.id);
    assert_ne!(occlusal.id, mesial.id);
}

#[test]
fn teeth_are_listed_by_code() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteChartRepository::new(&conn);
    let patient = Uuid::new_v4();
    for value in ["48", "11", "85", "26"] {
        repo.get_or_create_tooth(patient, &code(value)).unwrap();
    }

    let codes: Vec<String> = repo
        .list_teeth(patient)
        .unwrap()
        .into_iter()
        .map(|tooth| tooth.code.to_string())
        .collect();
    assert_eq!(codes, vec!["11", "26", "48", "85"]);
    assert!(repo.find_tooth(patient, &code("12")).unwrap().is_none());
}

#[test]
fn absence_flips_once_and_cannot_be_reverted() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteChartRepository::new(&conn);
    let tooth = repo.get_or_create_tooth(Uuid::new_v4(), &code("38")).unwrap();

    assert!(repo.mark_tooth_absent(tooth.id).unwrap());
    assert!(!repo.mark_tooth_absent(tooth.id).unwrap());

    let err = conn
        .execute(
            "UPDATE teeth SET is_absent = 0 WHERE tooth_uuid = ?1;",
            [tooth.id.to_string()],
        )
        .unwrap_err();
    assert!(err.to_string().contains("cannot be reverted"));

    let unknown = Uuid::new_v4();
    let err = repo.mark_tooth_absent(unknown).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(id) if id == unknown));
}

#[test]
fn soft_deleted_instances_only_show_when_asked() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteChartRepository::new(&conn);
    let patient = Uuid::new_v4();
    let tooth = repo.get_or_create_tooth(patient, &code("16")).unwrap();
    let surface = repo.get_or_create_surface(tooth.id, SurfaceName::Oclusal).unwrap();

    let descriptor = DiagnosisDescriptor::new("caries_icdas_3").with_attribute("icdas", json!(3));
    let kept = DiagnosisInstance::from_descriptor(surface.id, &descriptor, Uuid::new_v4(), 10);
    let dropped = DiagnosisInstance::from_descriptor(surface.id, &descriptor, Uuid::new_v4(), 20);
    repo.insert_diagnosis(&kept).unwrap();
    repo.insert_diagnosis(&dropped).unwrap();

    repo.soft_delete_diagnosis(dropped.id).unwrap();
    assert!(matches!(
        repo.soft_delete_diagnosis(dropped.id).unwrap_err(),
        RepoError::NotFound(_)
    ));

    let active = repo.list_surface_diagnoses(surface.id, false).unwrap();
    assert_eq!(active.iter().map(|d| d.id).collect::<Vec<_>>(), vec![kept.id]);
    let all = repo.list_surface_diagnoses(surface.id, true).unwrap();
    assert_eq!(all.len(), 2);
    assert!(!all[1].is_active);

    assert!(repo.get_diagnosis(dropped.id, false).unwrap().is_none());
    let located = repo.get_diagnosis(dropped.id, true).unwrap().unwrap();
    assert_eq!(located.patient_id, patient);
    assert_eq!(located.tooth_code, code("16"));
    assert_eq!(located.surface, SurfaceName::Oclusal);

    let listed = repo.list_active_diagnoses(patient).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].instance.attributes["icdas"], json!(3));

    let mut stale = dropped.clone();
    stale.description = "edited".to_string();
    assert!(matches!(
        repo.update_diagnosis(&stale).unwrap_err(),
        RepoError::NotFound(_)
    ));
}

#[test]
fn writes_reject_invalid_instances() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteChartRepository::new(&conn);
    let tooth = repo.get_or_create_tooth(Uuid::new_v4(), &code("21")).unwrap();
    let surface = repo.get_or_create_surface(tooth.id, SurfaceName::Mesial).unwrap();

    let mut instance = DiagnosisInstance::from_descriptor(
        surface.id,
        &DiagnosisDescriptor::new("obturacion"),
        Uuid::new_v4(),
        5,
    );
    instance.priority_override = Some(9);
    let err = repo.insert_diagnosis(&instance).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(ValidationError::PriorityOutOfRange(9))
    ));
}
