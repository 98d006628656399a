mod common;

use common::{active_ids, count_history, count_rows, fixture, payload};
use odontogram_core::{
    ChangeKind, ChartError, ChartPayload, DiagnosisDescriptor, MissingReference, SurfaceName,
    ToothCode,
};
use serde_json::json;
use std::collections::BTreeMap;
use uuid::Uuid;

fn initial_caries() -> DiagnosisDescriptor {
    DiagnosisDescriptor::new("caries_icdas_3").with_description("initial")
}

#[test]
fn scenario_create_resubmit_and_update() {
    let fx = fixture();
    let conn = fx.engine.connection();

    let first = fx
        .engine
        .reconcile(
            fx.patient,
            fx.clinician,
            &payload("16", "oclusal", vec![initial_caries()]),
        )
        .unwrap();
    assert_eq!(first.created_count, 1);
    assert_eq!(first.modified_count, 0);
    assert!(first.has_changes);
    assert_eq!(first.teeth_processed, vec!["16".to_string()]);
    assert!(first.errors.is_empty());
    let first_version = first.version_id.unwrap();

    let second = fx
        .engine
        .reconcile(fx.patient, fx.clinician, &payload("16", "oclusal", vec![initial_caries()]))
        .unwrap();
    assert_eq!(second.created_count, 0);
    assert_eq!(second.modified_count, 0);
    assert!(!second.has_changes);
    assert_eq!(second.version_id, None);
    assert_eq!(count_history(conn, "full_snapshot"), 1);

    let updated = DiagnosisDescriptor::new("caries_icdas_3").with_description("updated");
    let third = fx
        .engine
        .reconcile(fx.patient, fx.clinician, &payload("16", "oclusal", vec![updated]))
        .unwrap();
    assert_eq!(third.created_count, 0);
    assert_eq!(third.modified_count, 1);
    let third_version = third.version_id.unwrap();
    assert_ne!(third_version, first_version);

    let entries = fx.engine.history().version_entries(third_version).unwrap();
    assert_eq!(entries.len(), 2);
    assert!(matches!(entries[0].change, ChangeKind::Modified { .. }));
    let chart = entries[1].change.snapshot().unwrap();
    let tooth = ToothCode::parse("16").unwrap();
    assert_eq!(chart.surface(&tooth, SurfaceName::Oclusal)[0].description, "updated");
    assert_eq!(count_rows(conn, "diagnoses"), 1);
}

#[test]
fn resubmitting_unchanged_payload_appends_no_history() {
    let fx = fixture();
    let conn = fx.engine.connection();
    let submission = payload(
        "21",
        "mesial",
        vec![
            DiagnosisDescriptor::new("caries_icdas_3")
                .with_attribute("profundidad", json!("media")),
            DiagnosisDescriptor::new("obturacion").with_attribute("material", json!("resina")),
        ],
    );

    fx.engine
        .reconcile(fx.patient, fx.clinician, &submission)
        .unwrap();
    let history_before = count_rows(conn, "history_entries");

    let again = fx
        .engine
        .reconcile(fx.patient, fx.clinician, &submission)
        .unwrap();
    assert_eq!((again.created_count, again.modified_count), (0, 0));
    assert_eq!(count_rows(conn, "history_entries"), history_before);
}

#[test]
fn stable_id_updates_exactly_that_instance() {
    let fx = fixture();
    let submission = payload(
        "36",
        "oclusal",
        vec![
            DiagnosisDescriptor::new("caries_icdas_3").with_attribute("icdas", json!(3)),
            DiagnosisDescriptor::new("caries_icdas_3").with_attribute("icdas", json!(5)),
        ],
    );
    fx.engine
        .reconcile(fx.patient, fx.clinician, &submission)
        .unwrap();

    let rows = fx.engine.reads().list_diagnoses(fx.patient, None).unwrap();
    let target = rows
        .iter()
        .find(|row| row.instance.attributes["icdas"] == json!(5))
        .unwrap()
        .instance
        .id;

    // Attributes equal to the *other* instance; the id must still win.
    let by_id = DiagnosisDescriptor::new("caries_icdas_3")
        .with_id(target.to_string())
        .with_attribute("icdas", json!(3));
    let outcome = fx
        .engine
        .reconcile(fx.patient, fx.clinician, &payload("36", "oclusal", vec![by_id]))
        .unwrap();
    assert_eq!(outcome.modified_count, 1);
    assert_eq!(outcome.created_count, 0);

    let rows = fx.engine.reads().list_diagnoses(fx.patient, None).unwrap();
    assert_eq!(rows.len(), 2);
    let reloaded = rows.iter().find(|row| row.instance.id == target).unwrap();
    assert_eq!(reloaded.instance.attributes["icdas"], json!(3));
}

#[test]
fn placeholder_id_matches_by_equivalence_instead_of_duplicating() {
    let fx = fixture();
    let descriptor = DiagnosisDescriptor::new("obturacion")
        .with_attribute("material", json!("amalgama"))
        .with_description("old filling");
    fx.engine
        .reconcile(fx.patient, fx.clinician, &payload("46", "oclusal", vec![descriptor]))
        .unwrap();

    let resent = DiagnosisDescriptor::new("obturacion")
        .with_id("1718000000123")
        .with_attribute("material", json!("amalgama"))
        .with_description("old filling, fractured margin");
    let outcome = fx
        .engine
        .reconcile(fx.patient, fx.clinician, &payload("46", "oclusal", vec![resent]))
        .unwrap();

    assert_eq!(outcome.created_count, 0);
    assert_eq!(outcome.modified_count, 1);
    assert_eq!(count_rows(fx.engine.connection(), "diagnoses"), 1);
}

#[test]
fn instances_created_earlier_in_the_call_are_matched_later() {
    let fx = fixture();
    let outcome = fx
        .engine
        .reconcile(
            fx.patient,
            fx.clinician,
            &payload(
                "11",
                "vestibular",
                vec![
                    DiagnosisDescriptor::new("caries_icdas_3").with_description("a"),
                    DiagnosisDescriptor::new("caries_icdas_3").with_description("b"),
                ],
            ),
        )
        .unwrap();

    assert_eq!(outcome.created_count, 1);
    assert_eq!(outcome.modified_count, 1);
    let rows = fx.engine.reads().list_diagnoses(fx.patient, None).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].instance.description, "b");
}

#[test]
fn bad_items_are_reported_without_aborting_the_batch() {
    let fx = fixture();
    let mut submission: ChartPayload = BTreeMap::new();
    submission.insert(
        "16".to_string(),
        BTreeMap::from([
            (
                "oclusal".to_string(),
                vec![
                    DiagnosisDescriptor::new("caries_icdas_3"),
                    DiagnosisDescriptor::new("not_in_catalog"),
                    DiagnosisDescriptor::new("obturacion").with_attribute(" ", json!(1)),
                ],
            ),
            ("buccal".to_string(), vec![DiagnosisDescriptor::new("obturacion")]),
        ]),
    );
    submission.insert(
        "99".to_string(),
        BTreeMap::from([("oclusal".to_string(), vec![DiagnosisDescriptor::new("obturacion")])]),
    );

    let outcome = fx
        .engine
        .reconcile(fx.patient, fx.clinician, &submission)
        .unwrap();

    assert_eq!(outcome.created_count, 1);
    assert_eq!(outcome.teeth_processed, vec!["16".to_string()]);
    assert_eq!(outcome.errors.len(), 4);
    assert!(outcome.errors.iter().any(|e| e.contains("not_in_catalog")));
    assert!(outcome.errors.iter().any(|e| e.contains("buccal")));
    assert!(outcome.errors.iter().any(|e| e.contains("99")));
    assert!(outcome.errors.iter().any(|e| e.contains("blank")));
    assert!(outcome.has_changes);
}

#[test]
fn nested_attribute_values_are_stored_and_compared_whole() {
    let fx = fixture();
    let conn = fx.engine.connection();
    let submission = payload(
        "26",
        "oclusal",
        vec![DiagnosisDescriptor::new("obturacion")
            .with_attribute("detalle", json!({"material": "resina", "caras": [{"cara": "o"}]}))],
    );

    let first = fx
        .engine
        .reconcile(fx.patient, fx.clinician, &submission)
        .unwrap();
    assert_eq!(first.created_count, 1);
    assert!(first.errors.is_empty());

    let history_before = count_rows(conn, "history_entries");
    let again = fx
        .engine
        .reconcile(fx.patient, fx.clinician, &submission)
        .unwrap();
    assert!(!again.has_changes);
    assert_eq!(count_rows(conn, "history_entries"), history_before);

    let rows = fx.engine.reads().list_diagnoses(fx.patient, None).unwrap();
    assert_eq!(rows[0].instance.attributes["detalle"]["caras"][0]["cara"], json!("o"));
}

#[test]
fn unknown_patient_or_clinician_aborts_without_writes() {
    let fx = fixture();
    let conn = fx.engine.connection();
    let submission = payload("16", "oclusal", vec![initial_caries()]);

    let stranger = Uuid::new_v4();
    let err = fx
        .engine
        .reconcile(stranger, fx.clinician, &submission)
        .unwrap_err();
    assert!(matches!(
        err,
        ChartError::ReferenceNotFound(MissingReference::Patient(id)) if id == stranger
    ));

    let err = fx
        .engine
        .reconcile(fx.patient, stranger, &submission)
        .unwrap_err();
    assert!(matches!(
        err,
        ChartError::ReferenceNotFound(MissingReference::Clinician(_))
    ));

    assert_eq!(count_rows(conn, "teeth"), 0);
    assert_eq!(count_rows(conn, "history_entries"), 0);
}

#[test]
fn latest_snapshot_matches_active_instances_after_every_write() {
    let fx = fixture();
    let conn = fx.engine.connection();

    fx.engine
        .reconcile(
            fx.patient,
            fx.clinician,
            &payload(
                "16",
                "oclusal",
                vec![
                    DiagnosisDescriptor::new("caries_icdas_3"),
                    DiagnosisDescriptor::new("obturacion"),
                ],
            ),
        )
        .unwrap();
    fx.engine
        .reconcile(
            fx.patient,
            fx.clinician,
            &payload("55", "distal", vec![DiagnosisDescriptor::new("caries_icdas_4")]),
        )
        .unwrap();

    let latest = fx.engine.history().latest_version_diff(fx.patient).unwrap().unwrap();
    let mut snapshot_ids: Vec<Uuid> = latest.diagnoses.iter().map(|d| d.diagnosis.id).collect();
    snapshot_ids.sort();
    assert_eq!(snapshot_ids, active_ids(conn));

    let to_delete = snapshot_ids[0];
    fx.engine
        .diagnoses()
        .soft_delete_batch(fx.patient, fx.clinician, &[to_delete])
        .unwrap();
    let latest = fx.engine.history().latest_version_diff(fx.patient).unwrap().unwrap();
    let mut snapshot_ids: Vec<Uuid> = latest.diagnoses.iter().map(|d| d.diagnosis.id).collect();
    snapshot_ids.sort();
    assert_eq!(snapshot_ids, active_ids(conn));
    assert!(!snapshot_ids.contains(&to_delete));
}

#[test]
fn storage_failure_rolls_back_the_whole_call() {
    let fx = fixture();
    let conn = fx.engine.connection();
    fx.engine
        .reconcile(fx.patient, fx.clinician, &payload("16", "oclusal", vec![initial_caries()]))
        .unwrap();
    let cached = fx.engine.get_current_chart(fx.patient).unwrap();

    conn.execute_batch(
        "CREATE TRIGGER reject_history BEFORE INSERT ON history_entries
         BEGIN SELECT RAISE(ABORT, 'history unavailable'); END;",
    )
    .unwrap();

    let err = fx
        .engine
        .reconcile(
            fx.patient,
            fx.clinician,
            &payload("17", "mesial", vec![DiagnosisDescriptor::new("obturacion")]),
        )
        .unwrap_err();
    assert!(matches!(err, ChartError::Repo(_)));

    assert_eq!(count_rows(conn, "diagnoses"), 1);
    assert_eq!(count_rows(conn, "teeth"), 1);
    assert!(fx.engine.context().cache.contains(fx.patient));
    assert_eq!(fx.engine.get_current_chart(fx.patient).unwrap(), cached);
}

#[test]
fn teeth_are_processed_in_code_order_and_snapshot_anchors_on_the_lowest() {
    let fx = fixture();
    let submission: ChartPayload = serde_json::from_value(json!({
        "21": {"mesial": [{"catalog_key": "obturacion"}]},
        "16": {"oclusal": [{"catalog_key": "caries_icdas_3"}]}
    }))
    .unwrap();

    let outcome = fx
        .engine
        .reconcile(fx.patient, fx.clinician, &submission)
        .unwrap();
    assert_eq!(outcome.teeth_processed, vec!["16".to_string(), "21".to_string()]);

    let entries = fx
        .engine
        .history()
        .version_entries(outcome.version_id.unwrap())
        .unwrap();
    let snapshot = entries.last().unwrap();
    assert!(snapshot.change.is_snapshot());
    let tooth_16 = fx.engine.teeth().find_tooth(fx.patient, "16").unwrap().unwrap();
    assert_eq!(snapshot.tooth_id, tooth_16.id);
}

#[test]
fn legacy_payload_json_is_accepted() {
    let fx = fixture();
    let submission: ChartPayload = serde_json::from_value(json!({
        "26": {
            "cara_oclusal": [
                {"id": 1718000000999_i64, "procedimientoId": "caries_icdas_3", "secondaryOptions": null, "descripcion": "legacy"}
            ]
        }
    }))
    .unwrap();

    let outcome = fx
        .engine
        .reconcile(fx.patient, fx.clinician, &submission)
        .unwrap();
    assert_eq!(outcome.created_count, 1);

    let chart = fx.engine.get_current_chart(fx.patient).unwrap();
    let diagnoses = chart.surface(&ToothCode::parse("26").unwrap(), SurfaceName::Oclusal);
    assert_eq!(diagnoses.len(), 1);
    assert_eq!(diagnoses[0].description, "legacy");
    assert_eq!(diagnoses[0].siglas, "C3");
}
