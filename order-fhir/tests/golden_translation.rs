use std::fs;

use chrono::{DateTime, Utc};
use order_core::{
    LabOrder, Lineage, OrderId, OrderStatus, OrderTranslator, TestCategory, TranslationConfig,
};
use order_fhir::{load_bundle_str, load_bundle_value, ClinicalRecord};
use serde_json::{json, Value};

fn fixture_path(name: &str) -> String {
    format!("{}/tests/data/{name}", env!("CARGO_MANIFEST_DIR"))
}

fn read_fixture(name: &str) -> String {
    fs::read_to_string(fixture_path(name)).expect("fixture should be readable")
}

fn load_record(config: &TranslationConfig) -> ClinicalRecord {
    load_bundle_str(&read_fixture("vl_patient_bundle.json"), config).expect("bundle should load")
}

fn load_order(name: &str) -> LabOrder {
    serde_json::from_str(&read_fixture(name)).expect("order fixture should parse")
}

fn now() -> DateTime<Utc> {
    "2024-02-02T00:00:00Z".parse().expect("valid timestamp")
}

#[test]
fn viral_load_translation_matches_golden() {
    let config = TranslationConfig::default();
    let record = load_record(&config);
    let translator = OrderTranslator::new(&record.observations, &record.catalog, &config);

    let translation = translator
        .translate(&load_order("vl_order.json"), now())
        .expect("translation should succeed");

    let actual = serde_json::to_value(&translation).expect("translation should serialize");
    let expected: Value =
        serde_json::from_str(&read_fixture("vl_translation.json")).expect("golden should parse");

    assert_eq!(actual, expected);
}

#[test]
fn identifier_survives_repeated_translation() {
    let config = TranslationConfig::default();
    let record = load_record(&config);
    let translator = OrderTranslator::new(&record.observations, &record.catalog, &config);
    let order = load_order("vl_order.json");
    let before = record.observations.len().unwrap();

    let first = translator.translate(&order, now()).unwrap();
    let second = translator.translate(&order, now()).unwrap();

    assert_eq!(first.identifier, second.identifier);
    assert_eq!(record.observations.len().unwrap(), before + 1);
}

#[test]
fn unlinked_identifier_from_bundle_is_not_stored_twice() {
    let config = TranslationConfig::default();
    let bundle = json!({
        "resourceType": "Bundle",
        "entry": [{
            "resource": {
                "resourceType": "Observation",
                "id": "lab-no-legacy",
                "subject": { "reference": "Patient/p1" },
                "code": { "text": "eRegister Lab Order Number" },
                "issued": "2023-11-02T09:00:00Z",
                "valueString": "CBNH000045"
            }
        }]
    });
    let record = load_bundle_value(&bundle, &config).expect("bundle should load");
    let translator = OrderTranslator::new(&record.observations, &record.catalog, &config);
    assert_eq!(record.observations.len().unwrap(), 1);

    let translation = translator
        .translate(&load_order("vl_order.json"), now())
        .unwrap();

    assert_eq!(translation.identifier.as_str(), "CBNH000045");
    assert_eq!(record.observations.len().unwrap(), 1);
}

#[test]
fn tb_order_reuses_identifier_from_bundle() {
    let config = TranslationConfig::default();
    let record = load_record(&config);
    let translator = OrderTranslator::new(&record.observations, &record.catalog, &config);
    let before = record.observations.len().unwrap();

    let translation = translator
        .translate(&load_order("tb_order.json"), now())
        .unwrap();

    assert_eq!(translation.identifier.as_str(), "YPDE000123");
    assert_eq!(record.observations.len().unwrap(), before);
    assert_eq!(translation.category, TestCategory::TbGeneXpert);
    assert_eq!(translation.status, OrderStatus::Completed);
    assert_eq!(
        translation.lineage,
        Lineage::Replaces(OrderId("o-150".to_string()))
    );
    assert_eq!(translation.specimen.unwrap().specimen_type, "Sputum");

    let info = translation.supporting_info.unwrap();
    let labels: Vec<&str> = info.present().map(|(label, _)| label).collect();
    assert_eq!(labels, ["TB, Genexpert test type"]);
    assert_eq!(
        info.get("TB, Genexpert test type")
            .and_then(|entry| entry.observation.as_ref())
            .map(|obs| obs.id.as_str()),
        Some("tb-1")
    );
}

#[test]
fn batch_keeps_going_past_a_bad_order() {
    let config = TranslationConfig::default();
    let record = load_record(&config);
    let translator = OrderTranslator::new(&record.observations, &record.catalog, &config);

    let mut broken = load_order("vl_order.json");
    broken.id = OrderId("o-999".to_string());
    broken.facility_code = "HQ".to_string();

    let results = translator.translate_batch(
        &[broken, load_order("vl_order.json"), load_order("tb_order.json")],
        now(),
    );

    assert!(results[0].is_err());
    assert_eq!(results[1].as_ref().unwrap().identifier.as_str(), "CBNH000045");
    assert_eq!(results[2].as_ref().unwrap().identifier.as_str(), "YPDE000123");
}
