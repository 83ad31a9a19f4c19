//! End-to-end indexing: resource JSON to index entries to compartments.

mod common;

use std::io::Write;
use std::sync::Arc;

use helios_search::types::ReferenceKind;
use helios_search::{
    CompartmentDefinitionRegistry, CompartmentType, ExtractionError, SearchConfig, SearchEngine,
    SearchError, SearchValue,
};
use serde_json::json;

use common::*;

#[test]
fn observation_entries() {
    let indexed = engine().index(&blood_pressure(), "Observation").unwrap();

    let codes: Vec<_> = indexed
        .entries
        .iter()
        .filter(|e| e.parameter == "code")
        .collect();
    assert_eq!(codes.len(), 3);

    let patient: Vec<_> = indexed
        .entries
        .iter()
        .filter(|e| e.parameter == "patient")
        .filter_map(|e| e.value.reference_id())
        .collect();
    assert_eq!(patient, vec!["p1"]);

    assert!(indexed.entries.iter().any(|e| e.parameter == "value-quantity"));
    assert!(indexed
        .entries
        .iter()
        .any(|e| e.parameter == "_id" && matches!(&e.value, SearchValue::Token { code, .. } if code == "bp-1")));
}

#[test]
fn observation_compartments() {
    let indexed = engine().index(&blood_pressure(), "Observation").unwrap();
    let compartments = &indexed.compartments;

    assert!(compartments.contains(CompartmentType::Patient, "p1"));
    assert!(compartments.contains(CompartmentType::Encounter, "e1"));
    assert!(compartments.contains(CompartmentType::Practitioner, "dr1"));

    // `Patient/p1` and `Patient/P1` are the same owner.
    let patients = compartments.get(CompartmentType::Patient).unwrap();
    assert_eq!(patients.iter().filter(|id| id.eq_ignore_ascii_case("p1")).count(), 1);
    assert_eq!(patients.iter().find(|id| id.eq_ignore_ascii_case("p1")), Some("p1"));
}

#[test]
fn membership_ignores_case() {
    let observation = ObservationFixture::new("o1")
        .with_subject("Patient/ABC")
        .to_json();
    let indexed = engine().index(&observation, "Observation").unwrap();
    assert!(indexed.compartments.contains(CompartmentType::Patient, "abc"));
    assert!(indexed.compartments.contains(CompartmentType::Patient, "Abc"));
    assert_eq!(
        indexed.compartments.compartments_of("abc"),
        vec![CompartmentType::Patient]
    );
}

#[test]
fn patient_compartments_from_links_and_practitioner() {
    let indexed = engine().index(&linked_patient(), "Patient").unwrap();

    assert!(indexed.compartments.contains(CompartmentType::Patient, "p1"));
    // `link` also feeds the RelatedPerson compartment, but only for RelatedPerson targets.
    assert!(indexed.compartments.get(CompartmentType::RelatedPerson).is_none());
    assert!(indexed.compartments.contains(CompartmentType::Practitioner, "dr1"));
    assert!(indexed.compartments.get(CompartmentType::Encounter).is_none());

    let gp = indexed
        .entries
        .iter()
        .find(|e| e.parameter == "general-practitioner")
        .unwrap();
    assert_eq!(gp.value, SearchValue::internal_reference("Practitioner", "dr1"));
}

#[test]
fn performers_only_enter_their_own_compartment() {
    let indexed = engine().index(&blood_pressure(), "Observation").unwrap();
    let compartments = &indexed.compartments;

    assert!(!compartments.contains(CompartmentType::Patient, "dr1"));
    assert!(!compartments.contains(CompartmentType::RelatedPerson, "dr1"));
    assert!(compartments.get(CompartmentType::Device).is_none());
    assert_eq!(compartments.compartments_of("dr1"), vec![CompartmentType::Practitioner]);
    assert_eq!(compartments.compartments_of("p1"), vec![CompartmentType::Patient]);
}

#[test]
fn external_references_still_place_the_resource() {
    let observation = ObservationFixture::new("o2")
        .with_subject("http://other.org/fhir/Patient/x9")
        .to_json();
    let indexed = engine().index(&observation, "Observation").unwrap();

    let subject = indexed
        .entries
        .iter()
        .find(|e| e.parameter == "subject")
        .unwrap();
    assert!(matches!(
        subject.value,
        SearchValue::Reference { kind: ReferenceKind::External, .. }
    ));
    assert!(indexed.compartments.contains(CompartmentType::Patient, "x9"));
}

#[test]
fn contained_and_urn_references_are_not_owners() {
    let observation = ObservationFixture::new("o3")
        .with_subject("#p")
        .with_performer("urn:uuid:5f0c5b0e-2c1a-4c5e-9b0a-1c2d3e4f5a6b")
        .to_json();
    let indexed = engine().index(&observation, "Observation").unwrap();
    assert!(indexed.compartments.is_empty());
}

#[test]
fn unmapped_type_has_no_compartments() {
    let organization = json!({
        "resourceType": "Organization",
        "id": "org1",
        "name": "Acme",
        "partOf": {"reference": "Organization/org0"}
    });
    let indexed = engine().index(&organization, "Organization").unwrap();
    assert!(!indexed.entries.is_empty());
    assert!(indexed.compartments.is_empty());
}

#[test]
fn resource_type_mismatch() {
    let result = engine().index(&linked_patient(), "Observation");
    assert!(matches!(
        result,
        Err(SearchError::Extraction(ExtractionError::InvalidResource { .. }))
    ));
}

#[test]
fn loaded_compartment_definitions_union_parameters() {
    let definitions = json!({
        "resourceType": "Bundle",
        "entry": [{"resource": {
            "resourceType": "CompartmentDefinition",
            "code": "Patient",
            "resource": [
                {"code": "Observation", "param": ["subject", "performer", "patient"]}
            ]
        }}]
    });
    let compartments = CompartmentDefinitionRegistry::from_compartment_definitions(&definitions).unwrap();
    let engine = SearchEngine::with_definitions(
        registry(),
        Arc::new(compartments),
        &SearchConfig::default(),
    )
    .unwrap();

    let observation = ObservationFixture::new("o4")
        .with_subject("Patient/p1")
        .with_performer("Patient/p2")
        .with_performer("RelatedPerson/rp1")
        .to_json();
    let indexed = engine.index(&observation, "Observation").unwrap();

    let patients: Vec<_> = indexed
        .compartments
        .get(CompartmentType::Patient)
        .unwrap()
        .iter()
        .collect();
    assert_eq!(patients, vec!["p1", "p2"]);
    assert_eq!(indexed.compartments.len(), 1);
}

#[test]
fn configured_parameters_are_indexed() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        "{}",
        json!({
            "resourceType": "SearchParameter",
            "url": "http://example.org/SearchParameter/Patient-given-name",
            "code": "given-name",
            "type": "string",
            "expression": "Patient.name.given",
            "base": ["Patient"]
        })
    )
    .unwrap();

    let config = SearchConfig {
        params_config: Some(file.path().to_path_buf()),
        ..Default::default()
    };
    let engine = SearchEngine::new(&config).unwrap();

    let indexed = engine.index(&linked_patient(), "Patient").unwrap();
    let given: Vec<_> = indexed
        .entries
        .iter()
        .filter(|e| e.parameter == "given-name")
        .collect();
    assert_eq!(given.len(), 2);

    assert!(engine.parse("Patient", "given-name", "peter").is_ok());
}
