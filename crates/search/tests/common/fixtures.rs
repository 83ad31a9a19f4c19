//! Resource fixtures for indexing tests.

use serde_json::{Value, json};

/// An Observation fixture.
#[derive(Debug, Clone)]
pub struct ObservationFixture {
    /// Observation ID.
    pub id: String,
    /// Subject reference.
    pub subject: Option<String>,
    /// Performer references.
    pub performers: Vec<String>,
    /// Encounter reference.
    pub encounter: Option<String>,
    /// Codings of `Observation.code` (system, code).
    pub codings: Vec<(String, String)>,
    /// `valueQuantity` (value, unit code).
    pub value_quantity: Option<(f64, String)>,
}

impl ObservationFixture {
    /// Creates an observation with no elements besides its id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subject: None,
            performers: vec![],
            encounter: None,
            codings: vec![],
            value_quantity: None,
        }
    }

    /// Sets the subject reference.
    pub fn with_subject(mut self, reference: impl Into<String>) -> Self {
        self.subject = Some(reference.into());
        self
    }

    /// Adds a performer reference.
    pub fn with_performer(mut self, reference: impl Into<String>) -> Self {
        self.performers.push(reference.into());
        self
    }

    /// Sets the encounter reference.
    pub fn with_encounter(mut self, reference: impl Into<String>) -> Self {
        self.encounter = Some(reference.into());
        self
    }

    /// Adds a coding.
    pub fn with_coding(mut self, system: impl Into<String>, code: impl Into<String>) -> Self {
        self.codings.push((system.into(), code.into()));
        self
    }

    /// Sets a UCUM quantity value.
    pub fn with_value_quantity(mut self, value: f64, unit: impl Into<String>) -> Self {
        self.value_quantity = Some((value, unit.into()));
        self
    }

    /// Converts to FHIR JSON.
    pub fn to_json(&self) -> Value {
        let mut observation = json!({
            "resourceType": "Observation",
            "id": self.id,
            "status": "final"
        });

        if !self.codings.is_empty() {
            let codings: Vec<Value> = self
                .codings
                .iter()
                .map(|(system, code)| json!({"system": system, "code": code}))
                .collect();
            observation["code"] = json!({"coding": codings});
        }
        if let Some(subject) = &self.subject {
            observation["subject"] = json!({"reference": subject});
        }
        if !self.performers.is_empty() {
            let performers: Vec<Value> = self
                .performers
                .iter()
                .map(|reference| json!({"reference": reference}))
                .collect();
            observation["performer"] = json!(performers);
        }
        if let Some(encounter) = &self.encounter {
            observation["encounter"] = json!({"reference": encounter});
        }
        if let Some((value, unit)) = &self.value_quantity {
            observation["valueQuantity"] = json!({
                "value": value,
                "system": "http://unitsofmeasure.org",
                "code": unit,
                "unit": unit
            });
        }
        observation
    }
}

/// A blood pressure observation for patient `p1`, recorded by `dr1`.
pub fn blood_pressure() -> Value {
    ObservationFixture::new("bp-1")
        .with_subject("Patient/p1")
        .with_performer("Practitioner/dr1")
        .with_performer("Patient/P1")
        .with_encounter("Encounter/e1")
        .with_coding("http://loinc.org", "85354-9")
        .with_coding("http://loinc.org", "8480-6")
        .with_coding("http://snomed.info/sct", "271649006")
        .with_value_quantity(120.0, "mm[Hg]")
        .to_json()
}

/// A patient linked to another patient and a general practitioner.
pub fn linked_patient() -> Value {
    json!({
        "resourceType": "Patient",
        "id": "p2",
        "name": [{"family": "Chalmers", "given": ["Peter", "James"]}],
        "gender": "male",
        "birthDate": "1974-12-25",
        "link": [{"other": {"reference": "Patient/p1"}, "type": "seealso"}],
        "generalPractitioner": [{"reference": "http://localhost:8080/Practitioner/dr1"}]
    })
}
