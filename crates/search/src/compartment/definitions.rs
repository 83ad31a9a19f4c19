//! Compartment definitions.
//!
//! Maps (resource type, compartment type) to the reference parameters that
//! place a resource in that compartment.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::error::LoaderError;

use super::CompartmentType;

/// Read access to compartment definitions.
pub trait CompartmentLookup: Send + Sync {
    /// Parameters linking `resource_type` to `compartment`; `None` when the
    /// type is not part of the compartment.
    fn parameters(&self, resource_type: &str, compartment: CompartmentType) -> Option<&[String]>;
}

#[rustfmt::skip]
const STANDARD: &[(CompartmentType, &str, &[&str])] = {
    use CompartmentType::{Device, Encounter, Patient, Practitioner, RelatedPerson};
    &[
        (Patient, "CareTeam", &["patient", "participant"]),
        (Patient, "Condition", &["patient", "asserter"]),
        (Patient, "DiagnosticReport", &["subject"]),
        (Patient, "Encounter", &["patient"]),
        (Patient, "Group", &["member"]),
        (Patient, "Observation", &["subject", "performer"]),
        (Patient, "Patient", &["link"]),
        (Patient, "RelatedPerson", &["patient"]),
        (Patient, "RiskAssessment", &["subject"]),

        (Encounter, "Condition", &["encounter"]),
        (Encounter, "DiagnosticReport", &["encounter"]),
        (Encounter, "Observation", &["encounter"]),

        (Device, "DeviceMetric", &["source"]),
        (Device, "DiagnosticReport", &["subject"]),
        (Device, "Group", &["member"]),
        (Device, "Observation", &["subject", "device"]),

        (Practitioner, "CareTeam", &["participant"]),
        (Practitioner, "Condition", &["asserter"]),
        (Practitioner, "DiagnosticReport", &["performer"]),
        (Practitioner, "Encounter", &["practitioner", "participant"]),
        (Practitioner, "Group", &["member"]),
        (Practitioner, "Observation", &["performer"]),
        (Practitioner, "Patient", &["general-practitioner"]),
        (Practitioner, "PractitionerRole", &["practitioner"]),

        (RelatedPerson, "CareTeam", &["participant"]),
        (RelatedPerson, "Condition", &["asserter"]),
        (RelatedPerson, "Encounter", &["participant"]),
        (RelatedPerson, "Observation", &["performer"]),
        (RelatedPerson, "Patient", &["link"]),
    ]
};

/// Immutable compartment definition table.
#[derive(Debug, Clone, Default)]
pub struct CompartmentDefinitionRegistry {
    definitions: HashMap<(String, CompartmentType), Vec<String>>,
}

impl CompartmentDefinitionRegistry {
    /// Starts an empty builder.
    pub fn builder() -> CompartmentDefinitionRegistryBuilder {
        CompartmentDefinitionRegistryBuilder::default()
    }

    /// The embedded subset of the standard R4 compartment definitions.
    pub fn standard() -> Self {
        let mut builder = Self::builder();
        for &(compartment, resource_type, params) in STANDARD {
            builder = builder.add(compartment, resource_type, params.iter().copied());
        }
        builder.build()
    }

    /// Loads `CompartmentDefinition` resources from a Bundle, an array or a
    /// single resource.
    pub fn from_compartment_definitions(json: &Value) -> Result<Self, LoaderError> {
        let resources: Vec<&Value> = if let Some(entries) = json.get("entry").and_then(|e| e.as_array()) {
            entries.iter().filter_map(|e| e.get("resource")).collect()
        } else if let Some(array) = json.as_array() {
            array.iter().collect()
        } else {
            vec![json]
        };

        let mut builder = Self::builder();
        for resource in resources
            .into_iter()
            .filter(|r| r.get("resourceType").and_then(|t| t.as_str()) == Some("CompartmentDefinition"))
        {
            builder = builder.add_definition(resource)?;
        }
        let registry = builder.build();
        debug!(entries = registry.definitions.len(), "loaded compartment definitions");
        Ok(registry)
    }

    /// Compartment types `resource_type` can belong to.
    pub fn compartments_for(&self, resource_type: &str) -> Vec<CompartmentType> {
        CompartmentType::ALL
            .into_iter()
            .filter(|c| self.parameters(resource_type, *c).is_some())
            .collect()
    }

    /// Returns true if no definition is registered.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl CompartmentLookup for CompartmentDefinitionRegistry {
    fn parameters(&self, resource_type: &str, compartment: CompartmentType) -> Option<&[String]> {
        self.definitions
            .get(&(resource_type.to_string(), compartment))
            .map(Vec::as_slice)
    }
}

/// Builder for [`CompartmentDefinitionRegistry`].
#[derive(Debug, Default)]
pub struct CompartmentDefinitionRegistryBuilder {
    definitions: HashMap<(String, CompartmentType), Vec<String>>,
}

impl CompartmentDefinitionRegistryBuilder {
    /// Links `resource_type` to `compartment` through `params`.
    ///
    /// Repeated calls for the same pair merge their parameters.
    pub fn add<I, S>(mut self, compartment: CompartmentType, resource_type: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self
            .definitions
            .entry((resource_type.into(), compartment))
            .or_default();
        for param in params {
            let param = param.into();
            if !entry.contains(&param) {
                entry.push(param);
            }
        }
        self
    }

    fn add_definition(mut self, resource: &Value) -> Result<Self, LoaderError> {
        let url = resource.get("url").and_then(|v| v.as_str()).map(String::from);
        let code = resource
            .get("code")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LoaderError::MissingField {
                field: "code".to_string(),
                url: url.clone(),
            })?;
        let compartment = code
            .parse::<CompartmentType>()
            .map_err(|message| LoaderError::InvalidResource { message, url: url.clone() })?;

        for entry in resource
            .get("resource")
            .and_then(|r| r.as_array())
            .into_iter()
            .flatten()
        {
            let Some(resource_type) = entry.get("code").and_then(|c| c.as_str()) else {
                return Err(LoaderError::MissingField {
                    field: "resource.code".to_string(),
                    url,
                });
            };
            // `{def}` marks the compartment owner itself, which has no reference parameter.
            let params: Vec<&str> = entry
                .get("param")
                .and_then(|p| p.as_array())
                .into_iter()
                .flatten()
                .filter_map(|p| p.as_str())
                .filter(|p| *p != "{def}")
                .collect();
            if !params.is_empty() {
                self = self.add(compartment, resource_type, params);
            }
        }
        Ok(self)
    }

    /// Finishes the registry.
    pub fn build(self) -> CompartmentDefinitionRegistry {
        CompartmentDefinitionRegistry {
            definitions: self.definitions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_standard_definitions() {
        let registry = CompartmentDefinitionRegistry::standard();
        assert_eq!(
            registry.parameters("Observation", CompartmentType::Patient),
            Some(&["subject".to_string(), "performer".to_string()][..])
        );
        assert!(registry.parameters("Organization", CompartmentType::Patient).is_none());
        assert_eq!(
            registry.compartments_for("Observation"),
            vec![
                CompartmentType::Patient,
                CompartmentType::Encounter,
                CompartmentType::Device,
                CompartmentType::Practitioner,
                CompartmentType::RelatedPerson
            ]
        );
    }

    #[test]
    fn test_builder_merges_parameters() {
        let registry = CompartmentDefinitionRegistry::builder()
            .add(CompartmentType::Patient, "Observation", ["subject"])
            .add(CompartmentType::Patient, "Observation", ["subject", "performer"])
            .build();
        assert_eq!(
            registry.parameters("Observation", CompartmentType::Patient).map(<[String]>::len),
            Some(2)
        );
    }

    #[test]
    fn test_from_compartment_definitions() {
        let definition = json!({
            "resourceType": "CompartmentDefinition",
            "url": "http://hl7.org/fhir/CompartmentDefinition/patient",
            "code": "Patient",
            "resource": [
                {"code": "Observation", "param": ["subject", "performer"]},
                {"code": "Patient", "param": ["{def}", "link"]},
                {"code": "Organization"}
            ]
        });
        let registry = CompartmentDefinitionRegistry::from_compartment_definitions(&definition).unwrap();
        assert_eq!(
            registry.parameters("Patient", CompartmentType::Patient),
            Some(&["link".to_string()][..])
        );
        assert!(registry.parameters("Organization", CompartmentType::Patient).is_none());
    }

    #[test]
    fn test_unknown_compartment_code() {
        let definition = json!({
            "resourceType": "CompartmentDefinition",
            "code": "Location",
            "resource": []
        });
        assert!(matches!(
            CompartmentDefinitionRegistry::from_compartment_definitions(&definition),
            Err(LoaderError::InvalidResource { .. })
        ));
    }
}
