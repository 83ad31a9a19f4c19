//! SearchParameter Loader.
//!
//! Loads SearchParameter definitions from three sources:
//! - Embedded standard parameters (a core R4 subset compiled into the crate)
//! - SearchParameter resources supplied as JSON (Bundle, array or single)
//! - Runtime configuration files

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::error::LoaderError;
use crate::types::SearchParamType;

use super::registry::{
    CompositeComponentDef, SearchParameterDefinition, SearchParameterRegistry,
    SearchParameterSource, SearchParameterStatus,
};

const CANONICAL_BASE: &str = "http://hl7.org/fhir/SearchParameter";

/// One embedded parameter: base type, code, kind, expression, targets.
type EmbeddedParam = (
    &'static str,
    &'static str,
    SearchParamType,
    &'static str,
    &'static [&'static str],
);

const PERFORMERS: &[&str] = &[
    "Practitioner",
    "Organization",
    "CareTeam",
    "Patient",
    "PractitionerRole",
    "RelatedPerson",
];

#[rustfmt::skip]
const EMBEDDED: &[EmbeddedParam] = {
    use SearchParamType::{Date, Number, Quantity, Reference, String, Token, Uri};
    &[
        ("Resource", "_id", Token, "id", &[]),
        ("Resource", "_lastUpdated", Date, "meta.lastUpdated", &[]),
        ("Resource", "_tag", Token, "meta.tag", &[]),
        ("Resource", "_profile", Uri, "meta.profile", &[]),
        ("Resource", "_security", Token, "meta.security", &[]),

        ("Patient", "active", Token, "Patient.active", &[]),
        ("Patient", "address", String, "Patient.address", &[]),
        ("Patient", "birthdate", Date, "Patient.birthDate", &[]),
        ("Patient", "family", String, "Patient.name.family", &[]),
        ("Patient", "gender", Token, "Patient.gender", &[]),
        ("Patient", "general-practitioner", Reference, "Patient.generalPractitioner", &["Practitioner", "Organization", "PractitionerRole"]),
        ("Patient", "given", String, "Patient.name.given", &[]),
        ("Patient", "identifier", Token, "Patient.identifier", &[]),
        ("Patient", "link", Reference, "Patient.link.other", &["Patient", "RelatedPerson"]),
        ("Patient", "name", String, "Patient.name", &[]),
        ("Patient", "organization", Reference, "Patient.managingOrganization", &["Organization"]),
        ("Patient", "telecom", Token, "Patient.telecom", &[]),

        ("Observation", "category", Token, "Observation.category", &[]),
        ("Observation", "code", Token, "Observation.code", &[]),
        ("Observation", "date", Date, "Observation.effective", &[]),
        ("Observation", "device", Reference, "Observation.device", &["Device", "DeviceMetric"]),
        ("Observation", "encounter", Reference, "Observation.encounter", &["Encounter"]),
        ("Observation", "patient", Reference, "Observation.subject.where(resolve() is Patient)", &["Patient"]),
        ("Observation", "performer", Reference, "Observation.performer", PERFORMERS),
        ("Observation", "status", Token, "Observation.status", &[]),
        ("Observation", "subject", Reference, "Observation.subject", &["Patient", "Group", "Device", "Location"]),
        ("Observation", "value-quantity", Quantity, "Observation.value.ofType(Quantity)", &[]),
        ("Observation", "value-string", String, "Observation.value.ofType(string)", &[]),

        ("Encounter", "class", Token, "Encounter.class", &[]),
        ("Encounter", "date", Date, "Encounter.period", &[]),
        ("Encounter", "length", Quantity, "Encounter.length", &[]),
        ("Encounter", "participant", Reference, "Encounter.participant.individual", &["Practitioner", "PractitionerRole", "RelatedPerson"]),
        ("Encounter", "patient", Reference, "Encounter.subject.where(resolve() is Patient)", &["Patient"]),
        ("Encounter", "practitioner", Reference, "Encounter.participant.individual.where(resolve() is Practitioner)", &["Practitioner"]),
        ("Encounter", "status", Token, "Encounter.status", &[]),
        ("Encounter", "subject", Reference, "Encounter.subject", &["Patient", "Group"]),
        ("Encounter", "type", Token, "Encounter.type", &[]),

        ("Condition", "asserter", Reference, "Condition.asserter", &["Practitioner", "Patient", "PractitionerRole", "RelatedPerson"]),
        ("Condition", "clinical-status", Token, "Condition.clinicalStatus", &[]),
        ("Condition", "code", Token, "Condition.code", &[]),
        ("Condition", "encounter", Reference, "Condition.encounter", &["Encounter"]),
        ("Condition", "onset-date", Date, "Condition.onset.ofType(dateTime) | Condition.onset.ofType(Period)", &[]),
        ("Condition", "patient", Reference, "Condition.subject.where(resolve() is Patient)", &["Patient"]),
        ("Condition", "subject", Reference, "Condition.subject", &["Patient", "Group"]),

        ("DiagnosticReport", "code", Token, "DiagnosticReport.code", &[]),
        ("DiagnosticReport", "encounter", Reference, "DiagnosticReport.encounter", &["Encounter"]),
        ("DiagnosticReport", "performer", Reference, "DiagnosticReport.performer", PERFORMERS),
        ("DiagnosticReport", "result", Reference, "DiagnosticReport.result", &["Observation"]),
        ("DiagnosticReport", "subject", Reference, "DiagnosticReport.subject", &["Patient", "Group", "Device", "Location"]),

        ("Practitioner", "active", Token, "Practitioner.active", &[]),
        ("Practitioner", "family", String, "Practitioner.name.family", &[]),
        ("Practitioner", "identifier", Token, "Practitioner.identifier", &[]),
        ("Practitioner", "name", String, "Practitioner.name", &[]),

        ("PractitionerRole", "organization", Reference, "PractitionerRole.organization", &["Organization"]),
        ("PractitionerRole", "practitioner", Reference, "PractitionerRole.practitioner", &["Practitioner"]),

        ("Organization", "address", String, "Organization.address", &[]),
        ("Organization", "identifier", Token, "Organization.identifier", &[]),
        ("Organization", "name", String, "Organization.name", &[]),
        ("Organization", "partof", Reference, "Organization.partOf", &["Organization"]),

        ("Group", "actual", Token, "Group.actual", &[]),
        ("Group", "code", Token, "Group.code", &[]),
        ("Group", "member", Reference, "Group.member.entity", &["Patient", "Practitioner", "Group", "Device", "PractitionerRole"]),

        ("Device", "identifier", Token, "Device.identifier", &[]),
        ("Device", "organization", Reference, "Device.owner", &["Organization"]),
        ("Device", "patient", Reference, "Device.patient", &["Patient"]),
        ("Device", "type", Token, "Device.type", &[]),
        ("Device", "url", Uri, "Device.url", &[]),

        ("DeviceMetric", "source", Reference, "DeviceMetric.source", &["Device"]),

        ("RelatedPerson", "identifier", Token, "RelatedPerson.identifier", &[]),
        ("RelatedPerson", "name", String, "RelatedPerson.name", &[]),
        ("RelatedPerson", "patient", Reference, "RelatedPerson.patient", &["Patient"]),

        ("CareTeam", "participant", Reference, "CareTeam.participant.member", PERFORMERS),
        ("CareTeam", "patient", Reference, "CareTeam.subject.where(resolve() is Patient)", &["Patient"]),
        ("CareTeam", "subject", Reference, "CareTeam.subject", &["Patient", "Group"]),

        ("Location", "address", String, "Location.address", &[]),
        ("Location", "name", String, "Location.name", &[]),

        ("RiskAssessment", "probability", Number, "RiskAssessment.prediction.probability", &[]),
        ("RiskAssessment", "subject", Reference, "RiskAssessment.subject", &["Patient", "Group"]),

        ("Questionnaire", "url", Uri, "Questionnaire.url", &[]),
    ]
};

/// Loader for SearchParameter definitions.
#[derive(Debug, Default, Clone, Copy)]
pub struct SearchParameterLoader;

impl SearchParameterLoader {
    /// Creates a new loader.
    pub fn new() -> Self {
        Self
    }

    /// Loads the embedded standard parameters.
    pub fn load_embedded(&self) -> Result<Vec<SearchParameterDefinition>, LoaderError> {
        let mut params: Vec<SearchParameterDefinition> = EMBEDDED
            .iter()
            .map(|&(base, code, kind, expression, targets)| {
                let param = SearchParameterDefinition::new(
                    format!("{}/{}-{}", CANONICAL_BASE, base, code),
                    code,
                    kind,
                    expression,
                )
                .with_base([base]);
                if targets.is_empty() {
                    param
                } else {
                    param.with_targets(targets.iter().copied())
                }
            })
            .collect();

        params.push(
            SearchParameterDefinition::new(
                format!("{}/Observation-code-value-quantity", CANONICAL_BASE),
                "code-value-quantity",
                SearchParamType::Composite,
                "Observation",
            )
            .with_base(["Observation"])
            .with_components(vec![
                CompositeComponentDef {
                    definition: format!("{}/Observation-code", CANONICAL_BASE),
                    expression: "code".to_string(),
                },
                CompositeComponentDef {
                    definition: format!("{}/Observation-value-quantity", CANONICAL_BASE),
                    expression: "value.ofType(Quantity)".to_string(),
                },
            ]),
        );

        debug!(count = params.len(), "loaded embedded search parameters");
        Ok(params)
    }

    /// Builds a registry from the embedded parameters and, if given, a
    /// configuration file whose definitions are added on top.
    pub fn registry(&self, config_path: Option<&Path>) -> Result<SearchParameterRegistry, LoaderError> {
        let mut params = self.load_embedded()?;
        if let Some(path) = config_path {
            params.extend(self.load_config(path)?);
        }
        Ok(SearchParameterRegistry::from_definitions(params))
    }

    /// Loads SearchParameter resources from a JSON bundle, array or single resource.
    pub fn load_from_json(&self, json: &Value) -> Result<Vec<SearchParameterDefinition>, LoaderError> {
        let resources: Vec<&Value> = if let Some(entries) = json.get("entry").and_then(|e| e.as_array()) {
            entries.iter().filter_map(|entry| entry.get("resource")).collect()
        } else if let Some(array) = json.as_array() {
            array.iter().collect()
        } else {
            vec![json]
        };

        resources
            .into_iter()
            .filter(|r| r.get("resourceType").and_then(|t| t.as_str()) == Some("SearchParameter"))
            .map(|r| self.parse_resource(r))
            .collect()
    }

    /// Loads parameters from a configuration file.
    pub fn load_config(&self, config_path: &Path) -> Result<Vec<SearchParameterDefinition>, LoaderError> {
        let load_failed = |message: String| LoaderError::ConfigLoadFailed {
            path: config_path.display().to_string(),
            message,
        };

        let content = std::fs::read_to_string(config_path).map_err(|e| load_failed(e.to_string()))?;
        let json: Value =
            serde_json::from_str(&content).map_err(|e| load_failed(format!("Invalid JSON: {}", e)))?;

        let params: Vec<_> = self
            .load_from_json(&json)?
            .into_iter()
            .map(|p| p.with_source(SearchParameterSource::Config))
            .collect();

        debug!(path = %config_path.display(), count = params.len(), "loaded configured search parameters");
        Ok(params)
    }

    /// Parses a SearchParameter resource into a definition.
    pub fn parse_resource(&self, resource: &Value) -> Result<SearchParameterDefinition, LoaderError> {
        let url = str_field(resource, "url")
            .ok_or_else(|| LoaderError::MissingField {
                field: "url".to_string(),
                url: None,
            })?
            .to_string();
        let missing = |field: &str| LoaderError::MissingField {
            field: field.to_string(),
            url: Some(url.clone()),
        };

        let code = str_field(resource, "code").ok_or_else(|| missing("code"))?.to_string();
        let type_str = str_field(resource, "type").ok_or_else(|| missing("type"))?;
        let param_type = type_str
            .parse::<SearchParamType>()
            .map_err(|_| LoaderError::InvalidResource {
                message: format!("Unknown search parameter type: {}", type_str),
                url: Some(url.clone()),
            })?;

        let expression = str_field(resource, "expression").unwrap_or_default().to_string();
        if expression.is_empty() && param_type != SearchParamType::Composite && !code.starts_with('_') {
            return Err(missing("expression"));
        }

        let base = string_list(resource, "base").unwrap_or_default();
        if base.is_empty() {
            return Err(missing("base"));
        }

        let component = match resource.get("component").and_then(|v| v.as_array()) {
            Some(components) => Some(
                components
                    .iter()
                    .map(|c| {
                        Ok(CompositeComponentDef {
                            definition: str_field(c, "definition")
                                .ok_or_else(|| LoaderError::InvalidResource {
                                    message: "Composite component missing definition".to_string(),
                                    url: Some(url.clone()),
                                })?
                                .to_string(),
                            expression: str_field(c, "expression").unwrap_or_default().to_string(),
                        })
                    })
                    .collect::<Result<Vec<_>, LoaderError>>()?,
            )
            .filter(|c| !c.is_empty()),
            None => None,
        };

        Ok(SearchParameterDefinition {
            name: str_field(resource, "name").map(String::from),
            description: str_field(resource, "description").map(String::from),
            target: string_list(resource, "target"),
            component,
            status: str_field(resource, "status")
                .and_then(SearchParameterStatus::from_fhir_status)
                .unwrap_or_default(),
            source: SearchParameterSource::Stored,
            modifier: string_list(resource, "modifier"),
            comparator: string_list(resource, "comparator"),
            ..SearchParameterDefinition::new(url.clone(), code, param_type, expression).with_base(base)
        })
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(|v| v.as_str())
}

fn string_list(value: &Value, key: &str) -> Option<Vec<String>> {
    value.get(key).and_then(|v| v.as_array()).map(|arr| {
        arr.iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect()
    })
}
