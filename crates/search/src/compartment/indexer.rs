//! Compartment indexing.

use std::sync::Arc;

use tracing::trace;

use crate::types::{SearchIndexEntry, SearchValue};

use super::{CompartmentIndices, CompartmentLookup, CompartmentType};

/// Derives compartment membership from search index entries.
pub struct CompartmentIndexer {
    definitions: Arc<dyn CompartmentLookup>,
}

impl CompartmentIndexer {
    /// Creates an indexer over `definitions`.
    pub fn new(definitions: Arc<dyn CompartmentLookup>) -> Self {
        Self { definitions }
    }

    /// Computes the compartments a `resource_type` resource belongs to.
    ///
    /// A reference value counts when it carries a resource id and its target
    /// type, if known, is the compartment's own type. Its kind does not
    /// matter. A type without definitions yields empty indices.
    pub fn extract(&self, resource_type: &str, entries: &[SearchIndexEntry]) -> CompartmentIndices {
        let mut indices = CompartmentIndices::new();

        for compartment in CompartmentType::ALL {
            let Some(params) = self.definitions.parameters(resource_type, compartment) else {
                continue;
            };
            for param in params {
                let ids = entries
                    .iter()
                    .filter(|entry| &entry.parameter == param)
                    .filter_map(|entry| match &entry.value {
                        SearchValue::Reference {
                            target_type,
                            resource_id: Some(id),
                            ..
                        } if target_type
                            .as_deref()
                            .is_none_or(|t| t == compartment.as_str()) =>
                        {
                            Some(id.as_str())
                        }
                        _ => None,
                    });
                for id in ids {
                    indices.insert(compartment, id);
                }
            }
        }

        trace!(resource_type, compartments = indices.len(), "indexed compartments");
        indices
    }
}

impl std::fmt::Debug for CompartmentIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompartmentIndexer").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compartment::CompartmentDefinitionRegistry;
    use crate::types::ReferenceKind;

    fn indexer() -> CompartmentIndexer {
        CompartmentIndexer::new(Arc::new(CompartmentDefinitionRegistry::standard()))
    }

    fn reference(parameter: &str, target_type: &str, id: &str) -> SearchIndexEntry {
        SearchIndexEntry::new(
            parameter,
            SearchValue::reference(
                ReferenceKind::InternalOrExternal,
                None,
                Some(target_type.to_string()),
                Some(id.to_string()),
            ),
        )
    }

    #[test]
    fn test_subject_places_observation_in_patient_compartment() {
        let entries = vec![
            reference("subject", "Patient", "p1"),
            SearchIndexEntry::new("code", SearchValue::token_code("8867-4")),
        ];
        let indices = indexer().extract("Observation", &entries);
        assert!(indices.contains(CompartmentType::Patient, "p1"));
        assert_eq!(indices.len(), 1);
        assert!(!indices.contains(CompartmentType::Device, "p1"));
    }

    #[test]
    fn test_target_type_selects_the_compartment() {
        let entries = vec![
            reference("subject", "Patient", "123"),
            reference("performer", "Practitioner", "dr1"),
        ];
        let indices = indexer().extract("Observation", &entries);

        let patients: Vec<_> = indices.get(CompartmentType::Patient).unwrap().iter().collect();
        assert_eq!(patients, vec!["123"]);
        let practitioners: Vec<_> = indices
            .get(CompartmentType::Practitioner)
            .unwrap()
            .iter()
            .collect();
        assert_eq!(practitioners, vec!["dr1"]);
        assert!(indices.get(CompartmentType::Device).is_none());
        assert!(indices.get(CompartmentType::RelatedPerson).is_none());
        assert_eq!(indices.compartments_of("dr1"), vec![CompartmentType::Practitioner]);
    }

    #[test]
    fn test_multiple_parameters_union() {
        let entries = vec![
            reference("subject", "Patient", "p1"),
            reference("performer", "Patient", "p2"),
            reference("performer", "Practitioner", "dr1"),
        ];
        let indices = indexer().extract("Observation", &entries);
        let patients: Vec<_> = indices.get(CompartmentType::Patient).unwrap().iter().collect();
        assert_eq!(patients, vec!["p1", "p2"]);
        assert!(indices.contains(CompartmentType::Practitioner, "dr1"));
        assert!(!indices.contains(CompartmentType::Patient, "dr1"));
    }

    #[test]
    fn test_unmapped_type_and_missing_ids() {
        let entries = vec![reference("subject", "Patient", "p1")];
        assert!(indexer().extract("Organization", &entries).is_empty());

        let no_id = vec![SearchIndexEntry::new(
            "subject",
            SearchValue::reference(ReferenceKind::External, Some("http://x".into()), None, None),
        )];
        assert!(indexer().extract("Observation", &no_id).is_empty());
    }

    #[test]
    fn test_external_reference_ids_count() {
        let entries = vec![SearchIndexEntry::new(
            "subject",
            SearchValue::reference(ReferenceKind::External, None, None, Some("raw-ref".into())),
        )];
        let indices = indexer().extract("DiagnosticReport", &entries);
        assert!(indices.contains(CompartmentType::Patient, "RAW-REF"));
    }
}
