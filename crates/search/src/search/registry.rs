//! SearchParameter Registry.
//!
//! The registry holds every known SearchParameter, indexed by both
//! (resource_type, param_code) and canonical URL. It is filled once at
//! startup and then shared read-only behind an `Arc`; the query parser and
//! the indexer only see it through [`ParameterLookup`].

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::types::SearchParamType;

/// Resource types whose parameters apply to every resource.
const ABSTRACT_BASES: [&str; 2] = ["DomainResource", "Resource"];

/// Status of a SearchParameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchParameterStatus {
    /// Active - can be used in searches.
    #[default]
    Active,
    /// Draft - informational, not yet active.
    Draft,
    /// Retired - disabled, not usable.
    Retired,
}

impl SearchParameterStatus {
    /// Parse from FHIR status string.
    pub fn from_fhir_status(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(SearchParameterStatus::Active),
            "draft" => Some(SearchParameterStatus::Draft),
            "retired" => Some(SearchParameterStatus::Retired),
            _ => None,
        }
    }

    /// Returns true if this status allows the parameter to be used in searches.
    pub fn is_usable(&self) -> bool {
        *self == SearchParameterStatus::Active
    }
}

/// Source of a SearchParameter definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchParameterSource {
    /// Built-in standard parameters.
    #[default]
    Embedded,
    /// SearchParameter resources supplied at runtime.
    Stored,
    /// Runtime configuration file.
    Config,
}

/// Component of a composite search parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeComponentDef {
    /// Definition URL of the component parameter.
    pub definition: String,
    /// Path of the component relative to the composite's element.
    pub expression: String,
}

/// Complete definition of a SearchParameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParameterDefinition {
    /// Canonical URL (unique identifier).
    pub url: String,

    /// Parameter code (the URL param name, e.g., "name", "identifier").
    pub code: String,

    /// Human-readable name.
    pub name: Option<String>,

    /// Description of the parameter.
    pub description: Option<String>,

    /// The parameter type.
    pub param_type: SearchParamType,

    /// Path expression for extracting values.
    pub expression: String,

    /// Resource types this parameter applies to.
    pub base: Vec<String>,

    /// Target resource types (for reference parameters).
    pub target: Option<Vec<String>>,

    /// Components (for composite parameters).
    pub component: Option<Vec<CompositeComponentDef>>,

    /// Current status.
    pub status: SearchParameterStatus,

    /// Source of this definition.
    pub source: SearchParameterSource,

    /// Supported modifiers, when the definition restricts them.
    pub modifier: Option<Vec<String>>,

    /// Comparators supported (for number/date/quantity).
    pub comparator: Option<Vec<String>>,
}

impl SearchParameterDefinition {
    /// Creates a new SearchParameter definition.
    pub fn new(
        url: impl Into<String>,
        code: impl Into<String>,
        param_type: SearchParamType,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            code: code.into(),
            name: None,
            description: None,
            param_type,
            expression: expression.into(),
            base: Vec::new(),
            target: None,
            component: None,
            status: SearchParameterStatus::Active,
            source: SearchParameterSource::Embedded,
            modifier: None,
            comparator: None,
        }
    }

    /// Sets the base resource types.
    pub fn with_base<I, S>(mut self, base: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base = base.into_iter().map(Into::into).collect();
        self
    }

    /// Sets target types for reference parameters.
    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target = Some(targets.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the composite components.
    pub fn with_components(mut self, components: Vec<CompositeComponentDef>) -> Self {
        self.component = Some(components);
        self
    }

    /// Sets the source.
    pub fn with_source(mut self, source: SearchParameterSource) -> Self {
        self.source = source;
        self
    }

    /// Sets the status.
    pub fn with_status(mut self, status: SearchParameterStatus) -> Self {
        self.status = status;
        self
    }

    /// Returns whether this is a composite parameter.
    pub fn is_composite(&self) -> bool {
        self.param_type == SearchParamType::Composite
            && self
                .component
                .as_ref()
                .map(|c| !c.is_empty())
                .unwrap_or(false)
    }

    /// Returns whether this parameter is reference-kind.
    pub fn is_reference(&self) -> bool {
        self.param_type == SearchParamType::Reference
    }

    /// Declared target types; empty for non-reference parameters.
    pub fn targets(&self) -> &[String] {
        self.target.as_deref().unwrap_or(&[])
    }

    /// Returns whether this parameter applies to the given resource type.
    pub fn applies_to(&self, resource_type: &str) -> bool {
        self.base
            .iter()
            .any(|b| b == resource_type || ABSTRACT_BASES.contains(&b.as_str()))
    }
}

/// Read access to parameter definitions.
///
/// Implementations must be safe to share across threads; lookups never
/// mutate.
pub trait ParameterLookup: Send + Sync {
    /// Finds the usable parameter `code` on `resource_type`, falling back to
    /// parameters declared on `DomainResource` and `Resource`.
    fn lookup(&self, resource_type: &str, code: &str) -> Option<Arc<SearchParameterDefinition>>;

    /// Finds a parameter by canonical URL regardless of resource type.
    fn lookup_url(&self, url: &str) -> Option<Arc<SearchParameterDefinition>>;

    /// Every usable parameter that applies to `resource_type`, type-specific
    /// definitions shadowing inherited ones with the same code.
    fn parameters_for(&self, resource_type: &str) -> Vec<Arc<SearchParameterDefinition>>;
}

/// In-memory registry of SearchParameter definitions.
#[derive(Default)]
pub struct SearchParameterRegistry {
    /// Parameters indexed by (resource_type, param_code).
    params_by_type: HashMap<String, HashMap<String, Arc<SearchParameterDefinition>>>,

    /// Parameters indexed by canonical URL.
    params_by_url: HashMap<String, Arc<SearchParameterDefinition>>,
}

impl SearchParameterRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from definitions, skipping duplicate URLs.
    pub fn from_definitions<I>(definitions: I) -> Self
    where
        I: IntoIterator<Item = SearchParameterDefinition>,
    {
        let mut registry = Self::new();
        for def in definitions {
            if !registry.params_by_url.contains_key(&def.url) {
                registry.register_internal(def);
            }
        }
        registry
    }

    /// Returns the number of registered parameters.
    pub fn len(&self) -> usize {
        self.params_by_url.len()
    }

    /// Returns true if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.params_by_url.is_empty()
    }

    /// Registers a new parameter.
    pub fn register(&mut self, param: SearchParameterDefinition) -> Result<(), RegistryError> {
        if self.params_by_url.contains_key(&param.url) {
            return Err(RegistryError::DuplicateUrl { url: param.url });
        }
        if param.base.is_empty() {
            return Err(RegistryError::InvalidDefinition {
                message: format!("'{}' declares no base resource type", param.url),
            });
        }
        if param.param_type == SearchParamType::Reference && param.targets().is_empty() {
            return Err(RegistryError::InvalidDefinition {
                message: format!("reference parameter '{}' declares no target type", param.url),
            });
        }

        self.register_internal(param);
        Ok(())
    }

    /// Internal registration without validation.
    fn register_internal(&mut self, param: SearchParameterDefinition) {
        let param = Arc::new(param);

        self.params_by_url
            .insert(param.url.clone(), Arc::clone(&param));

        for base in &param.base {
            self.params_by_type
                .entry(base.clone())
                .or_default()
                .insert(param.code.clone(), Arc::clone(&param));
        }
    }

    /// Gets a specific parameter by resource type and code, ignoring status
    /// and inheritance.
    pub fn get_param(
        &self,
        resource_type: &str,
        code: &str,
    ) -> Option<Arc<SearchParameterDefinition>> {
        self.params_by_type
            .get(resource_type)
            .and_then(|params| params.get(code))
            .cloned()
    }

    /// Returns all resource types that have registered parameters.
    pub fn resource_types(&self) -> Vec<String> {
        self.params_by_type.keys().cloned().collect()
    }
}

impl ParameterLookup for SearchParameterRegistry {
    fn lookup(&self, resource_type: &str, code: &str) -> Option<Arc<SearchParameterDefinition>> {
        std::iter::once(resource_type)
            .chain(ABSTRACT_BASES)
            .filter_map(|base| self.get_param(base, code))
            .find(|p| p.status.is_usable())
    }

    fn lookup_url(&self, url: &str) -> Option<Arc<SearchParameterDefinition>> {
        self.params_by_url.get(url).cloned()
    }

    fn parameters_for(&self, resource_type: &str) -> Vec<Arc<SearchParameterDefinition>> {
        let mut seen: HashMap<&str, Arc<SearchParameterDefinition>> = HashMap::new();
        for base in std::iter::once(resource_type).chain(ABSTRACT_BASES) {
            let Some(params) = self.params_by_type.get(base) else {
                continue;
            };
            for (code, param) in params {
                if param.status.is_usable() && !seen.contains_key(code.as_str()) {
                    seen.insert(code.as_str(), Arc::clone(param));
                }
            }
        }
        let mut params: Vec<_> = seen.into_values().collect();
        params.sort_by(|a, b| a.code.cmp(&b.code));
        params
    }
}

impl std::fmt::Debug for SearchParameterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchParameterRegistry")
            .field("params_count", &self.params_by_url.len())
            .field(
                "resource_types",
                &self.params_by_type.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> SearchParameterDefinition {
        SearchParameterDefinition::new(
            "http://hl7.org/fhir/SearchParameter/Observation-subject",
            "subject",
            SearchParamType::Reference,
            "Observation.subject",
        )
        .with_base(vec!["Observation"])
        .with_targets(vec!["Patient", "Group"])
    }

    #[test]
    fn test_search_parameter_status() {
        assert!(SearchParameterStatus::Active.is_usable());
        assert!(!SearchParameterStatus::Draft.is_usable());
        assert!(!SearchParameterStatus::Retired.is_usable());
        assert_eq!(
            SearchParameterStatus::from_fhir_status("retired"),
            Some(SearchParameterStatus::Retired)
        );
    }

    #[test]
    fn test_definition_helpers() {
        let def = subject();
        assert!(def.is_reference());
        assert_eq!(def.targets(), ["Patient".to_string(), "Group".to_string()]);
        assert!(def.applies_to("Observation"));
        assert!(!def.applies_to("Patient"));
        assert!(!def.is_composite());
    }

    #[test]
    fn test_lookup_falls_back_to_resource() {
        let mut registry = SearchParameterRegistry::new();
        registry.register(subject()).unwrap();
        registry
            .register(
                SearchParameterDefinition::new(
                    "http://hl7.org/fhir/SearchParameter/Resource-id",
                    "_id",
                    SearchParamType::Token,
                    "id",
                )
                .with_base(vec!["Resource"]),
            )
            .unwrap();

        assert!(registry.lookup("Observation", "subject").is_some());
        assert!(registry.lookup("Observation", "_id").is_some());
        assert!(registry.lookup("Patient", "_id").is_some());
        assert!(registry.lookup("Patient", "subject").is_none());
        assert_eq!(registry.parameters_for("Observation").len(), 2);
    }

    #[test]
    fn test_retired_parameters_are_hidden() {
        let mut registry = SearchParameterRegistry::new();
        registry
            .register(subject().with_status(SearchParameterStatus::Retired))
            .unwrap();

        assert!(registry.get_param("Observation", "subject").is_some());
        assert!(registry.lookup("Observation", "subject").is_none());
        assert!(registry.parameters_for("Observation").is_empty());
    }

    #[test]
    fn test_duplicate_url_error() {
        let mut registry = SearchParameterRegistry::new();
        registry.register(subject()).unwrap();

        let result = registry.register(subject());
        assert!(matches!(result, Err(RegistryError::DuplicateUrl { .. })));
    }

    #[test]
    fn test_reference_without_targets_rejected() {
        let mut registry = SearchParameterRegistry::new();
        let mut def = subject();
        def.target = None;
        assert!(matches!(
            registry.register(def),
            Err(RegistryError::InvalidDefinition { .. })
        ));
    }
}
