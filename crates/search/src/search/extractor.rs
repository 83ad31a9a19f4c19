//! Search index extraction.
//!
//! [`SearchIndexer`] walks a JSON resource along each parameter's path
//! expression and hands the elements it finds to the
//! [`ConverterRegistry`]. Only the path subset used by search parameter
//! definitions is understood: member access, `ofType(T)`, `|` unions,
//! `where(resolve() is T)` and choice-type (`value[x]`) expansion. Any other
//! `where(...)` filter is ignored, so the result may over-index.

use std::sync::Arc;

use serde_json::Value;
use tracing::{trace, warn};

use crate::error::ExtractionError;
use crate::types::{SearchIndexEntry, SearchValue};

use super::converters::ConverterRegistry;
use super::element::{Element, ElementShape};
use super::registry::{ParameterLookup, SearchParameterDefinition};

/// Extracts search index entries from resources.
pub struct SearchIndexer {
    params: Arc<dyn ParameterLookup>,
    converters: Arc<ConverterRegistry>,
}

impl SearchIndexer {
    /// Creates an indexer over the given parameters and converters.
    pub fn new(params: Arc<dyn ParameterLookup>, converters: Arc<ConverterRegistry>) -> Self {
        Self { params, converters }
    }

    /// Extracts every index entry of `resource`.
    ///
    /// A parameter whose element cannot be converted is logged and skipped;
    /// the remaining parameters are still indexed.
    pub fn index(
        &self,
        resource: &Value,
        resource_type: &str,
    ) -> Result<Vec<SearchIndexEntry>, ExtractionError> {
        let obj = resource.as_object().ok_or_else(|| ExtractionError::InvalidResource {
            message: "Resource must be a JSON object".to_string(),
        })?;

        if let Some(rt) = obj.get("resourceType").and_then(|v| v.as_str()) {
            if rt != resource_type {
                return Err(ExtractionError::InvalidResource {
                    message: format!(
                        "Resource type mismatch: expected {}, got {}",
                        resource_type, rt
                    ),
                });
            }
        }

        let mut entries = Vec::new();
        for param in self.params.parameters_for(resource_type) {
            match self.index_param(resource, &param) {
                Ok(values) => entries.extend(
                    values
                        .into_iter()
                        .map(|value| SearchIndexEntry::new(&param.code, value)),
                ),
                Err(e) => {
                    warn!(
                        resource_type,
                        parameter = %param.code,
                        error = %e,
                        "failed to extract search values"
                    );
                }
            }
        }

        trace!(resource_type, entries = entries.len(), "indexed resource");
        Ok(entries)
    }

    /// Extracts the values of a single parameter.
    pub fn index_param(
        &self,
        resource: &Value,
        param: &SearchParameterDefinition,
    ) -> Result<Vec<SearchValue>, ExtractionError> {
        if !param.param_type.is_convertible() || param.expression.is_empty() {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        for branch in split_union(&param.expression) {
            let path = PathExpr::parse(branch);
            for element in path.evaluate(resource, param) {
                let values = self.converters.convert(&element, param.param_type)?;
                results.extend(values.into_iter().filter(|v| path.accepts(v)));
            }
        }
        Ok(results)
    }
}

impl std::fmt::Debug for SearchIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndexer")
            .field("converters", &self.converters)
            .finish()
    }
}

/// Splits a path on top-level `|`.
fn split_union(expression: &str) -> Vec<&str> {
    let mut branches = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in expression.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '|' if depth == 0 => {
                branches.push(expression[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    branches.push(expression[start..].trim());
    branches.retain(|b| !b.is_empty());
    branches
}

/// A step of a parsed path expression.
#[derive(Debug, Clone, PartialEq)]
enum PathSegment {
    /// Member access.
    Field(String),
    /// `ofType(T)`.
    TypeFilter(String),
}

/// One `|` branch of a parameter expression.
#[derive(Debug, Clone, PartialEq, Default)]
struct PathExpr {
    segments: Vec<PathSegment>,
    /// Target type from `where(resolve() is T)`.
    resolves_to: Option<String>,
}

impl PathExpr {
    fn parse(expression: &str) -> Self {
        let mut path = PathExpr::default();
        let steps = split_steps(expression);

        for (i, step) in steps.iter().enumerate() {
            match step.split_once('(') {
                Some((func, rest)) => {
                    let arg = rest.strip_suffix(')').unwrap_or(rest).trim();
                    match func {
                        "ofType" => path.segments.push(PathSegment::TypeFilter(arg.to_string())),
                        "where" => {
                            if let Some(target) = arg.strip_prefix("resolve() is ") {
                                path.resolves_to = Some(target.trim().to_string());
                            }
                        }
                        _ => {}
                    }
                }
                // The leading type name (`Patient.name`) is the context itself.
                None if i == 0 && step.starts_with(|c: char| c.is_ascii_uppercase()) => {}
                None => path.segments.push(PathSegment::Field(step.to_string())),
            }
        }
        path
    }

    fn accepts(&self, value: &SearchValue) -> bool {
        match (&self.resolves_to, value) {
            (Some(expected), SearchValue::Reference { target_type, .. }) => {
                target_type.as_deref() == Some(expected.as_str())
            }
            _ => true,
        }
    }

    fn evaluate(&self, resource: &Value, param: &SearchParameterDefinition) -> Vec<Element> {
        let mut found = Vec::new();
        navigate(resource, &self.segments, None, &mut found);
        found
            .into_iter()
            .filter_map(|(value, shape)| match shape {
                Some(shape) => Some(Element::new(shape, value.clone())),
                None => Element::infer(value.clone(), param.param_type),
            })
            .collect()
    }
}

/// Splits a path on `.` outside parentheses.
fn split_steps(expression: &str) -> Vec<&str> {
    let mut steps = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in expression.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '.' if depth == 0 => {
                steps.push(expression[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    steps.push(expression[start..].trim());
    steps.retain(|s| !s.is_empty());
    steps
}

fn navigate<'a>(
    value: &'a Value,
    segments: &[PathSegment],
    shape: Option<ElementShape>,
    out: &mut Vec<(&'a Value, Option<ElementShape>)>,
) {
    if let Value::Array(items) = value {
        for item in items {
            navigate(item, segments, shape.clone(), out);
        }
        return;
    }

    let Some((segment, remaining)) = segments.split_first() else {
        if !value.is_null() {
            out.push((value, shape));
        }
        return;
    };

    match segment {
        PathSegment::Field(name) => {
            let Value::Object(obj) = value else {
                return;
            };
            if let Some(child) = obj.get(name) {
                navigate(child, remaining, None, out);
                return;
            }
            // Choice elements: `value` is stored as `valueQuantity`, `valueString`, ...
            for (key, child) in obj {
                if let Some(choice) = key
                    .strip_prefix(name.as_str())
                    .and_then(ElementShape::from_choice_suffix)
                {
                    navigate(child, remaining, Some(choice), out);
                }
            }
        }
        PathSegment::TypeFilter(type_name) => {
            let wanted = ElementShape::from_choice_suffix(&upper_first(type_name))
                .unwrap_or_else(|| ElementShape::new(type_name));
            match &shape {
                Some(actual) if actual.base != wanted.base => {}
                _ => navigate(value, remaining, Some(wanted), out),
            }
        }
    }
}

fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}
