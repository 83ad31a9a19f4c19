//! Query key compilation.
//!
//! [`ExpressionParser`] compiles one `key=value` query pair into an
//! [`Expression`]. Keys follow the FHIR search grammar:
//!
//! - `name`, `name:modifier`
//! - `subject.name`, `subject:Patient.name` (chains, any length)
//! - `_has:Observation:patient:code` (reverse chains)
//!
//! A chain step without an explicit target type fans out over every
//! declared target of the reference parameter. Targets on which the rest of
//! the chain is not defined are dropped; the survivors are always combined
//! with [`Expression::Or`].

use std::sync::Arc;

use tracing::{debug, trace};

use crate::config::SearchConfig;
use crate::error::{QueryError, QueryResult};
use crate::search::{ParameterLookup, SearchParameterDefinition};
use crate::types::{Expression, SearchModifier};

use super::leaf::{LeafValueParser, split_unescaped};

const REVERSE_CHAIN_PREFIX: &str = "_has:";

/// Compiles query parameters into expression trees.
pub struct ExpressionParser {
    params: Arc<dyn ParameterLookup>,
    leaf: Arc<dyn LeafValueParser>,
    max_depth: usize,
}

impl ExpressionParser {
    /// Creates a parser allowing at most `max_depth` chain hops per key.
    pub fn new(
        params: Arc<dyn ParameterLookup>,
        leaf: Arc<dyn LeafValueParser>,
        max_depth: usize,
    ) -> Self {
        Self {
            params,
            leaf,
            max_depth,
        }
    }

    /// Creates a parser using the configured chain depth.
    pub fn with_config(
        params: Arc<dyn ParameterLookup>,
        leaf: Arc<dyn LeafValueParser>,
        config: &SearchConfig,
    ) -> Self {
        Self::new(params, leaf, config.max_chain_depth)
    }

    /// Maximum number of chain hops per key.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Compiles `key=value` for a search on `resource_type`.
    pub fn parse(&self, resource_type: &str, key: &str, value: &str) -> QueryResult<Expression> {
        debug!(resource_type, key, "compiling search parameter");
        self.parse_key(resource_type, key, value, 0)
    }

    fn parse_key(&self, resource_type: &str, key: &str, value: &str, hops: usize) -> QueryResult<Expression> {
        if let Some(rest) = key.strip_prefix(REVERSE_CHAIN_PREFIX) {
            return self.parse_reverse_chain(resource_type, rest, value, hops);
        }
        match key.split_once('.') {
            Some((head, rest)) => self.parse_chain(resource_type, head, rest, value, hops),
            None => self.parse_leaf(resource_type, key, value),
        }
    }

    fn parse_chain(
        &self,
        resource_type: &str,
        segment: &str,
        rest: &str,
        value: &str,
        hops: usize,
    ) -> QueryResult<Expression> {
        self.check_depth(hops)?;

        let (name, target) = split_segment(segment)?;
        let definition = self.definition(resource_type, name)?;
        if !definition.is_reference() {
            return Err(QueryError::invalid_operation(format!(
                "'{}' is a {} parameter and cannot be chained",
                name, definition.param_type
            )));
        }

        let candidates: Vec<&str> = match target {
            Some(target) if definition.targets().iter().any(|t| t == target) => vec![target],
            Some(target) => {
                return Err(QueryError::invalid_operation(format!(
                    "'{}' is not a target type of '{}'",
                    target, name
                )));
            }
            None => definition.targets().iter().map(String::as_str).collect(),
        };

        let mut branches = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match self.parse_key(candidate, rest, value, hops + 1) {
                Ok(inner) => branches.push(Expression::chained(name, candidate, inner)),
                Err(e) if e.is_unsupported_parameter() => {
                    trace!(resource_type, parameter = name, target = candidate, error = %e, "dropping chain target");
                }
                Err(e) => return Err(e),
            }
        }

        if branches.is_empty() {
            return Err(QueryError::NoMatchingTarget {
                resource_type: resource_type.to_string(),
                parameter: name.to_string(),
            });
        }
        Ok(Expression::Or(branches))
    }

    fn parse_reverse_chain(
        &self,
        resource_type: &str,
        rest: &str,
        value: &str,
        hops: usize,
    ) -> QueryResult<Expression> {
        self.check_depth(hops)?;

        let mut parts = rest.splitn(3, ':');
        let (Some(source_type), Some(reference), Some(inner_key)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(QueryError::invalid_operation(
                "expected _has:[type]:[reference-param]:[search-param]",
            ));
        };
        if source_type.is_empty() || reference.is_empty() || inner_key.is_empty() {
            return Err(QueryError::invalid_operation(
                "expected _has:[type]:[reference-param]:[search-param]",
            ));
        }

        let definition = self.definition(source_type, reference)?;
        if !definition.is_reference() {
            return Err(QueryError::invalid_operation(format!(
                "'{}.{}' is not a reference parameter",
                source_type, reference
            )));
        }
        if !definition.targets().iter().any(|t| t == resource_type) {
            return Err(QueryError::invalid_operation(format!(
                "'{}.{}' does not reference {}",
                source_type, reference, resource_type
            )));
        }

        let inner = self.parse_key(source_type, inner_key, value, hops + 1)?;
        Ok(Expression::reverse_chained(source_type, reference, inner))
    }

    fn parse_leaf(&self, resource_type: &str, segment: &str, value: &str) -> QueryResult<Expression> {
        let (name, modifier) = split_segment(segment)?;
        let definition = self.definition(resource_type, name)?;
        let modifier = modifier
            .map(|m| resolve_modifier(&definition, m))
            .transpose()?;

        let mut leaves = split_unescaped(value, ',')
            .iter()
            .map(|part| self.leaf.parse(&definition, modifier.as_ref(), part))
            .collect::<QueryResult<Vec<_>>>()?;

        Ok(match leaves.len() {
            1 => leaves.remove(0),
            _ => Expression::Or(leaves),
        })
    }

    fn definition(&self, resource_type: &str, name: &str) -> QueryResult<Arc<SearchParameterDefinition>> {
        self.params
            .lookup(resource_type, name)
            .ok_or_else(|| QueryError::UnsupportedParameter {
                resource_type: resource_type.to_string(),
                name: name.to_string(),
            })
    }

    fn check_depth(&self, hops: usize) -> QueryResult<()> {
        if hops >= self.max_depth {
            return Err(QueryError::ChainTooDeep {
                max_depth: self.max_depth,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for ExpressionParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpressionParser")
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

/// Splits `path[:modifier]`.
fn split_segment(segment: &str) -> QueryResult<(&str, Option<&str>)> {
    let mut parts = segment.split(':');
    let path = parts.next().unwrap_or_default();
    let modifier = parts.next();
    if parts.next().is_some() {
        return Err(QueryError::invalid_operation(format!(
            "'{}' has more than one modifier",
            segment
        )));
    }
    if path.is_empty() {
        return Err(QueryError::invalid_operation(format!(
            "'{}' has an empty parameter name",
            segment
        )));
    }
    if modifier.is_some_and(str::is_empty) {
        return Err(QueryError::invalid_operation(format!(
            "'{}' has an empty modifier",
            segment
        )));
    }
    Ok((path, modifier))
}

/// Resolves a modifier literal for `definition`.
///
/// Reference parameters also accept one of their target type names.
fn resolve_modifier(definition: &SearchParameterDefinition, literal: &str) -> QueryResult<SearchModifier> {
    let modifier = match SearchModifier::from_literal(literal) {
        Some(modifier) => modifier,
        None if definition.is_reference() && definition.targets().iter().any(|t| t == literal) => {
            SearchModifier::Type(literal.to_string())
        }
        None => {
            return Err(QueryError::invalid_operation(format!(
                "unknown modifier ':{}' on '{}'",
                literal, definition.code
            )));
        }
    };

    if !modifier.is_valid_for(definition.param_type) {
        return Err(QueryError::invalid_operation(format!(
            "modifier ':{}' cannot be used with {} parameter '{}'",
            modifier, definition.param_type, definition.code
        )));
    }
    Ok(modifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_segment() {
        assert_eq!(split_segment("name").unwrap(), ("name", None));
        assert_eq!(
            split_segment("subject:Patient").unwrap(),
            ("subject", Some("Patient"))
        );
        assert!(matches!(
            split_segment("a:b:c"),
            Err(QueryError::InvalidOperation { .. })
        ));
        assert!(split_segment(":exact").is_err());
        assert!(split_segment("name:").is_err());
    }

    #[test]
    fn test_resolve_modifier() {
        let subject = SearchParameterDefinition::new(
            "http://hl7.org/fhir/SearchParameter/Observation-subject",
            "subject",
            crate::types::SearchParamType::Reference,
            "Observation.subject",
        )
        .with_base(["Observation"])
        .with_targets(["Patient", "Group"]);

        assert_eq!(
            resolve_modifier(&subject, "Patient").unwrap(),
            SearchModifier::Type("Patient".into())
        );
        assert_eq!(
            resolve_modifier(&subject, "missing").unwrap(),
            SearchModifier::Missing
        );
        assert!(resolve_modifier(&subject, "Device").is_err());
        assert!(resolve_modifier(&subject, "exact").is_err());
    }
}
