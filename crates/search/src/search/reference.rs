//! Reference resolution.
//!
//! Classifies raw reference strings (`Patient/123`,
//! `http://other.org/fhir/Patient/123`) into [`SearchValue::Reference`]
//! values, deciding whether the target lives on this server.

use std::collections::BTreeSet;

use regex::Regex;

use crate::types::{ReferenceKind, SearchValue};

/// Pattern for FHIR resource ids.
const ID_PATTERN: &str = r"[A-Za-z0-9\-\.]{1,64}";

/// Turns a raw reference string into a reference search value.
pub trait ReferenceResolver: Send + Sync {
    /// Resolves `raw`. Never fails: unrecognized text becomes an external
    /// reference carrying the raw string as its id and no target type.
    ///
    /// A relative reference whose type is not a known resource type, such
    /// as `Widget/1`, is unrecognized text.
    fn resolve(&self, raw: &str) -> SearchValue;
}

/// Resolver that recognizes relative and absolute RESTful references.
#[derive(Debug, Clone)]
pub struct DefaultReferenceResolver {
    base_uri: String,
    relative: Regex,
    absolute: Regex,
}

impl DefaultReferenceResolver {
    /// Creates a resolver for a server at `base_uri`.
    ///
    /// When `known_types` is empty any capitalized type name is accepted.
    pub fn new<I, S>(base_uri: impl Into<String>, known_types: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let types: BTreeSet<String> = known_types
            .into_iter()
            .map(|t| regex::escape(t.as_ref()))
            .collect();
        let type_pattern = if types.is_empty() {
            "[A-Z][A-Za-z]+".to_string()
        } else {
            types.into_iter().collect::<Vec<_>>().join("|")
        };
        let tail = format!(
            r"(?P<type>{types})/(?P<id>{id})(?:/_history/{id})?",
            types = type_pattern,
            id = ID_PATTERN
        );

        Ok(Self {
            base_uri: normalize_base(&base_uri.into()),
            relative: Regex::new(&format!("^{}$", tail))?,
            absolute: Regex::new(&format!(r"^(?P<base>[A-Za-z][A-Za-z0-9+\-.]*://.+?)/{}$", tail))?,
        })
    }

    /// The base URI references are compared against.
    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }
}

impl ReferenceResolver for DefaultReferenceResolver {
    fn resolve(&self, raw: &str) -> SearchValue {
        let raw = raw.trim();

        if let Some(caps) = self.relative.captures(raw) {
            return SearchValue::reference(
                ReferenceKind::InternalOrExternal,
                None,
                Some(caps["type"].to_string()),
                Some(caps["id"].to_string()),
            );
        }

        if let Some(caps) = self.absolute.captures(raw) {
            let base = normalize_base(&caps["base"]);
            if base == self.base_uri {
                return SearchValue::internal_reference(&caps["type"], &caps["id"]);
            }
            return SearchValue::reference(
                ReferenceKind::External,
                Some(base),
                Some(caps["type"].to_string()),
                Some(caps["id"].to_string()),
            );
        }

        SearchValue::reference(ReferenceKind::External, None, None, Some(raw.to_string()))
    }
}

fn normalize_base(base: &str) -> String {
    base.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> DefaultReferenceResolver {
        DefaultReferenceResolver::new("http://localhost:8080/fhir/", ["Patient", "Group"]).unwrap()
    }

    fn parts(value: SearchValue) -> (ReferenceKind, Option<String>, Option<String>, Option<String>) {
        match value {
            SearchValue::Reference {
                kind,
                base_uri,
                target_type,
                resource_id,
            } => (kind, base_uri, target_type, resource_id),
            other => panic!("expected reference, got {:?}", other),
        }
    }

    #[test]
    fn test_relative_reference() {
        let (kind, base, ty, id) = parts(resolver().resolve("Patient/123"));
        assert_eq!(kind, ReferenceKind::InternalOrExternal);
        assert!(base.is_none());
        assert_eq!(ty.as_deref(), Some("Patient"));
        assert_eq!(id.as_deref(), Some("123"));
    }

    #[test]
    fn test_versioned_reference() {
        let (_, _, ty, id) = parts(resolver().resolve("Group/g1/_history/3"));
        assert_eq!(ty.as_deref(), Some("Group"));
        assert_eq!(id.as_deref(), Some("g1"));
    }

    #[test]
    fn test_absolute_reference_on_this_server() {
        let (kind, base, ty, id) = parts(resolver().resolve("http://localhost:8080/fhir/Patient/9"));
        assert_eq!(kind, ReferenceKind::Internal);
        assert!(base.is_none());
        assert_eq!(ty.as_deref(), Some("Patient"));
        assert_eq!(id.as_deref(), Some("9"));
    }

    #[test]
    fn test_absolute_reference_elsewhere() {
        let (kind, base, ty, id) = parts(resolver().resolve("https://other.org/r4/Patient/9"));
        assert_eq!(kind, ReferenceKind::External);
        assert_eq!(base.as_deref(), Some("https://other.org/r4"));
        assert_eq!(ty.as_deref(), Some("Patient"));
        assert_eq!(id.as_deref(), Some("9"));
    }

    #[test]
    fn test_unknown_type_is_external_raw() {
        let (kind, base, ty, id) = parts(resolver().resolve("Widget/1"));
        assert_eq!(kind, ReferenceKind::External);
        assert!(base.is_none());
        assert!(ty.is_none());
        assert_eq!(id.as_deref(), Some("Widget/1"));
    }

    #[test]
    fn test_any_type_when_unrestricted() {
        let open = DefaultReferenceResolver::new("http://localhost:8080", Vec::<String>::new()).unwrap();
        let (kind, _, ty, _) = parts(open.resolve("Widget/1"));
        assert_eq!(kind, ReferenceKind::InternalOrExternal);
        assert_eq!(ty.as_deref(), Some("Widget"));
    }
}
