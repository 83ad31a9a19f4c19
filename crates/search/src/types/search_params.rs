//! FHIR search parameter kinds, modifiers and comparison prefixes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// FHIR search parameter types.
///
/// See: https://build.fhir.org/search.html#ptypes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchParamType {
    /// A simple string, like a name or description.
    String,
    /// A search against a URI.
    Uri,
    /// A search for a number.
    Number,
    /// A search for a date, dateTime, or period.
    Date,
    /// A quantity, with a number and units.
    Quantity,
    /// A code from a code system or value set.
    Token,
    /// A reference to another resource.
    Reference,
    /// A composite search parameter that combines others.
    Composite,
    /// Special search parameters (_text, near, ...).
    Special,
}

impl SearchParamType {
    /// Every kind a converter can target.
    pub const CONVERTIBLE: [SearchParamType; 7] = [
        SearchParamType::String,
        SearchParamType::Uri,
        SearchParamType::Number,
        SearchParamType::Date,
        SearchParamType::Quantity,
        SearchParamType::Token,
        SearchParamType::Reference,
    ];

    /// Returns true if document elements can be converted to this kind.
    pub fn is_convertible(&self) -> bool {
        Self::CONVERTIBLE.contains(self)
    }

    /// Returns true for kinds whose values accept a comparison prefix.
    pub fn is_ordered(&self) -> bool {
        matches!(
            self,
            SearchParamType::Number | SearchParamType::Date | SearchParamType::Quantity
        )
    }
}

impl fmt::Display for SearchParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchParamType::String => write!(f, "string"),
            SearchParamType::Uri => write!(f, "uri"),
            SearchParamType::Number => write!(f, "number"),
            SearchParamType::Date => write!(f, "date"),
            SearchParamType::Quantity => write!(f, "quantity"),
            SearchParamType::Token => write!(f, "token"),
            SearchParamType::Reference => write!(f, "reference"),
            SearchParamType::Composite => write!(f, "composite"),
            SearchParamType::Special => write!(f, "special"),
        }
    }
}

impl FromStr for SearchParamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "string" => Ok(SearchParamType::String),
            "uri" => Ok(SearchParamType::Uri),
            "number" => Ok(SearchParamType::Number),
            "date" => Ok(SearchParamType::Date),
            "quantity" => Ok(SearchParamType::Quantity),
            "token" => Ok(SearchParamType::Token),
            "reference" => Ok(SearchParamType::Reference),
            "composite" => Ok(SearchParamType::Composite),
            "special" => Ok(SearchParamType::Special),
            _ => Err(format!("unknown search parameter type: {}", s)),
        }
    }
}

/// Search modifiers that can be applied to the last segment of a query key.
///
/// See: https://build.fhir.org/search.html#modifiers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchModifier {
    /// Exact string match (string parameters).
    Exact,
    /// Contains substring (string parameters).
    Contains,
    /// Text search (token parameters).
    Text,
    /// Negation - exclude matches.
    Not,
    /// Match if value is missing.
    Missing,
    /// Match codes above in hierarchy.
    Above,
    /// Match codes below in hierarchy.
    Below,
    /// Match codes in a value set.
    In,
    /// Match codes not in a value set.
    NotIn,
    /// Match on identifier (reference parameters).
    Identifier,
    /// Restrict a reference parameter to one target type.
    Type(String),
    /// Match on identifier type (token parameters).
    OfType,
    /// Text search against the code display only.
    CodeText,
    /// Iterate through results (_include modifier).
    Iterate,
}

impl fmt::Display for SearchModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchModifier::Exact => write!(f, "exact"),
            SearchModifier::Contains => write!(f, "contains"),
            SearchModifier::Text => write!(f, "text"),
            SearchModifier::Not => write!(f, "not"),
            SearchModifier::Missing => write!(f, "missing"),
            SearchModifier::Above => write!(f, "above"),
            SearchModifier::Below => write!(f, "below"),
            SearchModifier::In => write!(f, "in"),
            SearchModifier::NotIn => write!(f, "not-in"),
            SearchModifier::Identifier => write!(f, "identifier"),
            SearchModifier::Type(t) => write!(f, "{}", t),
            SearchModifier::OfType => write!(f, "of-type"),
            SearchModifier::CodeText => write!(f, "code-text"),
            SearchModifier::Iterate => write!(f, "iterate"),
        }
    }
}

impl SearchModifier {
    /// Resolves a modifier against the fixed table of literals.
    ///
    /// Target-type modifiers (`subject:Patient`) are not part of the table;
    /// the query parser resolves those against the parameter's targets.
    pub fn from_literal(s: &str) -> Option<Self> {
        match s {
            "exact" => Some(SearchModifier::Exact),
            "contains" => Some(SearchModifier::Contains),
            "text" => Some(SearchModifier::Text),
            "not" => Some(SearchModifier::Not),
            "missing" => Some(SearchModifier::Missing),
            "above" => Some(SearchModifier::Above),
            "below" => Some(SearchModifier::Below),
            "in" => Some(SearchModifier::In),
            "not-in" => Some(SearchModifier::NotIn),
            "identifier" => Some(SearchModifier::Identifier),
            "of-type" | "ofType" => Some(SearchModifier::OfType),
            "code-text" => Some(SearchModifier::CodeText),
            "iterate" => Some(SearchModifier::Iterate),
            _ => None,
        }
    }

    /// Returns true if this modifier is valid for the given parameter type.
    pub fn is_valid_for(&self, param_type: SearchParamType) -> bool {
        match self {
            SearchModifier::Exact | SearchModifier::Contains => {
                param_type == SearchParamType::String
            }
            SearchModifier::Text => {
                param_type == SearchParamType::Token || param_type == SearchParamType::Reference
            }
            SearchModifier::Not => param_type == SearchParamType::Token,
            SearchModifier::Missing => true,
            SearchModifier::Above | SearchModifier::Below => {
                param_type == SearchParamType::Token || param_type == SearchParamType::Uri
            }
            SearchModifier::In | SearchModifier::NotIn => param_type == SearchParamType::Token,
            SearchModifier::Identifier | SearchModifier::Type(_) => {
                param_type == SearchParamType::Reference
            }
            SearchModifier::OfType | SearchModifier::CodeText => {
                param_type == SearchParamType::Token
            }
            SearchModifier::Iterate => false,
        }
    }
}

/// Comparison prefixes for search values.
///
/// See: https://build.fhir.org/search.html#prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchPrefix {
    /// Equal (default).
    #[default]
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Less than.
    Lt,
    /// Greater than or equal.
    Ge,
    /// Less than or equal.
    Le,
    /// Starts after.
    Sa,
    /// Ends before.
    Eb,
    /// Approximately equal.
    Ap,
}

impl fmt::Display for SearchPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchPrefix::Eq => write!(f, "eq"),
            SearchPrefix::Ne => write!(f, "ne"),
            SearchPrefix::Gt => write!(f, "gt"),
            SearchPrefix::Lt => write!(f, "lt"),
            SearchPrefix::Ge => write!(f, "ge"),
            SearchPrefix::Le => write!(f, "le"),
            SearchPrefix::Sa => write!(f, "sa"),
            SearchPrefix::Eb => write!(f, "eb"),
            SearchPrefix::Ap => write!(f, "ap"),
        }
    }
}

impl FromStr for SearchPrefix {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" => Ok(SearchPrefix::Eq),
            "ne" => Ok(SearchPrefix::Ne),
            "gt" => Ok(SearchPrefix::Gt),
            "lt" => Ok(SearchPrefix::Lt),
            "ge" => Ok(SearchPrefix::Ge),
            "le" => Ok(SearchPrefix::Le),
            "sa" => Ok(SearchPrefix::Sa),
            "eb" => Ok(SearchPrefix::Eb),
            "ap" => Ok(SearchPrefix::Ap),
            _ => Err(format!("unknown search prefix: {}", s)),
        }
    }
}

impl SearchPrefix {
    /// Extracts a prefix from the beginning of a value string.
    ///
    /// Returns the prefix and the remaining value.
    pub fn extract(value: &str) -> (Self, &str) {
        if let Some(prefix) = value.get(..2) {
            if let Ok(p) = prefix.parse() {
                return (p, &value[2..]);
            }
        }
        (SearchPrefix::Eq, value)
    }

    /// Returns true if this prefix is valid for the given parameter type.
    pub fn is_valid_for(&self, param_type: SearchParamType) -> bool {
        match self {
            SearchPrefix::Eq => true,
            SearchPrefix::Ne
            | SearchPrefix::Gt
            | SearchPrefix::Lt
            | SearchPrefix::Ge
            | SearchPrefix::Le
            | SearchPrefix::Ap => param_type.is_ordered(),
            SearchPrefix::Sa | SearchPrefix::Eb => param_type == SearchParamType::Date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_param_type_parse() {
        assert_eq!(
            "string".parse::<SearchParamType>().unwrap(),
            SearchParamType::String
        );
        assert_eq!(
            "TOKEN".parse::<SearchParamType>().unwrap(),
            SearchParamType::Token
        );
        assert!("bogus".parse::<SearchParamType>().is_err());
        assert_eq!(SearchParamType::Reference.to_string(), "reference");
    }

    #[test]
    fn test_modifier_table() {
        assert_eq!(SearchModifier::from_literal("exact"), Some(SearchModifier::Exact));
        assert_eq!(SearchModifier::from_literal("not-in"), Some(SearchModifier::NotIn));
        assert_eq!(SearchModifier::from_literal("ofType"), Some(SearchModifier::OfType));
        // Type names are resolved by the parser, not the table
        assert_eq!(SearchModifier::from_literal("Patient"), None);
        assert_eq!(SearchModifier::from_literal("unknown"), None);
    }

    #[test]
    fn test_modifier_validity() {
        assert!(SearchModifier::Exact.is_valid_for(SearchParamType::String));
        assert!(!SearchModifier::Exact.is_valid_for(SearchParamType::Token));
        assert!(SearchModifier::Missing.is_valid_for(SearchParamType::Date));
        assert!(SearchModifier::Type("Patient".into()).is_valid_for(SearchParamType::Reference));
        assert!(!SearchModifier::Iterate.is_valid_for(SearchParamType::Reference));
    }

    #[test]
    fn test_search_prefix_extract() {
        assert_eq!(
            SearchPrefix::extract("gt2020-01-01"),
            (SearchPrefix::Gt, "2020-01-01")
        );
        assert_eq!(
            SearchPrefix::extract("2020-01-01"),
            (SearchPrefix::Eq, "2020-01-01")
        );
        assert_eq!(SearchPrefix::extract("le100"), (SearchPrefix::Le, "100"));
        assert_eq!(SearchPrefix::extract("5"), (SearchPrefix::Eq, "5"));
    }

    #[test]
    fn test_search_prefix_validity() {
        assert!(SearchPrefix::Gt.is_valid_for(SearchParamType::Number));
        assert!(!SearchPrefix::Gt.is_valid_for(SearchParamType::String));
        assert!(SearchPrefix::Sa.is_valid_for(SearchParamType::Date));
        assert!(!SearchPrefix::Sa.is_valid_for(SearchParamType::Quantity));
    }
}
