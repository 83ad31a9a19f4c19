//! Normalized search values and index entries.
//!
//! A [`SearchValue`] is what a converter extracts from one document element.
//! The storage layer persists `(parameter, value)` pairs as [`SearchIndexEntry`]
//! rows; the compartment indexer reads the reference values back out.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::date_range::DateRange;
use super::search_params::SearchParamType;

/// Where a reference points relative to this server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceKind {
    /// Points at a resource held by this server.
    Internal,
    /// Points at a resource held elsewhere.
    External,
    /// Relative reference; may resolve either way.
    InternalOrExternal,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::Internal => write!(f, "internal"),
            ReferenceKind::External => write!(f, "external"),
            ReferenceKind::InternalOrExternal => write!(f, "internal-or-external"),
        }
    }
}

/// A value extracted and normalized for the search index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SearchValue {
    /// Code with optional system and display text.
    Token {
        /// Code system URI (e.g., "http://loinc.org").
        system: Option<String>,
        /// Code value; empty for text-only tokens.
        code: String,
        /// Display text, used by the :text modifier.
        text: Option<String>,
    },

    /// Free text.
    String {
        /// The text as it appears in the element.
        value: String,
    },

    /// Number or number range. A single value has `low == high`.
    Number {
        /// Lower bound.
        low: Option<Decimal>,
        /// Upper bound.
        high: Option<Decimal>,
    },

    /// Quantity or quantity range. A single value has `low == high`.
    Quantity {
        /// Unit system URI.
        system: Option<String>,
        /// Unit code.
        code: Option<String>,
        /// Lower bound.
        low: Option<Decimal>,
        /// Upper bound.
        high: Option<Decimal>,
    },

    /// URI, optionally a canonical reference.
    Uri {
        /// The URI text.
        value: String,
        /// True for `canonical` elements.
        is_canonical: bool,
    },

    /// Reference to another resource.
    Reference {
        /// Internal, external or ambiguous.
        kind: ReferenceKind,
        /// Base URI for external absolute references.
        base_uri: Option<String>,
        /// Target resource type if known.
        target_type: Option<String>,
        /// Target resource id if known.
        resource_id: Option<String>,
    },

    /// Instant range covered by a date, dateTime, instant or Period.
    Date {
        /// First instant covered.
        start: DateTime<Utc>,
        /// Last instant covered.
        end: DateTime<Utc>,
    },
}

impl SearchValue {
    /// Creates a token with system and code.
    pub fn token(system: Option<String>, code: impl Into<String>) -> Self {
        SearchValue::Token {
            system,
            code: code.into(),
            text: None,
        }
    }

    /// Creates a token with code only.
    pub fn token_code(code: impl Into<String>) -> Self {
        Self::token(None, code)
    }

    /// Creates a token carrying display text.
    pub fn token_with_text(system: Option<String>, code: impl Into<String>, text: Option<String>) -> Self {
        SearchValue::Token {
            system,
            code: code.into(),
            text,
        }
    }

    /// Creates a text-only token (CodeableConcept.text).
    pub fn token_text_only(text: impl Into<String>) -> Self {
        SearchValue::Token {
            system: None,
            code: String::new(),
            text: Some(text.into()),
        }
    }

    /// Creates a string value.
    pub fn string(value: impl Into<String>) -> Self {
        SearchValue::String {
            value: value.into(),
        }
    }

    /// Creates a single number.
    pub fn number(value: Decimal) -> Self {
        SearchValue::Number {
            low: Some(value),
            high: Some(value),
        }
    }

    /// Creates a number range; `None` when both bounds are absent.
    pub fn number_range(low: Option<Decimal>, high: Option<Decimal>) -> Option<Self> {
        if low.is_none() && high.is_none() {
            return None;
        }
        Some(SearchValue::Number { low, high })
    }

    /// Creates a single quantity.
    pub fn quantity(system: Option<String>, code: Option<String>, value: Decimal) -> Self {
        SearchValue::Quantity {
            system,
            code,
            low: Some(value),
            high: Some(value),
        }
    }

    /// Creates a URI value.
    pub fn uri(value: impl Into<String>) -> Self {
        SearchValue::Uri {
            value: value.into(),
            is_canonical: false,
        }
    }

    /// Creates a canonical URI value.
    pub fn canonical(value: impl Into<String>) -> Self {
        SearchValue::Uri {
            value: value.into(),
            is_canonical: true,
        }
    }

    /// Creates an internal reference. Both type and id are required.
    pub fn internal_reference(target_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        SearchValue::Reference {
            kind: ReferenceKind::Internal,
            base_uri: None,
            target_type: Some(target_type.into()),
            resource_id: Some(resource_id.into()),
        }
    }

    /// Creates a reference whose kind is not known to be internal.
    ///
    /// Use [`SearchValue::internal_reference`] for internal references.
    pub fn reference(
        kind: ReferenceKind,
        base_uri: Option<String>,
        target_type: Option<String>,
        resource_id: Option<String>,
    ) -> Self {
        debug_assert!(kind != ReferenceKind::Internal || (target_type.is_some() && resource_id.is_some()));
        SearchValue::Reference {
            kind,
            base_uri,
            target_type,
            resource_id,
        }
    }

    /// Creates a date value from a parsed range.
    pub fn date(range: DateRange) -> Self {
        SearchValue::Date {
            start: range.start,
            end: range.end,
        }
    }

    /// Returns the parameter type this value is appropriate for.
    pub fn param_type(&self) -> SearchParamType {
        match self {
            SearchValue::Token { .. } => SearchParamType::Token,
            SearchValue::String { .. } => SearchParamType::String,
            SearchValue::Number { .. } => SearchParamType::Number,
            SearchValue::Quantity { .. } => SearchParamType::Quantity,
            SearchValue::Uri { .. } => SearchParamType::Uri,
            SearchValue::Reference { .. } => SearchParamType::Reference,
            SearchValue::Date { .. } => SearchParamType::Date,
        }
    }

    /// Returns the single value of a quantity whose bounds coincide.
    pub fn quantity_value(&self) -> Option<Decimal> {
        match self {
            SearchValue::Quantity {
                low: Some(low),
                high: Some(high),
                ..
            } if low == high => Some(*low),
            _ => None,
        }
    }

    /// Returns the target resource id of a reference value.
    pub fn reference_id(&self) -> Option<&str> {
        match self {
            SearchValue::Reference { resource_id, .. } => resource_id.as_deref(),
            _ => None,
        }
    }
}

/// One row of a document's search index.
///
/// Entries sharing a parameter name are expected (multi-valued elements)
/// and duplicates are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchIndexEntry {
    /// The parameter code (e.g., "subject").
    pub parameter: String,
    /// The extracted value.
    pub value: SearchValue,
}

impl SearchIndexEntry {
    /// Creates a new index entry.
    pub fn new(parameter: impl Into<String>, value: SearchValue) -> Self {
        Self {
            parameter: parameter.into(),
            value,
        }
    }
}
