//! Document elements handed to converters.
//!
//! An [`Element`] pairs a JSON value with its [`ElementShape`], the FHIR
//! datatype name the converter registry dispatches on. The shape is known
//! from the path (`valueQuantity`, `ofType(Period)`) or inferred from the
//! JSON structure.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::SearchParamType;

/// Datatype name of an element, optionally parameterized by a value set.
///
/// Written `code` or `code<AdministrativeGender>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementShape {
    /// The datatype name (e.g., "CodeableConcept", "dateTime").
    pub base: String,
    /// Binding or profile the datatype is specialized by.
    pub parameter: Option<String>,
}

impl ElementShape {
    /// Creates an unparameterized shape.
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            parameter: None,
        }
    }

    /// Creates a parameterized shape such as `code<AdministrativeGender>`.
    pub fn parameterized(base: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            parameter: Some(parameter.into()),
        }
    }

    /// Returns the base shape, or `None` if this shape is not parameterized.
    pub fn base_shape(&self) -> Option<ElementShape> {
        self.parameter.as_ref().map(|_| ElementShape::new(&self.base))
    }

    /// Maps the suffix of a polymorphic element name (`valueDateTime` gives
    /// `DateTime`) to a shape, lowering primitive type names.
    pub fn from_choice_suffix(suffix: &str) -> Option<Self> {
        let mut chars = suffix.chars();
        let first = chars.next()?;
        if !first.is_ascii_uppercase() {
            return None;
        }
        let lowered = format!("{}{}", first.to_ascii_lowercase(), chars.as_str());
        if PRIMITIVES.contains(&lowered.as_str()) {
            Some(ElementShape::new(lowered))
        } else {
            Some(ElementShape::new(suffix))
        }
    }

    /// Infers the shape of a JSON value from its structure.
    ///
    /// String values are ambiguous in JSON; `kind` picks the primitive that
    /// the parameter kind expects.
    pub fn infer(value: &Value, kind: SearchParamType) -> Option<Self> {
        let base = match value {
            Value::String(_) => match kind {
                SearchParamType::Date => "dateTime",
                SearchParamType::Uri => "uri",
                SearchParamType::Token => "code",
                SearchParamType::Number => "decimal",
                _ => "string",
            },
            Value::Bool(_) => "boolean",
            Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
            Value::Number(_) => "decimal",
            Value::Object(obj) => infer_complex(obj, kind)?,
            Value::Array(_) | Value::Null => return None,
        };
        Some(ElementShape::new(base))
    }
}

const PRIMITIVES: [&str; 17] = [
    "base64Binary",
    "boolean",
    "canonical",
    "code",
    "date",
    "dateTime",
    "decimal",
    "id",
    "instant",
    "integer",
    "markdown",
    "oid",
    "positiveInt",
    "string",
    "time",
    "unsignedInt",
    "uri",
];

const CONTACT_SYSTEMS: [&str; 7] = ["phone", "fax", "email", "pager", "url", "sms", "other"];

fn infer_complex(obj: &serde_json::Map<String, Value>, kind: SearchParamType) -> Option<&'static str> {
    let has = |key: &str| obj.contains_key(key);

    if has("reference") || (kind == SearchParamType::Reference && has("identifier")) {
        return Some("Reference");
    }
    if has("coding") || (has("text") && obj.len() == 1 && kind == SearchParamType::Token) {
        return Some("CodeableConcept");
    }
    if has("family") || has("given") || has("prefix") || has("suffix") {
        return Some("HumanName");
    }
    if has("line") || has("city") || has("district") || has("state") || has("postalCode") || has("country") {
        return Some("Address");
    }
    if has("low") || has("high") {
        return Some("Range");
    }
    if has("start") || has("end") {
        return Some("Period");
    }
    if has("currency") {
        return Some("Money");
    }
    if let Some(value) = obj.get("value") {
        if value.is_number() || has("unit") || has("comparator") {
            return Some("Quantity");
        }
        let system = obj.get("system").and_then(|s| s.as_str());
        if system.is_some_and(|s| CONTACT_SYSTEMS.contains(&s)) || (has("use") && has("rank")) {
            return Some("ContactPoint");
        }
        return Some("Identifier");
    }
    if has("code") || has("system") {
        return Some("Coding");
    }
    None
}

impl fmt::Display for ElementShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parameter {
            Some(parameter) => write!(f, "{}<{}>", self.base, parameter),
            None => write!(f, "{}", self.base),
        }
    }
}

impl FromStr for ElementShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let shape = match s.split_once('<') {
            Some((base, rest)) => {
                let parameter = rest
                    .strip_suffix('>')
                    .ok_or_else(|| format!("unterminated shape parameter: {}", s))?;
                if parameter.is_empty() {
                    return Err(format!("empty shape parameter: {}", s));
                }
                ElementShape::parameterized(base, parameter)
            }
            None => ElementShape::new(s),
        };
        if shape.base.is_empty() {
            return Err(format!("empty shape: {}", s));
        }
        Ok(shape)
    }
}

/// One element of a document, ready for conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Datatype of the value.
    pub shape: ElementShape,
    /// The element as it appears in the document.
    pub value: Value,
}

impl Element {
    /// Creates an element of a known shape.
    pub fn new(shape: ElementShape, value: Value) -> Self {
        Self { shape, value }
    }

    /// Creates an element whose shape is inferred from `value`.
    pub fn infer(value: Value, kind: SearchParamType) -> Option<Self> {
        let shape = ElementShape::infer(&value, kind)?;
        Some(Self { shape, value })
    }

    /// Returns a string field of an object element.
    pub(crate) fn str_field(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }
}
