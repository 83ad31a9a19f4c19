//! Search Value Converters.
//!
//! Converts document elements into index-friendly [`SearchValue`]s. The
//! [`ConverterRegistry`] maps `(element shape, search value kind)` to one
//! converter; a parameterized shape such as `code<AdministrativeGender>`
//! falls back to its base shape when it has no converter of its own.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::trace;

use crate::error::ExtractionError;
use crate::types::{DateRange, SearchParamType, SearchValue};

use super::element::{Element, ElementShape};
use super::reference::ReferenceResolver;

/// Converts one element into zero or more search values.
pub trait SearchValueConverter: Send + Sync {
    /// Converts `element`. An element with nothing to index yields an empty vec.
    fn convert(&self, element: &Element) -> Result<Vec<SearchValue>, ExtractionError>;
}

impl<F> SearchValueConverter for F
where
    F: Fn(&Element) -> Result<Vec<SearchValue>, ExtractionError> + Send + Sync,
{
    fn convert(&self, element: &Element) -> Result<Vec<SearchValue>, ExtractionError> {
        self(element)
    }
}

/// Registry of converters keyed by element shape and value kind.
#[derive(Default)]
pub struct ConverterRegistry {
    converters: HashMap<(ElementShape, SearchParamType), Arc<dyn SearchValueConverter>>,
}

impl ConverterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every built-in converter.
    pub fn with_builtins(resolver: Arc<dyn ReferenceResolver>) -> Self {
        use SearchParamType as Kind;

        let mut registry = Self::new();

        for shape in ["code", "id", "string", "uri"] {
            registry.register(ElementShape::new(shape), Kind::Token, Arc::new(CodeTokenConverter));
        }
        registry.register(ElementShape::new("boolean"), Kind::Token, Arc::new(BooleanTokenConverter));
        registry.register(ElementShape::new("Coding"), Kind::Token, Arc::new(CodingConverter));
        registry.register(
            ElementShape::new("CodeableConcept"),
            Kind::Token,
            Arc::new(CodeableConceptConverter),
        );
        registry.register(ElementShape::new("Identifier"), Kind::Token, Arc::new(IdentifierConverter));
        registry.register(
            ElementShape::new("ContactPoint"),
            Kind::Token,
            Arc::new(ContactPointConverter),
        );

        for shape in ["string", "markdown", "code"] {
            registry.register(ElementShape::new(shape), Kind::String, Arc::new(StringConverter));
        }
        registry.register(ElementShape::new("HumanName"), Kind::String, Arc::new(HumanNameConverter));
        registry.register(ElementShape::new("Address"), Kind::String, Arc::new(AddressConverter));

        for shape in ["integer", "decimal", "positiveInt", "unsignedInt"] {
            registry.register(ElementShape::new(shape), Kind::Number, Arc::new(NumberConverter));
        }
        registry.register(ElementShape::new("Range"), Kind::Number, Arc::new(RangeNumberConverter));

        for shape in [
            "Quantity",
            "SimpleQuantity",
            "Age",
            "Duration",
            "Distance",
            "Count",
            "Money",
        ] {
            registry.register(ElementShape::new(shape), Kind::Quantity, Arc::new(QuantityConverter));
        }
        registry.register(ElementShape::new("Range"), Kind::Quantity, Arc::new(RangeQuantityConverter));

        for shape in ["uri", "url", "oid", "uuid"] {
            registry.register(ElementShape::new(shape), Kind::Uri, Arc::new(UriConverter { canonical: false }));
        }
        registry.register(ElementShape::new("canonical"), Kind::Uri, Arc::new(UriConverter { canonical: true }));

        let reference = Arc::new(ReferenceConverter::new(resolver));
        for shape in ["Reference", "string", "uri"] {
            registry.register(ElementShape::new(shape), Kind::Reference, reference.clone());
        }

        for shape in ["date", "dateTime", "instant"] {
            registry.register(ElementShape::new(shape), Kind::Date, Arc::new(DateConverter));
        }
        registry.register(ElementShape::new("Period"), Kind::Date, Arc::new(PeriodConverter));

        registry
    }

    /// Registers a converter, replacing any existing one for the same key.
    pub fn register(
        &mut self,
        shape: ElementShape,
        kind: SearchParamType,
        converter: Arc<dyn SearchValueConverter>,
    ) {
        self.converters.insert((shape, kind), converter);
    }

    /// Finds the converter for `shape`, falling back to the base shape.
    pub fn try_resolve(
        &self,
        shape: &ElementShape,
        kind: SearchParamType,
    ) -> Option<&dyn SearchValueConverter> {
        if let Some(converter) = self.converters.get(&(shape.clone(), kind)) {
            return Some(converter.as_ref());
        }
        let base = shape.base_shape()?;
        self.converters.get(&(base, kind)).map(|c| c.as_ref())
    }

    /// Converts an element to values of `kind`.
    ///
    /// A shape without a converter for `kind` yields no values.
    pub fn convert(
        &self,
        element: &Element,
        kind: SearchParamType,
    ) -> Result<Vec<SearchValue>, ExtractionError> {
        if let Value::Array(items) = &element.value {
            let mut results = Vec::new();
            for item in items {
                let item = Element::new(element.shape.clone(), item.clone());
                results.extend(self.convert(&item, kind)?);
            }
            return Ok(results);
        }

        match self.try_resolve(&element.shape, kind) {
            Some(converter) => converter.convert(element),
            None => {
                trace!(shape = %element.shape, kind = %kind, "no converter registered");
                Ok(Vec::new())
            }
        }
    }

    /// Returns the number of registered converters.
    pub fn len(&self) -> usize {
        self.converters.len()
    }

    /// Returns true if no converter is registered.
    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("converters", &self.converters.len())
            .finish()
    }
}

fn conversion_failed(element: &Element, expected: &str, actual: impl ToString) -> ExtractionError {
    ExtractionError::ConversionFailed {
        shape: element.shape.to_string(),
        expected_type: expected.to_string(),
        actual_value: actual.to_string(),
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}

fn owned(s: Option<&str>) -> Option<String> {
    non_empty(s).map(String::from)
}

/// Reads a decimal from a JSON number or numeric string.
fn decimal_of(element: &Element, value: Option<&Value>) -> Result<Option<Decimal>, ExtractionError> {
    let text = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => return Err(conversion_failed(element, "decimal", other)),
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map(Some)
        .map_err(|_| conversion_failed(element, "decimal", &text))
}

fn date_of(element: &Element, text: &str) -> Result<DateRange, ExtractionError> {
    DateRange::parse(text).ok_or_else(|| conversion_failed(element, "date", text))
}

/// `code`, `id`, `string` and `uri` as a bare token.
pub struct CodeTokenConverter;

impl SearchValueConverter for CodeTokenConverter {
    fn convert(&self, element: &Element) -> Result<Vec<SearchValue>, ExtractionError> {
        Ok(non_empty(element.value.as_str())
            .map(|code| vec![SearchValue::token_code(code)])
            .unwrap_or_default())
    }
}

/// `boolean` as a `true`/`false` token.
pub struct BooleanTokenConverter;

impl SearchValueConverter for BooleanTokenConverter {
    fn convert(&self, element: &Element) -> Result<Vec<SearchValue>, ExtractionError> {
        match &element.value {
            Value::Bool(b) => Ok(vec![SearchValue::token_code(b.to_string())]),
            Value::String(s) if s == "true" || s == "false" => {
                Ok(vec![SearchValue::token_code(s.clone())])
            }
            other => Err(conversion_failed(element, "boolean", other)),
        }
    }
}

/// `Coding` as one token with its display text.
pub struct CodingConverter;

impl SearchValueConverter for CodingConverter {
    fn convert(&self, element: &Element) -> Result<Vec<SearchValue>, ExtractionError> {
        Ok(coding_token(&element.value).into_iter().collect())
    }
}

fn coding_token(coding: &Value) -> Option<SearchValue> {
    let code = non_empty(coding.get("code").and_then(|v| v.as_str()))?;
    Some(SearchValue::token_with_text(
        owned(coding.get("system").and_then(|v| v.as_str())),
        code,
        owned(coding.get("display").and_then(|v| v.as_str())),
    ))
}

/// `CodeableConcept` as one token per coding plus its text.
pub struct CodeableConceptConverter;

impl SearchValueConverter for CodeableConceptConverter {
    fn convert(&self, element: &Element) -> Result<Vec<SearchValue>, ExtractionError> {
        let mut results: Vec<SearchValue> = element
            .value
            .get("coding")
            .and_then(|c| c.as_array())
            .map(|codings| codings.iter().filter_map(coding_token).collect())
            .unwrap_or_default();

        if let Some(text) = non_empty(element.str_field("text")) {
            results.push(SearchValue::token_text_only(text));
        }
        Ok(results)
    }
}

/// `Identifier` as one token; the type's text is kept for `:text`.
pub struct IdentifierConverter;

impl SearchValueConverter for IdentifierConverter {
    fn convert(&self, element: &Element) -> Result<Vec<SearchValue>, ExtractionError> {
        let Some(value) = non_empty(element.str_field("value")) else {
            return Ok(Vec::new());
        };
        let type_text = element
            .value
            .get("type")
            .and_then(|t| t.get("text"))
            .and_then(|t| t.as_str());
        Ok(vec![SearchValue::token_with_text(
            owned(element.str_field("system")),
            value,
            owned(type_text),
        )])
    }
}

/// `ContactPoint` as a token whose system is the contact system.
pub struct ContactPointConverter;

impl SearchValueConverter for ContactPointConverter {
    fn convert(&self, element: &Element) -> Result<Vec<SearchValue>, ExtractionError> {
        Ok(non_empty(element.str_field("value"))
            .map(|value| vec![SearchValue::token(owned(element.str_field("system")), value)])
            .unwrap_or_default())
    }
}

/// `string`, `markdown` and `code` as free text.
pub struct StringConverter;

impl SearchValueConverter for StringConverter {
    fn convert(&self, element: &Element) -> Result<Vec<SearchValue>, ExtractionError> {
        Ok(non_empty(element.value.as_str())
            .map(|s| vec![SearchValue::string(s)])
            .unwrap_or_default())
    }
}

fn push_strings(results: &mut Vec<SearchValue>, value: Option<&Value>) {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => results.push(SearchValue::string(s)),
        Some(Value::Array(items)) => {
            for item in items {
                push_strings(results, Some(item));
            }
        }
        _ => {}
    }
}

/// `HumanName` parts as separate strings.
pub struct HumanNameConverter;

impl SearchValueConverter for HumanNameConverter {
    fn convert(&self, element: &Element) -> Result<Vec<SearchValue>, ExtractionError> {
        let mut results = Vec::new();
        for key in ["family", "given", "prefix", "suffix", "text"] {
            push_strings(&mut results, element.value.get(key));
        }
        Ok(results)
    }
}

/// `Address` parts as separate strings.
pub struct AddressConverter;

impl SearchValueConverter for AddressConverter {
    fn convert(&self, element: &Element) -> Result<Vec<SearchValue>, ExtractionError> {
        let mut results = Vec::new();
        for key in ["line", "city", "district", "state", "postalCode", "country", "text"] {
            push_strings(&mut results, element.value.get(key));
        }
        Ok(results)
    }
}

/// Numeric primitives as a single number.
pub struct NumberConverter;

impl SearchValueConverter for NumberConverter {
    fn convert(&self, element: &Element) -> Result<Vec<SearchValue>, ExtractionError> {
        Ok(decimal_of(element, Some(&element.value))?
            .map(|n| vec![SearchValue::number(n)])
            .unwrap_or_default())
    }
}

fn range_bounds(element: &Element) -> Result<(Option<Decimal>, Option<Decimal>), ExtractionError> {
    let low = decimal_of(element, element.value.get("low").and_then(|l| l.get("value")))?;
    let high = decimal_of(element, element.value.get("high").and_then(|h| h.get("value")))?;
    Ok((low, high))
}

/// `Range` as a number range.
pub struct RangeNumberConverter;

impl SearchValueConverter for RangeNumberConverter {
    fn convert(&self, element: &Element) -> Result<Vec<SearchValue>, ExtractionError> {
        let (low, high) = range_bounds(element)?;
        Ok(SearchValue::number_range(low, high).into_iter().collect())
    }
}

/// `Quantity` and its profiles as a single quantity.
///
/// `Money` has no unit system; its currency becomes the code.
pub struct QuantityConverter;

impl SearchValueConverter for QuantityConverter {
    fn convert(&self, element: &Element) -> Result<Vec<SearchValue>, ExtractionError> {
        let Some(value) = decimal_of(element, element.value.get("value"))? else {
            return Ok(Vec::new());
        };
        let code = owned(element.str_field("code"))
            .or_else(|| owned(element.str_field("currency")))
            .or_else(|| owned(element.str_field("unit")));
        Ok(vec![SearchValue::quantity(
            owned(element.str_field("system")),
            code,
            value,
        )])
    }
}

/// `Range` as one quantity spanning both bounds.
pub struct RangeQuantityConverter;

impl SearchValueConverter for RangeQuantityConverter {
    fn convert(&self, element: &Element) -> Result<Vec<SearchValue>, ExtractionError> {
        let (low, high) = range_bounds(element)?;
        if low.is_none() && high.is_none() {
            return Ok(Vec::new());
        }
        let unit_of = |key: &str, field: &str| {
            owned(element.value.get(key).and_then(|b| b.get(field)).and_then(|v| v.as_str()))
        };
        Ok(vec![SearchValue::Quantity {
            system: unit_of("low", "system").or_else(|| unit_of("high", "system")),
            code: unit_of("low", "code").or_else(|| unit_of("high", "code")),
            low,
            high,
        }])
    }
}

/// URI primitives; `canonical` sets the canonical flag.
pub struct UriConverter {
    canonical: bool,
}

impl SearchValueConverter for UriConverter {
    fn convert(&self, element: &Element) -> Result<Vec<SearchValue>, ExtractionError> {
        let Some(uri) = non_empty(element.value.as_str()) else {
            return Ok(Vec::new());
        };
        Ok(vec![if self.canonical {
            SearchValue::canonical(uri)
        } else {
            SearchValue::uri(uri)
        }])
    }
}

/// `Reference` elements and bare reference strings.
///
/// Contained (`#id`) and `urn:` references do not point at a stored
/// resource and produce nothing.
pub struct ReferenceConverter {
    resolver: Arc<dyn ReferenceResolver>,
}

impl ReferenceConverter {
    /// Creates a converter using `resolver`.
    pub fn new(resolver: Arc<dyn ReferenceResolver>) -> Self {
        Self { resolver }
    }
}

impl SearchValueConverter for ReferenceConverter {
    fn convert(&self, element: &Element) -> Result<Vec<SearchValue>, ExtractionError> {
        let raw = match &element.value {
            Value::String(s) => Some(s.as_str()),
            Value::Object(_) => element.str_field("reference"),
            _ => None,
        };
        let Some(raw) = non_empty(raw) else {
            return Ok(Vec::new());
        };
        if raw.starts_with('#') || raw.starts_with("urn:") {
            return Ok(Vec::new());
        }
        Ok(vec![self.resolver.resolve(raw)])
    }
}

/// `date`, `dateTime` and `instant` as the range they cover.
pub struct DateConverter;

impl SearchValueConverter for DateConverter {
    fn convert(&self, element: &Element) -> Result<Vec<SearchValue>, ExtractionError> {
        match &element.value {
            Value::String(s) if s.trim().is_empty() => Ok(Vec::new()),
            Value::String(s) => Ok(vec![SearchValue::date(date_of(element, s)?)]),
            other => Err(conversion_failed(element, "date", other)),
        }
    }
}

/// `Period` as one range; an open end extends to the end of time.
pub struct PeriodConverter;

impl SearchValueConverter for PeriodConverter {
    fn convert(&self, element: &Element) -> Result<Vec<SearchValue>, ExtractionError> {
        let start = non_empty(element.str_field("start"))
            .map(|s| date_of(element, s))
            .transpose()?;
        let end = non_empty(element.str_field("end"))
            .map(|e| date_of(element, e))
            .transpose()?;
        if start.is_none() && end.is_none() {
            return Ok(Vec::new());
        }
        Ok(vec![SearchValue::Date {
            start: start.map(|r| r.start).unwrap_or(DateTime::<Utc>::MIN_UTC),
            end: end.map(|r| r.end).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }])
    }
}
