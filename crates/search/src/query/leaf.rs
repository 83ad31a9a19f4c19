//! Leaf value parsing.
//!
//! Turns the raw value of one comma-separated part of a query into a typed
//! [`Literal`] for the parameter's kind, producing an [`Expression::Leaf`].

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::error::{QueryError, QueryResult};
use crate::search::{ParameterLookup, ReferenceResolver, SearchParameterDefinition};
use crate::types::{
    DateRange, Expression, Literal, ReferenceKind, SearchModifier, SearchParamType, SearchPrefix,
    SearchValue,
};

/// Parses one raw value against a parameter definition.
pub trait LeafValueParser: Send + Sync {
    /// Parses `raw` into a leaf expression for `definition`.
    fn parse(
        &self,
        definition: &SearchParameterDefinition,
        modifier: Option<&SearchModifier>,
        raw: &str,
    ) -> QueryResult<Expression>;
}

/// Leaf parser for the standard value syntaxes of every parameter kind.
pub struct DefaultLeafParser {
    params: Arc<dyn ParameterLookup>,
    resolver: Arc<dyn ReferenceResolver>,
}

impl DefaultLeafParser {
    /// Creates a parser. `params` resolves composite components by URL.
    pub fn new(params: Arc<dyn ParameterLookup>, resolver: Arc<dyn ReferenceResolver>) -> Self {
        Self { params, resolver }
    }

    fn parse_literal(
        &self,
        definition: &SearchParameterDefinition,
        modifier: Option<&SearchModifier>,
        raw: &str,
    ) -> QueryResult<(SearchPrefix, Literal)> {
        let invalid = |message: String| QueryError::invalid_value(&definition.code, message);
        if raw.is_empty() {
            return Err(invalid("value is empty".to_string()));
        }

        let kind = definition.param_type;
        let (prefix, rest) = if kind.is_ordered() {
            SearchPrefix::extract(raw)
        } else {
            (SearchPrefix::Eq, raw)
        };
        if !prefix.is_valid_for(kind) {
            return Err(invalid(format!("prefix '{}' cannot be used with {} parameters", prefix, kind)));
        }

        let literal = match kind {
            SearchParamType::Token => match modifier {
                Some(SearchModifier::Text) | Some(SearchModifier::CodeText) => Literal::String {
                    value: unescape(rest),
                },
                Some(SearchModifier::OfType) => of_type_literal(rest).ok_or_else(|| {
                    invalid(format!("'{}' is not of the form type-system|type-code|value", rest))
                })?,
                _ => token_literal(rest),
            },
            SearchParamType::String | SearchParamType::Special => Literal::String {
                value: unescape(rest),
            },
            SearchParamType::Uri => Literal::Uri {
                value: unescape(rest),
            },
            SearchParamType::Number => Literal::Number {
                value: parse_decimal(rest).ok_or_else(|| invalid(format!("'{}' is not a number", rest)))?,
            },
            SearchParamType::Date => Literal::Date {
                range: DateRange::parse(rest).ok_or_else(|| invalid(format!("'{}' is not a date", rest)))?,
            },
            SearchParamType::Quantity => {
                let parts = split_unescaped(rest, '|');
                let value = parts
                    .first()
                    .and_then(|n| parse_decimal(n))
                    .ok_or_else(|| invalid(format!("'{}' is not a quantity", rest)))?;
                if parts.len() > 3 {
                    return Err(invalid(format!("'{}' has too many quantity parts", rest)));
                }
                let part = |i: usize| parts.get(i).filter(|p| !p.is_empty()).map(|p| unescape(p));
                Literal::Quantity {
                    value,
                    system: part(1),
                    code: part(2),
                }
            }
            SearchParamType::Reference => self.reference_literal(definition, modifier, rest)?,
            SearchParamType::Composite => return self.composite_literal(definition, rest),
        };
        Ok((prefix, literal))
    }

    fn reference_literal(
        &self,
        definition: &SearchParameterDefinition,
        modifier: Option<&SearchModifier>,
        raw: &str,
    ) -> QueryResult<Literal> {
        let type_modifier = match modifier {
            Some(SearchModifier::Identifier) => return Ok(token_literal(raw)),
            Some(SearchModifier::Type(target)) => Some(target.as_str()),
            _ => None,
        };
        let targets = definition.targets();
        let implied_type = type_modifier.or(match targets {
            [only] => Some(only.as_str()),
            _ => None,
        });

        let resolved = if raw.contains('/') {
            self.resolver.resolve(raw)
        } else if let Some(target) = implied_type {
            self.resolver.resolve(&format!("{}/{}", target, raw))
        } else {
            SearchValue::reference(ReferenceKind::InternalOrExternal, None, None, Some(raw.to_string()))
        };

        let SearchValue::Reference {
            kind,
            base_uri,
            target_type,
            resource_id,
        } = resolved
        else {
            return Err(QueryError::invalid_value(&definition.code, format!("'{}' is not a reference", raw)));
        };

        if let (Some(expected), Some(actual)) = (type_modifier, target_type.as_deref()) {
            if expected != actual {
                return Err(QueryError::invalid_value(
                    &definition.code,
                    format!("reference '{}' does not point at a {}", raw, expected),
                ));
            }
        }

        Ok(Literal::Reference {
            kind,
            base_uri,
            target_type,
            resource_id,
        })
    }

    /// Parses `$`-separated components; the first non-`eq` component
    /// prefix becomes the comparator of the whole value.
    fn composite_literal(
        &self,
        definition: &SearchParameterDefinition,
        raw: &str,
    ) -> QueryResult<(SearchPrefix, Literal)> {
        let components = definition.component.as_deref().unwrap_or_default();
        let parts = split_unescaped(raw, '$');
        if components.is_empty() || parts.len() != components.len() {
            return Err(QueryError::invalid_value(
                &definition.code,
                format!("expected {} '$'-separated components", components.len()),
            ));
        }

        let mut comparator = SearchPrefix::Eq;
        let mut literals = Vec::with_capacity(parts.len());
        for (component, part) in components.iter().zip(&parts) {
            let component_def = self.params.lookup_url(&component.definition).ok_or_else(|| {
                QueryError::invalid_value(
                    &definition.code,
                    format!("unknown component definition '{}'", component.definition),
                )
            })?;
            let (prefix, literal) = self.parse_literal(&component_def, None, part)?;
            if comparator == SearchPrefix::Eq {
                comparator = prefix;
            }
            literals.push(literal);
        }
        Ok((
            comparator,
            Literal::Composite {
                components: literals,
            },
        ))
    }
}

impl LeafValueParser for DefaultLeafParser {
    fn parse(
        &self,
        definition: &SearchParameterDefinition,
        modifier: Option<&SearchModifier>,
        raw: &str,
    ) -> QueryResult<Expression> {
        let (comparator, literal) = match modifier {
            Some(SearchModifier::Missing) => {
                let missing = bool::from_str(raw).map_err(|_| {
                    QueryError::invalid_value(&definition.code, ":missing takes 'true' or 'false'")
                })?;
                (SearchPrefix::Eq, Literal::Missing { missing })
            }
            _ => self.parse_literal(definition, modifier, raw)?,
        };
        Ok(Expression::leaf(&definition.code, modifier.cloned(), comparator, literal))
    }
}

impl std::fmt::Debug for DefaultLeafParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultLeafParser").finish()
    }
}

fn token_literal(raw: &str) -> Literal {
    let mut parts = split_unescaped(raw, '|').into_iter();
    let first = parts.next().unwrap_or_default();
    match parts.next() {
        None => Literal::Token {
            system: None,
            code: Some(unescape(&first)),
        },
        Some(code) => Literal::Token {
            system: Some(unescape(&first)),
            code: (!code.is_empty()).then(|| unescape(&code)),
        },
    }
}

/// `system|code|value` for `:of-type`, as the identifier type token and its value.
fn of_type_literal(raw: &str) -> Option<Literal> {
    let parts = split_unescaped(raw, '|');
    let [system, code, value] = parts.as_slice() else {
        return None;
    };
    if code.is_empty() || value.is_empty() {
        return None;
    }
    Some(Literal::Composite {
        components: vec![
            Literal::Token {
                system: Some(unescape(system)),
                code: Some(unescape(code)),
            },
            Literal::String {
                value: unescape(value),
            },
        ],
    })
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

/// Splits on unescaped `sep`. `\sep` becomes `sep`; other escapes are kept.
pub(crate) fn split_unescaped(s: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(next) if next == sep => current.push(next),
                Some(next) => {
                    current.push('\\');
                    current.push(next);
                }
                None => current.push('\\'),
            },
            c if c == sep => parts.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    parts.push(current);
    parts
}

/// Removes the search escapes `\,` `\|` `\$` and `\\`.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next @ (',' | '|' | '$' | '\\')) => out.push(next),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}
