//! Compiled search expressions.
//!
//! The query parser produces one [`Expression`] tree per `key=value` pair.
//! Trees are handed to the query evaluator of the storage backend and then
//! dropped.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::date_range::DateRange;
use super::search_params::{SearchModifier, SearchPrefix};
use super::search_value::ReferenceKind;

/// A typed literal on the right-hand side of a leaf comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Literal {
    /// `[system]|[code]`, `|[code]`, `[system]|` or `[code]`.
    Token {
        /// Code system; `Some("")` means "explicitly no system".
        system: Option<String>,
        /// Code; absent for `system|` searches.
        code: Option<String>,
    },
    /// Plain text.
    String {
        /// The text.
        value: String,
    },
    /// Decimal number.
    Number {
        /// The number.
        value: Decimal,
    },
    /// `[number]|[system]|[code]`.
    Quantity {
        /// The number.
        value: Decimal,
        /// Unit system.
        system: Option<String>,
        /// Unit code.
        code: Option<String>,
    },
    /// Partial date or date-time.
    Date {
        /// The range the date covers.
        range: DateRange,
    },
    /// URI text.
    Uri {
        /// The URI.
        value: String,
    },
    /// Reference target.
    Reference {
        /// Internal, external or ambiguous.
        kind: ReferenceKind,
        /// Base URI of absolute references.
        base_uri: Option<String>,
        /// Target type if known.
        target_type: Option<String>,
        /// Target id.
        resource_id: Option<String>,
    },
    /// `:missing=true|false`.
    Missing {
        /// True to match documents without a value.
        missing: bool,
    },
    /// `$`-separated components of a composite parameter.
    Composite {
        /// One literal per component, in definition order.
        components: Vec<Literal>,
    },
}

/// A node of a compiled search expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", content = "args", rename_all = "snake_case")]
pub enum Expression {
    /// Terminal comparison against one parameter.
    Leaf {
        /// The parameter code.
        parameter: String,
        /// Modifier from the key, if any.
        modifier: Option<SearchModifier>,
        /// Comparison prefix; `eq` when none was given.
        comparator: SearchPrefix,
        /// The typed value.
        literal: Literal,
    },

    /// Follow a reference parameter into one concrete target type.
    Chained {
        /// Reference parameter on the current type.
        source_parameter: String,
        /// Target type the chain continues on.
        target_type: String,
        /// Expression evaluated against the target type.
        inner: Box<Expression>,
    },

    /// Match documents referenced by `source_type` documents that satisfy `inner` (`_has`).
    ReverseChained {
        /// Type holding the reference.
        source_type: String,
        /// Reference parameter on `source_type` pointing back at the current type.
        reference_parameter: String,
        /// Expression evaluated against `source_type`.
        inner: Box<Expression>,
    },

    /// Any branch matches.
    Or(Vec<Expression>),

    /// Every branch matches.
    And(Vec<Expression>),
}

impl Expression {
    /// Creates a leaf with the given comparator.
    pub fn leaf(
        parameter: impl Into<String>,
        modifier: Option<SearchModifier>,
        comparator: SearchPrefix,
        literal: Literal,
    ) -> Self {
        Expression::Leaf {
            parameter: parameter.into(),
            modifier,
            comparator,
            literal,
        }
    }

    /// Wraps `inner` in a chain step.
    pub fn chained(
        source_parameter: impl Into<String>,
        target_type: impl Into<String>,
        inner: Expression,
    ) -> Self {
        Expression::Chained {
            source_parameter: source_parameter.into(),
            target_type: target_type.into(),
            inner: Box::new(inner),
        }
    }

    /// Wraps `inner` in a reverse chain step.
    pub fn reverse_chained(
        source_type: impl Into<String>,
        reference_parameter: impl Into<String>,
        inner: Expression,
    ) -> Self {
        Expression::ReverseChained {
            source_type: source_type.into(),
            reference_parameter: reference_parameter.into(),
            inner: Box::new(inner),
        }
    }

    /// Number of nodes on the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        match self {
            Expression::Leaf { .. } => 1,
            Expression::Chained { inner, .. } | Expression::ReverseChained { inner, .. } => {
                1 + inner.depth()
            }
            Expression::Or(branches) | Expression::And(branches) => {
                1 + branches.iter().map(Expression::depth).max().unwrap_or(0)
            }
        }
    }

    /// Collects every leaf in the tree, left to right.
    pub fn leaves(&self) -> Vec<&Expression> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Expression>) {
        match self {
            Expression::Leaf { .. } => out.push(self),
            Expression::Chained { inner, .. } | Expression::ReverseChained { inner, .. } => {
                inner.collect_leaves(out)
            }
            Expression::Or(branches) | Expression::And(branches) => {
                for branch in branches {
                    branch.collect_leaves(out);
                }
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Leaf {
                parameter,
                modifier,
                comparator,
                literal,
            } => {
                write!(f, "({}", parameter)?;
                if let Some(modifier) = modifier {
                    write!(f, ":{}", modifier)?;
                }
                write!(f, " {} {:?})", comparator, literal)
            }
            Expression::Chained {
                source_parameter,
                target_type,
                inner,
            } => write!(f, "(chain {}:{} {})", source_parameter, target_type, inner),
            Expression::ReverseChained {
                source_type,
                reference_parameter,
                inner,
            } => write!(f, "(has {}:{} {})", source_type, reference_parameter, inner),
            Expression::Or(branches) => write_branches(f, "or", branches),
            Expression::And(branches) => write_branches(f, "and", branches),
        }
    }
}

fn write_branches(f: &mut fmt::Formatter<'_>, op: &str, branches: &[Expression]) -> fmt::Result {
    write!(f, "({}", op)?;
    for branch in branches {
        write!(f, " {}", branch)?;
    }
    write!(f, ")")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name_leaf() -> Expression {
        Expression::leaf(
            "name",
            None,
            SearchPrefix::Eq,
            Literal::String {
                value: "Smith".to_string(),
            },
        )
    }

    #[test]
    fn test_depth_and_leaves() {
        let tree = Expression::Or(vec![
            Expression::chained("subject", "Patient", name_leaf()),
            Expression::chained("subject", "Group", name_leaf()),
        ]);
        assert_eq!(tree.depth(), 3);
        assert_eq!(tree.leaves().len(), 2);
    }

    #[test]
    fn test_display() {
        let tree = Expression::chained("subject", "Patient", name_leaf());
        let rendered = tree.to_string();
        assert!(rendered.starts_with("(chain subject:Patient (name eq"));
    }
}
