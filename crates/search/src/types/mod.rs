//! Core types shared by the parser, the converters and the indexers.
//!
//! - [`search_params`] - parameter kinds, modifiers and prefixes
//! - [`search_value`] - normalized index values and entries
//! - [`expression`] - compiled query expressions
//! - [`date_range`] - partial date normalization

mod date_range;
mod expression;
mod search_params;
mod search_value;

pub use date_range::{DatePrecision, DateRange};
pub use expression::{Expression, Literal};
pub use search_params::{SearchModifier, SearchParamType, SearchPrefix};
pub use search_value::{ReferenceKind, SearchIndexEntry, SearchValue};
