//! Search query compilation.
//!
//! - [`parser`] - `key=value` to [`Expression`](crate::types::Expression)
//! - [`leaf`] - typed values of a single parameter

pub mod leaf;
pub mod parser;

pub use leaf::{DefaultLeafParser, LeafValueParser};
pub use parser::ExpressionParser;
