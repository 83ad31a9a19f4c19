//! Shared setup for the integration tests.

#![allow(dead_code)]

pub mod fixtures;

pub use fixtures::*;

use std::sync::Arc;

use helios_search::search::ParameterLookup;
use helios_search::{
    DefaultLeafParser, DefaultReferenceResolver, ExpressionParser, SearchConfig, SearchEngine,
    SearchParameterLoader, SearchParameterRegistry,
};

/// Base URL every test server pretends to live at.
pub const BASE_URL: &str = "http://localhost:8080";

/// The embedded parameter registry.
pub fn registry() -> Arc<SearchParameterRegistry> {
    Arc::new(
        SearchParameterLoader::new()
            .registry(None)
            .expect("embedded parameters load"),
    )
}

/// A leaf parser over the embedded registry.
pub fn leaf_parser(params: Arc<SearchParameterRegistry>) -> Arc<DefaultLeafParser> {
    let resolver = DefaultReferenceResolver::new(BASE_URL, params.resource_types())
        .expect("reference patterns compile");
    Arc::new(DefaultLeafParser::new(params, Arc::new(resolver)))
}

/// An expression parser over the embedded registry.
pub fn parser(max_depth: usize) -> ExpressionParser {
    let params = registry();
    let leaf = leaf_parser(params.clone());
    let lookup: Arc<dyn ParameterLookup> = params;
    ExpressionParser::new(lookup, leaf, max_depth)
}

/// An engine with the default configuration.
pub fn engine() -> SearchEngine {
    SearchEngine::new(&SearchConfig::default()).expect("default engine builds")
}
