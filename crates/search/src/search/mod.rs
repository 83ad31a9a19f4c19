//! Search parameter management and value extraction.
//!
//! - [`registry`] - parameter definitions and the [`ParameterLookup`] seam
//! - [`loader`] - embedded, JSON and config-file definition sources
//! - [`element`] - document elements and their shapes
//! - [`converters`] - the shape-keyed converter registry
//! - [`reference`] - reference string classification
//! - [`extractor`] - path-driven index extraction
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use helios_search::search::{
//!     ConverterRegistry, DefaultReferenceResolver, SearchIndexer, SearchParameterLoader,
//! };
//!
//! let registry = SearchParameterLoader::new().registry(None)?;
//! let resolver = DefaultReferenceResolver::new("http://localhost:8080", registry.resource_types())?;
//! let indexer = SearchIndexer::new(
//!     Arc::new(registry),
//!     Arc::new(ConverterRegistry::with_builtins(Arc::new(resolver))),
//! );
//! let entries = indexer.index(&observation_json, "Observation")?;
//! ```

pub mod converters;
pub mod element;
pub mod extractor;
pub mod loader;
pub mod reference;
pub mod registry;

pub use converters::{ConverterRegistry, SearchValueConverter};
pub use element::{Element, ElementShape};
pub use extractor::SearchIndexer;
pub use loader::SearchParameterLoader;
pub use reference::{DefaultReferenceResolver, ReferenceResolver};
pub use registry::{
    CompositeComponentDef, ParameterLookup, SearchParameterDefinition, SearchParameterRegistry,
    SearchParameterSource, SearchParameterStatus,
};
