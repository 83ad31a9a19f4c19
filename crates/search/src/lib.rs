//! # helios-search - FHIR search compilation and indexing
//!
//! This crate holds the search core of the Helios FHIR Server. It turns
//! search query parameters into typed expression trees, converts document
//! elements into normalized index values, and derives the compartments a
//! resource belongs to.
//!
//! ## Features
//!
//! - **Query compilation**: modifiers, comma OR, chains with target fan-out,
//!   `_has` reverse chains and a configurable chain depth limit
//! - **Value conversion**: converters keyed by element shape and parameter
//!   type, with fallback from `code<X>` shapes to their base shape
//! - **Indexing**: path-driven extraction of every parameter of a resource
//! - **Compartments**: Patient, Encounter, Device, Practitioner and
//!   RelatedPerson membership from the extracted references
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use helios_search::{SearchConfig, SearchEngine};
//!
//! let engine = SearchEngine::new(&SearchConfig::default())?;
//!
//! let expression = engine.parse("Observation", "subject:Patient.name", "peter")?;
//! let indexed = engine.index(&observation_json, "Observation")?;
//! for (compartment, owners) in indexed.compartments.iter() {
//!     println!("{}: {:?}", compartment, owners.iter().collect::<Vec<_>>());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`types`] - search values, modifiers, prefixes and expressions
//! - [`query`] - the expression parser and leaf value parser
//! - [`search`] - parameter definitions, converters and the resource indexer
//! - [`compartment`] - compartment definitions and the compartment indexer
//! - [`config`] - runtime configuration
//! - [`error`] - error types

pub mod compartment;
pub mod config;
pub mod error;
pub mod query;
pub mod search;
pub mod types;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

pub use compartment::{
    CompartmentDefinitionRegistry, CompartmentIndexer, CompartmentIndices, CompartmentLookup,
    CompartmentType, ResourceIdSet,
};
pub use config::SearchConfig;
pub use error::{
    ExtractionError, LoaderError, QueryError, QueryResult, RegistryError, SearchError,
};
pub use query::{DefaultLeafParser, ExpressionParser, LeafValueParser};
pub use search::{
    ConverterRegistry, DefaultReferenceResolver, Element, ElementShape, ParameterLookup,
    SearchIndexer, SearchParameterDefinition, SearchParameterLoader, SearchParameterRegistry,
};
pub use types::{Expression, Literal, SearchIndexEntry, SearchParamType, SearchValue};

/// Index entries and compartment membership of one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedResource {
    /// Every extracted search value.
    pub entries: Vec<SearchIndexEntry>,
    /// Compartments the resource belongs to.
    pub compartments: CompartmentIndices,
}

/// The parser and indexers wired to one set of definitions.
pub struct SearchEngine {
    params: Arc<SearchParameterRegistry>,
    parser: ExpressionParser,
    indexer: SearchIndexer,
    compartments: CompartmentIndexer,
}

impl SearchEngine {
    /// Builds an engine from the embedded definitions plus the configured
    /// parameter file, with the standard compartment definitions.
    ///
    /// Installs the tracing subscriber at `config.log_level` unless one is
    /// already set.
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        config
            .validate()
            .map_err(|errors| SearchError::InvalidConfig {
                message: errors.join("; "),
            })?;
        init_logging(&config.log_level);

        let params = SearchParameterLoader::new().registry(config.params_config.as_deref())?;
        info!(
            parameters = params.len(),
            resource_types = params.resource_types().len(),
            "search parameters loaded"
        );

        Self::with_definitions(
            Arc::new(params),
            Arc::new(CompartmentDefinitionRegistry::standard()),
            config,
        )
    }

    /// Builds an engine over caller-supplied definitions.
    pub fn with_definitions(
        params: Arc<SearchParameterRegistry>,
        compartments: Arc<dyn CompartmentLookup>,
        config: &SearchConfig,
    ) -> Result<Self, SearchError> {
        let resolver = DefaultReferenceResolver::new(&config.base_url, params.resource_types())
            .map_err(|e| SearchError::InvalidConfig {
                message: format!("cannot build reference patterns: {}", e),
            })?;
        let resolver = Arc::new(resolver);

        let lookup: Arc<dyn ParameterLookup> = params.clone();
        let leaf = Arc::new(DefaultLeafParser::new(lookup.clone(), resolver.clone()));
        let converters = Arc::new(ConverterRegistry::with_builtins(resolver));

        Ok(Self {
            parser: ExpressionParser::with_config(lookup.clone(), leaf, config),
            indexer: SearchIndexer::new(lookup, converters),
            compartments: CompartmentIndexer::new(compartments),
            params,
        })
    }

    /// The loaded parameter definitions.
    pub fn parameters(&self) -> &SearchParameterRegistry {
        &self.params
    }

    /// Compiles one `key=value` pair.
    pub fn parse(&self, resource_type: &str, key: &str, value: &str) -> QueryResult<Expression> {
        self.parser.parse(resource_type, key, value)
    }

    /// Compiles a whole query string's pairs into a conjunction.
    ///
    /// A single pair compiles to its own expression; no pairs compile to an
    /// empty `And`, which matches everything.
    pub fn parse_query<'a, I>(&self, resource_type: &str, pairs: I) -> QueryResult<Expression>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut clauses = pairs
            .into_iter()
            .map(|(key, value)| self.parse(resource_type, key, value))
            .collect::<QueryResult<Vec<_>>>()?;

        Ok(match clauses.len() {
            1 => clauses.remove(0),
            _ => Expression::And(clauses),
        })
    }

    /// Extracts the index entries and compartments of `resource`.
    pub fn index(&self, resource: &Value, resource_type: &str) -> Result<IndexedResource, SearchError> {
        let entries = self.indexer.index(resource, resource_type)?;
        let compartments = self.compartments.extract(resource_type, &entries);
        Ok(IndexedResource {
            entries,
            compartments,
        })
    }
}

impl std::fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchEngine")
            .field("parameters", &self.params.len())
            .field("parser", &self.parser)
            .finish()
    }
}

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` takes precedence over `level`. Calling this more than once is
/// harmless; later calls leave the first subscriber in place.
pub fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("helios_search={}", level)));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init();
}
