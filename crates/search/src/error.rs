//! Error types for search compilation and indexing.
//!
//! Query compilation errors are always client-input errors and abort the
//! whole parse. Extraction errors signal a malformed document element.
//! Compartment extraction has no error type: an unmapped document type simply
//! belongs to no compartment.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// Umbrella error for the crate.
#[derive(Error, Debug)]
pub enum SearchError {
    /// Query compilation errors
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Value extraction errors
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// Definition loading errors
    #[error(transparent)]
    Loader(#[from] LoaderError),

    /// Registry construction errors
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Configuration rejected at startup
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },
}

/// Errors raised while compiling a `key=value` query pair.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// No parameter with this code is defined for the resource type.
    #[error("search parameter '{name}' is not supported for resource type '{resource_type}'")]
    UnsupportedParameter { resource_type: String, name: String },

    /// Malformed key syntax or a modifier that cannot apply.
    #[error("invalid search operation: {reason}")]
    InvalidOperation { reason: String },

    /// No candidate target type of a chain step supports the rest of the chain.
    #[error("no target type of '{resource_type}.{parameter}' supports the remainder of the chain")]
    NoMatchingTarget {
        resource_type: String,
        parameter: String,
    },

    /// The chain has more hops than the configured limit.
    #[error("search chain exceeds the maximum depth of {max_depth}")]
    ChainTooDeep { max_depth: usize },

    /// The value could not be read as the parameter's type.
    #[error("invalid value for search parameter '{parameter}': {message}")]
    InvalidValue { parameter: String, message: String },
}

impl QueryError {
    /// Creates an [`QueryError::InvalidOperation`].
    pub fn invalid_operation(reason: impl Into<String>) -> Self {
        QueryError::InvalidOperation {
            reason: reason.into(),
        }
    }

    /// Creates an [`QueryError::InvalidValue`].
    pub fn invalid_value(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        QueryError::InvalidValue {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Every query error is caused by the request, never by the server.
    pub fn is_client_error(&self) -> bool {
        true
    }

    /// Returns true when a chain candidate failing with this error may be skipped.
    pub fn is_unsupported_parameter(&self) -> bool {
        matches!(self, QueryError::UnsupportedParameter { .. })
    }
}

/// Errors raised while extracting search values from a document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// The document is not a JSON object or has the wrong type.
    #[error("invalid resource: {message}")]
    InvalidResource { message: String },

    /// An element violates its own shape.
    #[error("cannot convert '{actual_value}' of shape {shape} to {expected_type}")]
    ConversionFailed {
        shape: String,
        expected_type: String,
        actual_value: String,
    },
}

/// Errors raised while loading parameter or compartment definitions.
#[derive(Error, Debug)]
pub enum LoaderError {
    /// Invalid definition resource structure.
    #[error("invalid definition{}: {message}", .url.as_ref().map(|u| format!(" '{}'", u)).unwrap_or_default())]
    InvalidResource { message: String, url: Option<String> },

    /// A required field is missing.
    #[error("definition{} missing required field '{field}'", .url.as_ref().map(|u| format!(" '{}'", u)).unwrap_or_default())]
    MissingField { field: String, url: Option<String> },

    /// The configuration file could not be read or parsed.
    #[error("failed to load config from '{path}': {message}")]
    ConfigLoadFailed { path: String, message: String },
}

/// Errors raised while building a registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A parameter with this URL was already registered.
    #[error("search parameter with URL '{url}' already exists")]
    DuplicateUrl { url: String },

    /// The definition is unusable.
    #[error("invalid search parameter definition: {message}")]
    InvalidDefinition { message: String },
}

/// Result alias for query compilation.
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_display() {
        let err = QueryError::UnsupportedParameter {
            resource_type: "Observation".to_string(),
            name: "bogus".to_string(),
        };
        assert!(err.to_string().contains("bogus"));
        assert!(err.to_string().contains("Observation"));
        assert!(err.is_unsupported_parameter());

        let err = QueryError::invalid_operation("bad modifier");
        assert!(!err.is_unsupported_parameter());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_loader_error_display() {
        let err = LoaderError::MissingField {
            field: "expression".to_string(),
            url: Some("http://example.org/SearchParameter/test".to_string()),
        };
        assert!(err.to_string().contains("expression"));
        assert!(err.to_string().contains("test"));

        let err = LoaderError::MissingField {
            field: "code".to_string(),
            url: None,
        };
        assert_eq!(err.to_string(), "definition missing required field 'code'");
    }

    #[test]
    fn test_umbrella_conversion() {
        let err: SearchError = QueryError::ChainTooDeep { max_depth: 4 }.into();
        assert!(matches!(err, SearchError::Query(QueryError::ChainTooDeep { max_depth: 4 })));
    }
}
