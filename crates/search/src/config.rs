//! Search engine configuration.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `HFS_SEARCH_MAX_CHAIN_DEPTH` | 4 | Maximum chain hops per query key |
//! | `HFS_SEARCH_BASE_URL` | http://localhost:8080 | Base URL used to classify references |
//! | `HFS_SEARCH_LOG_LEVEL` | info | Log level |
//! | `HFS_SEARCH_PARAMS_CONFIG` | | Extra SearchParameter definitions (JSON file) |
//!
//! # Example
//!
//! ```rust
//! use helios_search::SearchConfig;
//!
//! let config = SearchConfig {
//!     max_chain_depth: 2,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::path::PathBuf;

use clap::Parser;

/// Configuration of the query parser and indexers.
#[derive(Debug, Clone, Parser)]
#[command(name = "helios-search")]
#[command(about = "FHIR search compilation and indexing")]
pub struct SearchConfig {
    /// Maximum number of chain and reverse-chain hops in one query key.
    #[arg(long, env = "HFS_SEARCH_MAX_CHAIN_DEPTH", default_value = "4")]
    pub max_chain_depth: usize,

    /// Base URL of this server; absolute references under it are internal.
    #[arg(long, env = "HFS_SEARCH_BASE_URL", default_value = "http://localhost:8080")]
    pub base_url: String,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "HFS_SEARCH_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// JSON file with additional SearchParameter resources.
    #[arg(long, env = "HFS_SEARCH_PARAMS_CONFIG")]
    pub params_config: Option<PathBuf>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_chain_depth: 4,
            base_url: "http://localhost:8080".to_string(),
            log_level: "info".to_string(),
            params_config: None,
        }
    }
}

impl SearchConfig {
    /// Creates a configuration from environment variables alone.
    pub fn from_env() -> Self {
        Self::try_parse_from(["helios-search"]).unwrap_or_default()
    }

    /// Validates the configuration and returns errors if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.max_chain_depth == 0 {
            errors.push("Max chain depth cannot be 0".to_string());
        }

        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            errors.push(format!("Base URL must be http(s): {}", self.base_url));
        }

        if !["error", "warn", "info", "debug", "trace"].contains(&self.log_level.to_lowercase().as_str()) {
            errors.push(format!("Unknown log level: {}", self.log_level));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SearchConfig::default();
        assert_eq!(config.max_chain_depth, 4);
        assert_eq!(config.base_url, "http://localhost:8080");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let config = SearchConfig {
            max_chain_depth: 0,
            base_url: "localhost".to_string(),
            log_level: "loud".to_string(),
            params_config: None,
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_from_env_is_valid() {
        assert!(SearchConfig::from_env().max_chain_depth > 0);
    }

    #[test]
    fn test_parse_from_args() {
        let config =
            SearchConfig::try_parse_from(["helios-search", "--max-chain-depth", "2"]).unwrap();
        assert_eq!(config.max_chain_depth, 2);
    }
}
