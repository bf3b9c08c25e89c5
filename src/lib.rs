//! Campus-Harvest: crawl-then-extract pipeline for university web pages
//!
//! This crate walks department listing pages (events, course catalogs,
//! faculty directories), waits for dynamically loaded content to settle,
//! trims each page down to its record-bearing markup and hands the result
//! to a text-to-structured-data backend under a fixed concurrency ceiling.
//! Per-page results are merged into one deduplicated record set.

pub mod config;
pub mod crawler;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod state;
pub mod storage;
pub mod url;

use std::time::Duration;
use thiserror::Error;

/// Main error type for run-level failures
///
/// Per-page fetch failures and per-job extraction failures never surface
/// here; they are folded into the aggregate result instead.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("Run {run_id} exceeded its deadline of {}s", budget.as_secs())]
    BudgetExceeded { run_id: String, budget: Duration },

    #[error("Invalid phase transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::RunPhase,
        to: state::RunPhase,
    },

    #[error("Output error: {0}")]
    Sink(#[from] output::SinkError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// HTTP-equivalent status code for the triggering surface
    ///
    /// | Error | Code |
    /// |-------|------|
    /// | invalid input / unknown target | 400 |
    /// | deadline exceeded | 408 |
    /// | anything else | 500 |
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Config(_) | Self::UrlError(_) => 400,
            Self::BudgetExceeded { .. } => 408,
            _ => 500,
        }
    }

    /// Returns true for the deadline error
    pub fn is_budget_exceeded(&self) -> bool {
        matches!(self, Self::BudgetExceeded { .. })
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Seed {seed} is outside the allowed domains")]
    SeedOutsideDomains { seed: String },

    #[error("Unknown extraction target: {kind} {code}")]
    UnknownTarget {
        kind: extract::RecordKind,
        code: String,
    },

    #[error("Unknown record kind: {0}")]
    UnknownKind(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Campus-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use extract::{Record, RecordKind};
pub use pipeline::{Pipeline, RunReport};
pub use state::{RunContext, RunPhase};
pub use url::{extract_domain, normalize_url, AllowRules};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let unknown = HarvestError::Config(ConfigError::UnknownTarget {
            kind: RecordKind::Courses,
            code: "NOPE".to_string(),
        });
        assert_eq!(unknown.status_code(), 400);

        let budget = HarvestError::BudgetExceeded {
            run_id: "courses-csci".to_string(),
            budget: Duration::from_secs(300),
        };
        assert_eq!(budget.status_code(), 408);
        assert!(budget.is_budget_exceeded());

        let io = HarvestError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert_eq!(io.status_code(), 500);
    }

    #[test]
    fn test_budget_message_names_run() {
        let err = HarvestError::BudgetExceeded {
            run_id: "events-all-1".to_string(),
            budget: Duration::from_secs(5),
        };
        assert_eq!(
            err.to_string(),
            "Run events-all-1 exceeded its deadline of 5s"
        );
    }
}
