//! Configuration module for Campus-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use campus_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("campus-harvest.toml")).unwrap();
//! println!("{} sources configured", config.sources.len());
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    Config, CrawlerConfig, ExtractionConfig, InputFormat, OutputConfig, PrefilterConfig,
    RunConfig, SinkKind, SourceConfig, StabilityConfig, StabilitySignal, StabilizeScope,
    Traversal, TriggerAction, UserAgentConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
