//! URL handling module for Campus-Harvest
//!
//! This module provides URL normalization for frontier deduplication,
//! domain extraction, wildcard domain matching, and the allow-rules that
//! decide which discovered links a traversal may admit.

mod normalize;
mod rules;

pub use normalize::{normalize_parsed, normalize_url};
pub use rules::{extract_domain, matches_wildcard, AllowRules};
