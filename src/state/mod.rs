//! Run state for Campus-Harvest
//!
//! This module defines the pipeline run phases and the run-scoped context
//! shared by traversal, extraction and aggregation.

mod context;
mod phase;

pub use context::RunContext;
pub use phase::RunPhase;
