//! Structured record extraction
//!
//! This module turns fetched pages into records:
//! - Record shapes and natural keys
//! - Content prefiltering into extraction jobs
//! - The extraction backend trait and its Ollama implementation
//! - Bounded concurrent batch extraction

mod backend;
mod batcher;
mod job;
mod ollama;
mod prefilter;
mod schema;
pub mod testing;

pub use backend::{clean_json_response, parse_response, Extractor};
pub use batcher::{BatchResult, BatchStats, ExtractionBatcher};
pub use job::{ExtractionError, ExtractionErrorKind, ExtractionJob, ExtractionOutcome};
pub use ollama::OllamaExtractor;
pub use prefilter::{ContentPrefilter, PrefilterRules, PrefilterStrategy, Prefiltered};
pub use schema::{
    CourseRecord, EventRecord, FacultyRecord, NaturalKey, Record, RecordEnvelope, RecordKind,
};
