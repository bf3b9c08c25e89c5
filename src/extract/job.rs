//! Extraction jobs and their outcomes

use crate::extract::schema::{Record, RecordKind};
use serde::Serialize;
use std::fmt;
use url::Url;

/// One unit of extraction work: a page body (or fragment) plus its schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionJob {
    pub source_url: Url,
    pub body: String,
    pub kind: RecordKind,
    /// Index of the fragment within its page; 0 when the page is not split
    pub fragment: usize,
}

impl ExtractionJob {
    pub fn new(source_url: Url, body: String, kind: RecordKind, fragment: usize) -> Self {
        Self {
            source_url,
            body,
            kind,
            fragment,
        }
    }

    /// Text handed to the backend as the user message
    pub fn prompt_input(&self) -> String {
        format!("Source URL: {}\n\n{}", self.source_url, self.body)
    }

    pub fn label(&self) -> String {
        if self.fragment == 0 {
            self.source_url.to_string()
        } else {
            format!("{}#{}", self.source_url, self.fragment)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionErrorKind {
    /// Backend unreachable or returned an error status
    Backend,
    Timeout,
    /// Response was not parseable JSON
    Malformed,
    /// JSON parsed but did not match the record shape
    SchemaMismatch,
    /// The invocation panicked
    Panicked,
}

impl ExtractionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backend => "backend",
            Self::Timeout => "timeout",
            Self::Malformed => "malformed",
            Self::SchemaMismatch => "schema_mismatch",
            Self::Panicked => "panicked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} extraction error: {message}", kind.as_str())]
pub struct ExtractionError {
    pub kind: ExtractionErrorKind,
    pub message: String,
}

impl ExtractionError {
    pub fn new(kind: ExtractionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn backend(message: impl fmt::Display) -> Self {
        Self::new(ExtractionErrorKind::Backend, message.to_string())
    }

    pub fn malformed(message: impl fmt::Display) -> Self {
        Self::new(ExtractionErrorKind::Malformed, message.to_string())
    }

    pub fn schema_mismatch(message: impl fmt::Display) -> Self {
        Self::new(ExtractionErrorKind::SchemaMismatch, message.to_string())
    }
}

/// Result of one job; exactly one is produced per submitted job
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    Success {
        source_url: Url,
        fragment: usize,
        records: Vec<Record>,
    },
    Failure {
        source_url: Url,
        fragment: usize,
        error: ExtractionError,
    },
}

impl ExtractionOutcome {
    pub fn from_result(job: &ExtractionJob, result: Result<Vec<Record>, ExtractionError>) -> Self {
        match result {
            Ok(records) => Self::Success {
                source_url: job.source_url.clone(),
                fragment: job.fragment,
                records,
            },
            Err(error) => Self::Failure {
                source_url: job.source_url.clone(),
                fragment: job.fragment,
                error,
            },
        }
    }

    pub fn source_url(&self) -> &Url {
        match self {
            Self::Success { source_url, .. } | Self::Failure { source_url, .. } => source_url,
        }
    }

    pub fn fragment(&self) -> usize {
        match self {
            Self::Success { fragment, .. } | Self::Failure { fragment, .. } => *fragment,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(fragment: usize) -> ExtractionJob {
        ExtractionJob::new(
            Url::parse("https://catalog.example.edu/csci").unwrap(),
            "CSCI 141".to_string(),
            RecordKind::Courses,
            fragment,
        )
    }

    #[test]
    fn test_prompt_input_carries_source() {
        assert_eq!(
            job(0).prompt_input(),
            "Source URL: https://catalog.example.edu/csci\n\nCSCI 141"
        );
    }

    #[test]
    fn test_label_includes_fragment() {
        assert_eq!(job(0).label(), "https://catalog.example.edu/csci");
        assert_eq!(job(3).label(), "https://catalog.example.edu/csci#3");
    }

    #[test]
    fn test_outcome_from_error() {
        let outcome = ExtractionOutcome::from_result(
            &job(2),
            Err(ExtractionError::backend("connection refused")),
        );
        assert!(!outcome.is_success());
        assert_eq!(outcome.fragment(), 2);
    }

    #[test]
    fn test_error_display() {
        let err = ExtractionError::new(ExtractionErrorKind::Timeout, "job exceeded 120s");
        assert_eq!(err.to_string(), "timeout extraction error: job exceeded 120s");
    }
}
