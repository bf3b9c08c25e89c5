//! Extraction backend abstraction
//!
//! The backend is opaque to the pipeline: it receives prefiltered text plus
//! the target record kind and returns zero or more records, or an error.

use crate::extract::job::ExtractionError;
use crate::extract::schema::{Record, RecordKind};
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

fn code_fence() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").ok())
        .as_ref()
}

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extracts records of `kind` from `input`
    async fn invoke(&self, input: &str, kind: RecordKind) -> Result<Vec<Record>, ExtractionError>;

    /// Short name used in logs
    fn name(&self) -> &str {
        "extractor"
    }
}

/// Pulls the JSON payload out of a model response
///
/// Strips markdown code fences when present, then takes the span from the
/// first `{` to the last `}`. Responses that are a bare array are returned
/// as-is.
pub fn clean_json_response(response: &str) -> &str {
    let fenced = code_fence()
        .and_then(|fence| fence.captures(response))
        .and_then(|c| c.get(1))
        .map(|m| (m.start(), m.end()));
    let text = match fenced {
        Some((start, end)) => &response[start..end],
        None => response,
    }
    .trim();

    if text.starts_with('[') {
        return text;
    }

    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

/// Parses a raw model response into records of `kind`
pub fn parse_response(response: &str, kind: RecordKind) -> Result<Vec<Record>, ExtractionError> {
    let json = clean_json_response(response);
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(ExtractionError::malformed)?;
    kind.parse_records(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::job::ExtractionErrorKind;

    #[test]
    fn test_clean_fenced_response() {
        let response = "Here you go:\n```json\n{\"records\": []}\n```";
        assert_eq!(clean_json_response(response), "{\"records\": []}");
    }

    #[test]
    fn test_clean_takes_outer_object() {
        let response = "Sure! {\"records\": [{\"name\": \"A\"}]} Let me know.";
        assert_eq!(
            clean_json_response(response),
            "{\"records\": [{\"name\": \"A\"}]}"
        );
    }

    #[test]
    fn test_parse_response_records() {
        let records = parse_response(
            r#"{"events": [{"name": "Jazz Night", "date": "May 3", "location": "PAC"}]}"#,
            RecordKind::Events,
        )
        .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind(), RecordKind::Events);
    }

    #[test]
    fn test_parse_response_not_json() {
        let err = parse_response("I could not find any events.", RecordKind::Events).unwrap_err();
        assert_eq!(err.kind, ExtractionErrorKind::Malformed);
    }

    #[test]
    fn test_code_fence_compiled_once() {
        let first = code_fence().expect("fence pattern compiles");
        let second = code_fence().expect("fence pattern compiles");
        assert!(std::ptr::eq(first, second));
        assert_eq!(clean_json_response("```\n{}\n```"), "{}");
    }
}
