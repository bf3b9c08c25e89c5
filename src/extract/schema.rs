//! Record shapes produced by extraction
//!
//! The set of shapes is closed: each `RecordKind` names exactly one record
//! struct, and the kind travels with every job as its schema descriptor.
//!
//! # Natural keys
//!
//! Records carry no external identifier. Deduplication uses these fields,
//! lowercased with internal whitespace collapsed:
//!
//! | Kind | Key |
//! |------|-----|
//! | events | (name, date, location) |
//! | courses | (name) |
//! | faculty | (name, website) |

use crate::extract::job::ExtractionError;
use crate::ConfigError;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Target record shape of an extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Events,
    Courses,
    Faculty,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [Self::Events, Self::Courses, Self::Faculty];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Events => "events",
            Self::Courses => "courses",
            Self::Faculty => "faculty",
        }
    }

    /// Extraction instructions placed in the system prompt
    pub fn instructions(&self) -> &'static str {
        match self {
            Self::Events => {
                "You are an expert at extracting event information from university web content. \
                 Look for scheduled events, meetings, workshops, performances, lectures, seminars, \
                 sports events, social activities, academic events and deadlines. \
                 Use the event's own page link for source_url when the content shows one."
            }
            Self::Courses => {
                "You are an expert at extracting course information from university catalogs. \
                 Extract every course with its full name (including the course code), its \
                 description, its prerequisites and its credit count. Use null for credits \
                 when the catalog does not state them."
            }
            Self::Faculty => {
                "You are an expert at extracting faculty research profiles from university \
                 department pages. Extract each faculty member's name, personal or lab website, \
                 and research interests as a list of short phrases."
            }
        }
    }

    /// JSON schema of the response envelope for this kind
    pub fn json_schema(&self) -> String {
        let schema = match self {
            Self::Events => schemars::schema_for!(RecordEnvelope<EventRecord>),
            Self::Courses => schemars::schema_for!(RecordEnvelope<CourseRecord>),
            Self::Faculty => schemars::schema_for!(RecordEnvelope<FacultyRecord>),
        };
        serde_json::to_string_pretty(&schema).unwrap_or_default()
    }

    /// Parses a backend response object into records of this kind
    pub fn parse_records(&self, value: Value) -> Result<Vec<Record>, ExtractionError> {
        let records = match self {
            Self::Events => decode::<EventRecord>(value)?
                .into_iter()
                .map(Record::Event)
                .collect::<Vec<_>>(),
            Self::Courses => decode::<CourseRecord>(value)?
                .into_iter()
                .map(Record::Course)
                .collect(),
            Self::Faculty => decode::<FacultyRecord>(value)?
                .into_iter()
                .map(Record::Faculty)
                .collect(),
        };

        Ok(records.into_iter().filter(|r| !r.name().trim().is_empty()).collect())
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "event" | "events" => Ok(Self::Events),
            "course" | "courses" => Ok(Self::Courses),
            "faculty" | "research" => Ok(Self::Faculty),
            other => Err(ConfigError::UnknownKind(other.to_string())),
        }
    }
}

/// Response envelope expected from the backend
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct RecordEnvelope<T> {
    #[serde(default, alias = "events", alias = "courses", alias = "faculty", alias = "items")]
    pub records: Vec<T>,
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<Vec<T>, ExtractionError> {
    let envelope = match value {
        Value::Array(items) => RecordEnvelope {
            records: serde_json::from_value(Value::Array(items))
                .map_err(ExtractionError::schema_mismatch)?,
        },
        other => serde_json::from_value::<RecordEnvelope<T>>(other)
            .map_err(ExtractionError::schema_mismatch)?,
    };
    Ok(envelope.records)
}

/// A scheduled campus event
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct EventRecord {
    /// Event title
    #[serde(alias = "event_name")]
    pub name: String,

    /// Date (and time, when shown) as written on the page
    #[serde(default, alias = "event_date", deserialize_with = "lenient_string")]
    pub date: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub location: String,

    /// Link to the event's page
    #[serde(default, alias = "page_url", deserialize_with = "lenient_string")]
    pub source_url: String,
}

/// A catalog course
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct CourseRecord {
    /// Course code followed by its title, as printed in the catalog
    #[serde(alias = "course_name")]
    pub name: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,

    #[serde(default, alias = "prerequisites", deserialize_with = "lenient_string")]
    pub prereqs: String,

    #[serde(default, deserialize_with = "lenient_credits")]
    pub credits: Option<i32>,

    #[serde(default, deserialize_with = "lenient_string")]
    #[schemars(skip)]
    pub source_url: String,
}

/// A faculty research profile
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct FacultyRecord {
    pub name: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub website: String,

    #[serde(default, alias = "research_interest", deserialize_with = "lenient_list")]
    pub research_interests: Vec<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    #[schemars(skip)]
    pub source_url: String,
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => {
            return Err(serde::de::Error::custom(format!(
                "expected a string, got {}",
                other
            )))
        }
    })
}

fn lenient_credits<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i32>, D::Error> {
    let credits = match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_i64().and_then(|c| i32::try_from(c).ok()),
        Some(Value::String(s)) => s
            .split(|c: char| !c.is_ascii_digit() && c != '-')
            .find(|part| !part.is_empty())
            .and_then(|part| part.parse::<i32>().ok()),
        Some(other) => {
            return Err(serde::de::Error::custom(format!(
                "expected credits as a number, got {}",
                other
            )))
        }
    };
    // Catalog scrapers use -1 for "not stated"
    Ok(credits.filter(|c| *c >= 0))
}

fn lenient_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let items = match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) => s.split([',', ';']).map(str::to_string).collect(),
        Some(Value::Array(values)) => values
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Some(other) => {
            return Err(serde::de::Error::custom(format!(
                "expected a list of strings, got {}",
                other
            )))
        }
    };

    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Deduplication key of a record
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NaturalKey {
    pub kind: RecordKind,
    pub parts: Vec<String>,
}

fn key_part(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// One extracted record
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum Record {
    Event(EventRecord),
    Course(CourseRecord),
    Faculty(FacultyRecord),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Event(_) => RecordKind::Events,
            Self::Course(_) => RecordKind::Courses,
            Self::Faculty(_) => RecordKind::Faculty,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Event(e) => &e.name,
            Self::Course(c) => &c.name,
            Self::Faculty(f) => &f.name,
        }
    }

    pub fn source_url(&self) -> &str {
        match self {
            Self::Event(e) => &e.source_url,
            Self::Course(c) => &c.source_url,
            Self::Faculty(f) => &f.source_url,
        }
    }

    fn source_url_mut(&mut self) -> &mut String {
        match self {
            Self::Event(e) => &mut e.source_url,
            Self::Course(c) => &mut c.source_url,
            Self::Faculty(f) => &mut f.source_url,
        }
    }

    pub fn natural_key(&self) -> NaturalKey {
        let parts = match self {
            Self::Event(e) => vec![key_part(&e.name), key_part(&e.date), key_part(&e.location)],
            Self::Course(c) => vec![key_part(&c.name)],
            Self::Faculty(f) => vec![key_part(&f.name), key_part(&f.website)],
        };
        NaturalKey {
            kind: self.kind(),
            parts,
        }
    }

    /// Fills a missing source URL from the page and resolves relative links
    ///
    /// Absolute URLs and values that are not paths (an email address,
    /// "N/A") are kept verbatim.
    pub fn attach_source(&mut self, page_url: &Url) {
        let source = self.source_url_mut();
        *source = match resolve_against(page_url, source) {
            Some(resolved) => resolved,
            None if Url::parse(source.trim()).is_ok() => source.trim().to_string(),
            None => page_url.to_string(),
        };

        if let Self::Faculty(f) = self {
            if let Some(resolved) = resolve_against(page_url, &f.website) {
                f.website = resolved;
            }
        }
    }
}

/// Joins `href` onto `base` when it is a relative path
fn resolve_against(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if Url::parse(href).is_ok() {
        return None;
    }
    if !(href.starts_with('/') || href.starts_with("./") || href.starts_with("../")) {
        return None;
    }
    base.join(href).ok().map(|u| u.to_string())
}
