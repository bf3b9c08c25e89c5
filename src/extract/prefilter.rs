//! Content prefilter
//!
//! Cuts a page body down to the markup that plausibly holds records before
//! it is sent to the extraction backend. The steps are tried in order:
//!
//! - **Primary**: the record container or repeated record block selector
//! - **Fallback**: a looser container selector
//! - **Delimiter**: everything after the first occurrence of a marker
//! - **Passthrough**: the full body, with a warning
//!
//! This is a size reduction only. The backend has to cope with noisy input
//! whichever strategy was used.

use crate::config::{InputFormat, PrefilterConfig, SourceConfig};
use crate::crawler::{html_to_markdown, PageSnapshot};
use crate::extract::job::ExtractionJob;
use crate::extract::schema::RecordKind;
use crate::ConfigError;
use scraper::{ElementRef, Html, Selector};

/// Which step of the prefilter produced the fragments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefilterStrategy {
    Primary,
    Fallback,
    Delimiter,
    Passthrough,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefiltered {
    pub fragments: Vec<String>,
    pub strategy: PrefilterStrategy,
}

/// Resolved structural hints for one source
#[derive(Debug, Clone)]
pub struct PrefilterRules {
    primary: Option<Selector>,
    fallback: Option<Selector>,
    delimiter: Option<String>,
    split: bool,
}

struct KindDefaults {
    primary: &'static str,
    fallback: &'static str,
    split: bool,
}

fn kind_defaults(kind: RecordKind) -> KindDefaults {
    match kind {
        // One card per event on the events listing
        RecordKind::Events => KindDefaults {
            primary: "div.MuiCard-root",
            fallback: "#event-discovery-list",
            split: true,
        },
        RecordKind::Courses => KindDefaults {
            primary: "li.acalog-course",
            fallback: "td.block_content",
            split: false,
        },
        RecordKind::Faculty => KindDefaults {
            primary: "main",
            fallback: "article",
            split: false,
        },
    }
}

/// Markup of a matched record block, including the link wrapping it
///
/// Listing cards are often the child of an `<a href>` pointing at the
/// record's own page, which the backend needs to fill `source_url`.
fn record_markup(element: ElementRef<'_>) -> String {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| ancestor.value().name() == "a" && ancestor.value().attr("href").is_some())
        .unwrap_or(element)
        .html()
}

fn parse_selector(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector)
        .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {}", selector, e)))
}

impl PrefilterRules {
    pub fn defaults_for(kind: RecordKind) -> Self {
        let defaults = kind_defaults(kind);
        Self {
            primary: Selector::parse(defaults.primary).ok(),
            fallback: Selector::parse(defaults.fallback).ok(),
            delimiter: None,
            split: defaults.split,
        }
    }

    /// Applies configured hints over the defaults of `kind`
    pub fn from_config(kind: RecordKind, config: &PrefilterConfig) -> Result<Self, ConfigError> {
        let mut rules = Self::defaults_for(kind);
        if let Some(primary) = &config.primary {
            rules.primary = Some(parse_selector(primary)?);
        }
        if let Some(fallback) = &config.fallback {
            rules.fallback = Some(parse_selector(fallback)?);
        }
        if let Some(delimiter) = &config.delimiter {
            rules.delimiter = Some(delimiter.clone());
        }
        if let Some(split) = config.split {
            rules.split = split;
        }
        Ok(rules)
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    pub fn with_split(mut self, split: bool) -> Self {
        self.split = split;
        self
    }

    pub fn split(&self) -> bool {
        self.split
    }
}

#[derive(Debug, Clone)]
pub struct ContentPrefilter {
    kind: RecordKind,
    rules: PrefilterRules,
    format: InputFormat,
}

impl ContentPrefilter {
    pub fn new(kind: RecordKind, rules: PrefilterRules, format: InputFormat) -> Self {
        Self {
            kind,
            rules,
            format,
        }
    }

    pub fn for_source(source: &SourceConfig) -> Result<Self, ConfigError> {
        let rules = PrefilterRules::from_config(source.kind, &source.prefilter)?;
        Ok(Self::new(source.kind, rules, source.input_format))
    }

    /// Reduces a raw HTML body to record-bearing fragments
    ///
    /// `markdown` is the fetcher's rendering of the same page, used for the
    /// delimiter and passthrough steps when the input format is markdown.
    /// When absent it is rendered from `html`.
    pub fn filter(&self, html: &str, markdown: Option<&str>) -> Prefiltered {
        let document = Html::parse_document(html);

        for (selector, strategy) in [
            (&self.rules.primary, PrefilterStrategy::Primary),
            (&self.rules.fallback, PrefilterStrategy::Fallback),
        ] {
            let Some(selector) = selector else {
                continue;
            };

            let mut matches: Vec<String> = document
                .select(selector)
                .filter(|element| !element.text().collect::<String>().trim().is_empty())
                .map(record_markup)
                .collect();
            matches.dedup();
            if matches.is_empty() {
                continue;
            }

            if strategy == PrefilterStrategy::Fallback {
                tracing::warn!(
                    "Primary {} selector matched nothing, using fallback container",
                    self.kind
                );
            }

            let fragments = if self.rules.split {
                matches
            } else {
                vec![matches.join("\n")]
            };
            return self.finish(fragments, strategy);
        }

        let body = match self.format {
            InputFormat::Html => html.to_string(),
            InputFormat::Markdown => markdown
                .map(str::to_string)
                .unwrap_or_else(|| html_to_markdown(html)),
        };

        if let Some(delimiter) = &self.rules.delimiter {
            if let Some(index) = body.find(delimiter.as_str()) {
                let rest = body[index + delimiter.len()..].trim().to_string();
                return Prefiltered {
                    fragments: vec![rest],
                    strategy: PrefilterStrategy::Delimiter,
                };
            }
        }

        tracing::warn!(
            "Prefilter found no {} container, passing the full body through ({} bytes)",
            self.kind,
            body.len()
        );
        Prefiltered {
            fragments: vec![body],
            strategy: PrefilterStrategy::Passthrough,
        }
    }

    fn finish(&self, fragments: Vec<String>, strategy: PrefilterStrategy) -> Prefiltered {
        let fragments = match self.format {
            InputFormat::Html => fragments,
            InputFormat::Markdown => fragments.iter().map(|f| html_to_markdown(f)).collect(),
        };
        Prefiltered {
            fragments,
            strategy,
        }
    }

    /// Turns a successful snapshot into extraction jobs, one per fragment
    pub fn jobs_for(&self, snapshot: &PageSnapshot) -> Vec<ExtractionJob> {
        if !snapshot.success {
            return Vec::new();
        }

        let prefiltered = self.filter(&snapshot.html, Some(&snapshot.markdown));
        tracing::debug!(
            "Prefiltered {} into {} fragment(s) via {:?}",
            snapshot.url,
            prefiltered.fragments.len(),
            prefiltered.strategy
        );

        prefiltered
            .fragments
            .into_iter()
            .enumerate()
            .map(|(index, body)| {
                ExtractionJob::new(snapshot.url.clone(), body, self.kind, index)
            })
            .collect()
    }
}
