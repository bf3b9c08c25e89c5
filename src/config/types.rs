use crate::extract::RecordKind;
use crate::url::AllowRules;
use crate::ConfigError;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Campus-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub stability: StabilityConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(rename = "source", default)]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Resolves an extraction target by kind and department code
    ///
    /// Codes compare case-insensitively. An unknown pair is a caller error
    /// and is never retried.
    pub fn find_source(&self, kind: RecordKind, code: &str) -> Result<&SourceConfig, ConfigError> {
        self.sources
            .iter()
            .find(|s| s.kind == kind && s.code.eq_ignore_ascii_case(code.trim()))
            .ok_or_else(|| ConfigError::UnknownTarget {
                kind,
                code: code.to_string(),
            })
    }

    /// All configured sources of one kind, in file order
    pub fn sources_of(&self, kind: RecordKind) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(move |s| s.kind == kind)
    }
}

/// Traversal policy for the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Traversal {
    #[default]
    Bfs,
    Dfs,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Maximum link depth from the seed page
    #[serde(rename = "max-depth")]
    pub max_depth: u32,

    /// Maximum number of admitted pages per run, seed included
    #[serde(rename = "max-pages")]
    pub max_pages: usize,

    /// Breadth-first or depth-first expansion
    pub traversal: Traversal,

    /// Fixed delay between fetch batches (milliseconds)
    #[serde(rename = "politeness-delay-ms")]
    pub politeness_delay_ms: u64,

    /// Maximum number of concurrent page fetches within one batch
    #[serde(rename = "max-concurrent-fetches")]
    pub max_concurrent_fetches: usize,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs")]
    pub request_timeout_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: 1,
            max_pages: 50,
            traversal: Traversal::Bfs,
            politeness_delay_ms: 1000,
            max_concurrent_fetches: 4,
            request_timeout_secs: 30,
        }
    }
}

impl CrawlerConfig {
    pub fn politeness_delay(&self) -> Duration {
        Duration::from_millis(self.politeness_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "CampusHarvest".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.edu/campus-harvest".to_string(),
        }
    }
}

impl UserAgentConfig {
    /// Format: CrawlerName/Version (+ContactURL)
    pub fn user_agent(&self) -> String {
        format!(
            "{}/{} (+{})",
            self.crawler_name, self.crawler_version, self.contact_url
        )
    }
}

/// Measurement used to decide that a dynamic page stopped growing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StabilitySignal {
    #[default]
    HtmlLength,
    MarkdownLength,
}

/// Stability probe configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// Wait between triggering actions and measuring (milliseconds)
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,

    /// Upper bound on trigger/measure cycles
    #[serde(rename = "max-iterations")]
    pub max_iterations: u32,

    pub signal: StabilitySignal,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            max_iterations: 20,
            signal: StabilitySignal::HtmlLength,
        }
    }
}

impl StabilityConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Extraction backend configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Base URL of an Ollama-compatible server
    pub endpoint: String,

    pub model: String,

    /// Maximum number of extraction calls in flight
    #[serde(rename = "concurrency-limit")]
    pub concurrency_limit: usize,

    /// Per-job timeout (seconds)
    #[serde(rename = "job-timeout-secs")]
    pub job_timeout_secs: u64,

    pub temperature: f32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3.1".to_string(),
            concurrency_limit: 5,
            job_timeout_secs: 120,
            temperature: 0.1,
        }
    }
}

impl ExtractionConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

/// Whole-run wall-clock budget
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    #[serde(rename = "deadline-secs")]
    pub deadline_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self { deadline_secs: 300 }
    }
}

impl RunConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

/// Which persistence sink receives the aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    Csv,
    Sqlite,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub sink: SinkKind,

    /// Directory receiving events.csv, courses.csv and faculty.csv
    pub directory: String,

    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Optional markdown report written after each run
    #[serde(rename = "report-path")]
    pub report_path: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::Csv,
            directory: "./output".to_string(),
            database_path: "./campus-harvest.db".to_string(),
            report_path: None,
        }
    }
}

/// Body representation handed to the extractor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    Html,
    #[default]
    Markdown,
}

/// Which pages of a source go through the stability probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StabilizeScope {
    #[default]
    #[serde(rename = "none")]
    Off,
    Seed,
    All,
}

impl StabilizeScope {
    pub fn applies_at(&self, depth: u32) -> bool {
        match self {
            Self::Off => false,
            Self::Seed => depth == 0,
            Self::All => true,
        }
    }
}

/// Client-side action run against a live session without reloading
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum TriggerAction {
    /// Scroll to the bottom of the document
    ScrollToBottom,
    /// Click the first button whose text contains the label
    ClickButton { label: String },
    /// Arbitrary script evaluated in the page
    Script { code: String },
}

impl TriggerAction {
    /// Script form of the action, for browser-backed sessions
    pub fn to_script(&self) -> String {
        match self {
            Self::ScrollToBottom => "window.scrollTo(0, document.body.scrollHeight);".to_string(),
            Self::ClickButton { label } => format!(
                "Array.from(document.querySelectorAll('button')).find(b => b.textContent.includes({:?}))?.click();",
                label
            ),
            Self::Script { code } => code.clone(),
        }
    }
}

/// Structural hints for the content prefilter
///
/// Unset fields fall back to the defaults of the source's record kind.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PrefilterConfig {
    /// CSS selector for the record container or repeated record block
    pub primary: Option<String>,

    /// Looser selector tried when the primary one matches nothing
    pub fallback: Option<String>,

    /// Marker string; content after its first occurrence is kept
    pub delimiter: Option<String>,

    /// Emit one fragment per matched element instead of one joined body
    pub split: Option<bool>,
}

/// One extraction target: a record kind and department code with its seed
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub kind: RecordKind,

    /// Department or category code (e.g. "CSCI", "ALL")
    pub code: String,

    pub seed: String,

    /// Domain patterns; "*.example.edu" matches the domain and subdomains
    #[serde(rename = "allowed-domains", default)]
    pub allowed_domains: Vec<String>,

    /// Regular expressions matched against discovered link paths
    #[serde(default)]
    pub patterns: Vec<String>,

    #[serde(rename = "max-depth")]
    pub max_depth: Option<u32>,

    #[serde(rename = "max-pages")]
    pub max_pages: Option<usize>,

    #[serde(rename = "input-format", default)]
    pub input_format: InputFormat,

    #[serde(default)]
    pub stabilize: StabilizeScope,

    #[serde(default)]
    pub triggers: Vec<TriggerAction>,

    #[serde(default)]
    pub prefilter: PrefilterConfig,
}

impl SourceConfig {
    /// Stable identifier used in run ids and logs, e.g. "courses-csci"
    pub fn key(&self) -> String {
        format!("{}-{}", self.kind, self.code.to_lowercase())
    }

    /// Builds the allow rules for this source
    pub fn allow_rules(&self) -> Result<AllowRules, ConfigError> {
        AllowRules::new(&self.allowed_domains, &self.patterns)
    }

    pub fn effective_max_depth(&self, crawler: &CrawlerConfig) -> u32 {
        self.max_depth.unwrap_or(crawler.max_depth)
    }

    pub fn effective_max_pages(&self, crawler: &CrawlerConfig) -> usize {
        self.max_pages.unwrap_or(crawler.max_pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Config {
        toml::from_str(content).unwrap()
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = parse(
            r#"
[[source]]
kind = "events"
code = "ALL"
seed = "https://events.example.edu/"
"#,
        );

        assert_eq!(config.crawler.max_depth, 1);
        assert_eq!(config.crawler.traversal, Traversal::Bfs);
        assert_eq!(config.extraction.concurrency_limit, 5);
        assert_eq!(config.run.deadline_secs, 300);
        assert_eq!(config.output.sink, SinkKind::Csv);
        assert_eq!(config.sources[0].input_format, InputFormat::Markdown);
        assert_eq!(config.sources[0].stabilize, StabilizeScope::Off);
    }

    #[test]
    fn test_trigger_actions_parse() {
        let config = parse(
            r#"
[[source]]
kind = "events"
code = "ALL"
seed = "https://events.example.edu/"
stabilize = "seed"
triggers = [
    { action = "scroll-to-bottom" },
    { action = "click-button", label = "Load More" },
]
"#,
        );

        let source = &config.sources[0];
        assert_eq!(source.stabilize, StabilizeScope::Seed);
        assert_eq!(
            source.triggers,
            vec![
                TriggerAction::ScrollToBottom,
                TriggerAction::ClickButton {
                    label: "Load More".to_string()
                }
            ]
        );
        assert!(source.triggers[1].to_script().contains("Load More"));
    }

    #[test]
    fn test_find_source_case_insensitive() {
        let config = parse(
            r#"
[[source]]
kind = "courses"
code = "CSCI"
seed = "https://catalog.example.edu/csci"
"#,
        );

        assert!(config.find_source(RecordKind::Courses, "csci").is_ok());
        assert!(config.find_source(RecordKind::Faculty, "CSCI").is_err());
        assert!(matches!(
            config.find_source(RecordKind::Courses, "MATH"),
            Err(ConfigError::UnknownTarget { .. })
        ));
    }

    #[test]
    fn test_stabilize_scope() {
        assert!(!StabilizeScope::Off.applies_at(0));
        assert!(StabilizeScope::Seed.applies_at(0));
        assert!(!StabilizeScope::Seed.applies_at(1));
        assert!(StabilizeScope::All.applies_at(3));
    }

    #[test]
    fn test_user_agent_format() {
        let ua = UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.edu/bot".to_string(),
        };
        assert_eq!(ua.user_agent(), "TestBot/1.0 (+https://example.edu/bot)");
    }

    #[test]
    fn test_source_overrides() {
        let config = parse(
            r#"
[crawler]
max-depth = 2
max-pages = 20

[[source]]
kind = "faculty"
code = "BIO"
seed = "https://bio.example.edu/people"
max-pages = 5
"#,
        );

        let source = &config.sources[0];
        assert_eq!(source.effective_max_depth(&config.crawler), 2);
        assert_eq!(source.effective_max_pages(&config.crawler), 5);
        assert_eq!(source.key(), "faculty-bio");
    }
}
