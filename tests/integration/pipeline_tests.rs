//! Integration tests for the extraction pipeline
//!
//! These tests use wiremock to serve both the university site and the
//! extraction backend, and run full traverse → extract → aggregate → sink
//! cycles end-to-end.

use campus_harvest::config::{load_config_with_hash, Config};
use campus_harvest::crawler::HttpFetcher;
use campus_harvest::extract::testing::MockExtractor;
use campus_harvest::output::{open_sink, write_markdown_report};
use campus_harvest::pipeline::{OverallStatus, Pipeline, RunStatus};
use campus_harvest::storage::SqliteStorage;
use campus_harvest::{ConfigError, HarvestError, RecordKind};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Writes a config pointing at the mock site and backend, then loads it
fn load_test_config(site: &str, backend: &str, out: &TempDir, sink: &str) -> (Config, String) {
    let content = format!(
        r#"
[crawler]
max-depth = 1
max-pages = 20
politeness-delay-ms = 0
request-timeout-secs = 5

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"

[extraction]
endpoint = "{backend}"
model = "test-model"
concurrency-limit = 3
job-timeout-secs = 5

[output]
sink = "{sink}"
directory = "{dir}"
database-path = "{dir}/harvest.db"

[[source]]
kind = "events"
code = "ALL"
seed = "{site}/events"
allowed-domains = ["127.0.0.1"]

[[source]]
kind = "courses"
code = "CSCI"
seed = "{site}/catalog/csci"
allowed-domains = ["127.0.0.1"]
patterns = ["^/catalog/"]
"#,
        backend = backend,
        site = site,
        sink = sink,
        dir = out.path().display(),
    );

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    load_config_with_hash(file.path()).unwrap()
}

async fn mount_page(server: &MockServer, route: &str, html: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html"))
        .mount(server)
        .await;
}

/// Backend answer for any prompt containing `marker`
async fn mount_extraction(server: &MockServer, marker: &str, records: serde_json::Value) {
    let body = json!({
        "model": "test-model",
        "response": json!({ "records": records }).to_string(),
        "done": true,
    });
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_string_contains(marker))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// The prompt header of one page's job, as it appears in the JSON request body
fn page_prompt(site: &MockServer, route: &str) -> String {
    format!("Source URL: {}{}\\n", site.uri(), route)
}

fn card(name: &str) -> String {
    format!(
        r#"<div class="MuiCard-root"><h3>{}</h3><p>Featured campus event</p></div>"#,
        name
    )
}

async fn mount_events_site(site: &MockServer) {
    mount_page(
        site,
        "/events",
        format!(
            r#"<html><body><div id="event-discovery-list">{}{}</div>
            <a href="/events/page2">More events</a></body></html>"#,
            card("Jazz Night"),
            card("Career Fair")
        ),
    )
    .await;
    mount_page(
        site,
        "/events/page2",
        format!(
            r#"<html><body><div id="event-discovery-list">{}{}</div></body></html>"#,
            card("Jazz Night"),
            card("Poetry Slam")
        ),
    )
    .await;
}

#[tokio::test]
async fn test_events_run_deduplicates_and_writes_csv() {
    let site = MockServer::start().await;
    let backend = MockServer::start().await;
    mount_events_site(&site).await;

    mount_extraction(
        &backend,
        "Jazz Night",
        json!([{ "event_name": "Jazz Night", "event_date": "May 3", "location": "PAC" }]),
    )
    .await;
    mount_extraction(
        &backend,
        "Career Fair",
        json!([{ "name": "Career Fair", "date": "May 5", "location": "Viking Union" }]),
    )
    .await;
    mount_extraction(
        &backend,
        "Poetry Slam",
        json!([{ "name": "Poetry Slam", "date": "May 9", "location": "Library" }]),
    )
    .await;

    let out = TempDir::new().unwrap();
    let (config, hash) = load_test_config(&site.uri(), &backend.uri(), &out, "csv");
    let pipeline = Pipeline::new(config.clone(), hash).unwrap();

    let report = pipeline.run(RecordKind::Events, "ALL").await.unwrap();

    assert_eq!(report.status, RunStatus::Found);
    assert_eq!(report.traversal.pages_visited, 2);
    assert_eq!(report.extraction.submitted, 4);
    assert_eq!(report.count(), 3);
    assert_eq!(report.result.counts.duplicates_dropped, 1);
    assert!(report.result.failures.is_empty());

    let mut sink = open_sink(&config.output).unwrap();
    assert_eq!(sink.write(&report.meta, &report.result).unwrap(), 3);

    let csv = std::fs::read_to_string(out.path().join("all").join("events.csv")).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "name,date,location,source_url");
    assert_eq!(lines.len(), 4);
    // The duplicate keeps the copy from the lexically first page
    assert_eq!(
        lines[2],
        format!("Jazz Night,May 3,PAC,{}/events", site.uri())
    );

    let report_path = out.path().join("events.md");
    write_markdown_report(&report.meta, &report.result, &report_path).unwrap();
    let markdown = std::fs::read_to_string(report_path).unwrap();
    assert!(markdown.contains("## Events (3)"));
}

#[tokio::test]
async fn test_partial_failure_is_kept_in_sqlite() {
    let site = MockServer::start().await;
    let backend = MockServer::start().await;

    mount_page(
        &site,
        "/catalog/csci",
        r#"<html><body><ul>
            <li class="acalog-course">CSCI 141 Computer Programming I</li>
            </ul>
            <a href="/catalog/csci/2">Next</a>
            <a href="/catalog/csci/3">Last</a>
            <a href="/about">About</a>
            </body></html>"#
            .to_string(),
    )
    .await;
    mount_page(
        &site,
        "/catalog/csci/2",
        r#"<html><body><ul><li class="acalog-course">CSCI 247 Computer Systems</li></ul></body></html>"#
            .to_string(),
    )
    .await;
    mount_page(
        &site,
        "/catalog/csci/3",
        r#"<html><body><ul><li class="acalog-course">CSCI 301 Formal Languages</li></ul></body></html>"#
            .to_string(),
    )
    .await;

    mount_extraction(
        &backend,
        &page_prompt(&site, "/catalog/csci"),
        json!([{ "course_name": "CSCI 141 Computer Programming I", "credits": "4 credits" }]),
    )
    .await;
    mount_extraction(
        &backend,
        &page_prompt(&site, "/catalog/csci/2"),
        json!([{ "name": "CSCI 247 Computer Systems", "prerequisites": "CSCI 141", "credits": 5 }]),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_string_contains(page_prompt(&site, "/catalog/csci/3")))
        .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
        .mount(&backend)
        .await;

    let out = TempDir::new().unwrap();
    let (config, hash) = load_test_config(&site.uri(), &backend.uri(), &out, "sqlite");
    let pipeline = Pipeline::new(config.clone(), hash.clone()).unwrap();

    let report = pipeline.run(RecordKind::Courses, "csci").await.unwrap();

    // /about is off-pattern and never visited
    assert_eq!(report.traversal.pages_visited, 3);
    assert_eq!(report.traversal.pattern_rejected, 1);
    assert_eq!(report.count(), 2);
    assert_eq!(report.result.failures.len(), 1);
    assert_eq!(
        report.result.failures[0].source_url,
        format!("{}/catalog/csci/3", site.uri())
    );

    {
        let mut sink = open_sink(&config.output).unwrap();
        sink.write(&report.meta, &report.result).unwrap();
    }

    let storage = SqliteStorage::new(&out.path().join("harvest.db")).unwrap();
    assert_eq!(storage.count_records(RecordKind::Courses).unwrap(), 2);
    assert_eq!(storage.count_failures(&report.meta.run_id).unwrap(), 1);
    let run = storage.get_run(&report.meta.run_id).unwrap().unwrap();
    assert_eq!(run.config_hash, hash);
    assert_eq!(run.records_found, 2);
}

#[tokio::test]
async fn test_unknown_code_makes_no_requests() {
    let site = MockServer::start().await;
    let backend = MockServer::start().await;

    let out = TempDir::new().unwrap();
    let (config, hash) = load_test_config(&site.uri(), &backend.uri(), &out, "csv");
    let pipeline = Pipeline::new(config, hash).unwrap();

    let err = pipeline.run(RecordKind::Courses, "NOPE").await.unwrap_err();

    assert!(matches!(
        err,
        HarvestError::Config(ConfigError::UnknownTarget { .. })
    ));
    assert_eq!(err.status_code(), 400);
    assert!(site.received_requests().await.unwrap().is_empty());
    assert!(backend.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_extraction_concurrency_never_exceeds_limit() {
    let site = MockServer::start().await;
    let cards: String = (0..9)
        .map(|i| format!(r#"<div class="MuiCard-root"><p>record: Event {}</p></div>"#, i))
        .collect();
    mount_page(
        &site,
        "/events",
        format!("<html><body>{}</body></html>", cards),
    )
    .await;

    let out = TempDir::new().unwrap();
    let (config, hash) = load_test_config(&site.uri(), "http://127.0.0.1:9", &out, "csv");
    let fetcher = HttpFetcher::new(&config.crawler, &config.user_agent).unwrap();
    let extractor = Arc::new(MockExtractor::new().with_delay(Duration::from_millis(50)));
    let pipeline =
        Pipeline::with_components(config, hash, Arc::new(fetcher), extractor.clone());

    let report = pipeline.run(RecordKind::Events, "ALL").await.unwrap();

    assert_eq!(report.extraction.submitted, 9);
    assert_eq!(report.count(), 9);
    assert_eq!(extractor.high_water(), 3);
}

#[tokio::test]
async fn test_run_all_reports_per_source() {
    let site = MockServer::start().await;
    let backend = MockServer::start().await;
    mount_events_site(&site).await;
    mount_extraction(
        &backend,
        "Jazz Night",
        json!([{ "name": "Jazz Night", "date": "May 3", "location": "PAC" }]),
    )
    .await;

    let out = TempDir::new().unwrap();
    let (config, hash) = load_test_config(&site.uri(), &backend.uri(), &out, "csv");
    let pipeline = Pipeline::new(config, hash).unwrap();

    let summary = pipeline.run_all().await;

    assert_eq!(summary.successful, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.overall(), OverallStatus::Success);
    assert_eq!(summary.sources[0].source, "events-all");
    assert_eq!(summary.sources[0].count, 1);
    // The catalog seed is not served, so the courses run ends empty
    assert_eq!(summary.sources[1].status_code, 404);
}
