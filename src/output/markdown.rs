//! Markdown report generation
//!
//! This module renders a human-readable report of one run: run information,
//! counts, a table of the extracted records and the failure list.

use crate::extract::{Record, RecordKind};
use crate::output::aggregate::AggregateResult;
use crate::output::traits::{RunMeta, SinkResult};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Writes the markdown report of a run
///
/// # Arguments
///
/// * `run` - Run metadata
/// * `result` - The run's aggregate
/// * `output_path` - Path where the markdown file should be written
pub fn write_markdown_report(
    run: &RunMeta,
    result: &AggregateResult,
    output_path: &Path,
) -> SinkResult<()> {
    let markdown = format_markdown_report(run, result);

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    tracing::info!("Report written to {}", output_path.display());
    Ok(())
}

/// Escapes a value for use inside a markdown table cell
/// Per-source variant of a configured report path
///
/// `output/report.md` becomes `output/report-faculty-csci.md`.
pub fn report_path_for(base: &Path, source_key: &str) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    let file_name = match base.extension() {
        Some(ext) => format!("{}-{}.{}", stem, source_key, ext.to_string_lossy()),
        None => format!("{}-{}", stem, source_key),
    };
    base.with_file_name(file_name)
}

fn cell(value: &str) -> String {
    value
        .replace('|', "\\|")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn table_header(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Events => "| Event | Date | Location | Source |\n|-------|------|----------|--------|\n",
        RecordKind::Courses => {
            "| Course | Credits | Prerequisites | Source |\n|--------|---------|---------------|--------|\n"
        }
        RecordKind::Faculty => {
            "| Name | Website | Research Interests | Source |\n|------|---------|--------------------|--------|\n"
        }
    }
}

fn table_row(record: &Record) -> String {
    match record {
        Record::Event(e) => format!(
            "| {} | {} | {} | {} |\n",
            cell(&e.name),
            cell(&e.date),
            cell(&e.location),
            cell(&e.source_url)
        ),
        Record::Course(c) => format!(
            "| {} | {} | {} | {} |\n",
            cell(&c.name),
            c.credits.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string()),
            cell(&c.prereqs),
            cell(&c.source_url)
        ),
        Record::Faculty(f) => format!(
            "| {} | {} | {} | {} |\n",
            cell(&f.name),
            cell(&f.website),
            cell(&f.research_interests.join(", ")),
            cell(&f.source_url)
        ),
    }
}

/// Formats the report of a run as markdown
pub fn format_markdown_report(run: &RunMeta, result: &AggregateResult) -> String {
    let mut md = String::new();

    md.push_str("# Campus-Harvest Run Report\n\n");

    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Run ID**: {}\n", run.run_id));
    md.push_str(&format!("- **Source**: {} {}\n", run.kind, run.code));
    md.push_str(&format!("- **Started**: {}\n", run.started_at.to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", run.finished_at.to_rfc3339()));
    md.push_str(&format!(
        "- **Duration**: {:.1} seconds\n",
        run.duration_seconds()
    ));
    md.push_str(&format!("- **Config Hash**: {}\n\n", run.config_hash));

    let counts = &result.counts;
    md.push_str("## Counts\n\n");
    md.push_str("| Metric | Count |\n");
    md.push_str("|--------|-------|\n");
    md.push_str(&format!("| Pages Visited | {} |\n", counts.pages_visited));
    md.push_str(&format!("| Pages Successful | {} |\n", counts.pages_successful));
    md.push_str(&format!("| Extraction Jobs | {} |\n", counts.jobs_submitted));
    md.push_str(&format!("| Records Found | {} |\n", counts.records_found));
    md.push_str(&format!(
        "| Duplicates Dropped | {} |\n",
        counts.duplicates_dropped
    ));
    md.push_str(&format!("| Failures | {} |\n\n", counts.failures));

    if result.is_empty() {
        md.push_str("## Records\n\nNo records were found.\n\n");
    }
    for kind in result.kinds() {
        md.push_str(&format!("## {} ({})\n\n", heading(kind), result.records_of(kind).count()));
        md.push_str(table_header(kind));
        for record in result.records_of(kind) {
            md.push_str(&table_row(record));
        }
        md.push('\n');
    }

    if !result.failures.is_empty() {
        md.push_str("## Failures\n\n");
        for failure in &result.failures {
            let location = if failure.fragment == 0 {
                failure.source_url.clone()
            } else {
                format!("{} (fragment {})", failure.source_url, failure.fragment)
            };
            md.push_str(&format!(
                "- **{}** `{}`: {}\n",
                failure.kind.as_str(),
                location,
                failure.message
            ));
        }
        md.push('\n');
    }

    md.push_str("---\n\n");
    md.push_str(&format!(
        "*Generated by Campus-Harvest v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    md
}

fn heading(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Events => "Events",
        RecordKind::Courses => "Courses",
        RecordKind::Faculty => "Faculty",
    }
}
