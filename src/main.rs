//! Campus-Harvest main entry point
//!
//! This is the command-line interface for the Campus-Harvest extraction pipeline.

use anyhow::Context;
use campus_harvest::config::{load_config_with_hash, Config, SinkKind};
use campus_harvest::extract::OllamaExtractor;
use campus_harvest::output::{
    open_sink, print_statistics, report_path_for, write_markdown_report, RunStatistics,
};
use campus_harvest::pipeline::{BatchSummary, Pipeline, RunReport};
use campus_harvest::RecordKind;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Campus-Harvest: crawl university listing pages and extract structured records
///
/// Campus-Harvest walks department pages for events, course catalogs and
/// faculty directories, hands the record-bearing markup to a language
/// model backend and writes the deduplicated records to CSV or SQLite.
#[derive(Parser, Debug)]
#[command(name = "campus-harvest")]
#[command(version)]
#[command(about = "Crawl-then-extract pipeline for university web pages", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    /// Override the configured output sink
    #[arg(long, value_enum, global = true)]
    sink: Option<SinkArg>,

    /// Override the per-run deadline, in seconds
    #[arg(long, value_name = "SECS", global = true)]
    deadline: Option<u64>,

    /// Print run reports as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Run stabilized pages in headless Chrome (requires the `browser` feature)
    #[arg(long, global = true)]
    browser: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract one configured source
    Extract {
        /// Record kind: events, courses or faculty
        kind: RecordKind,

        /// Department or category code
        #[arg(default_value = "ALL")]
        code: String,
    },

    /// Extract every configured source
    All,

    /// List the configured sources
    Sources,

    /// Validate the config and check the extraction backend
    Check,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SinkArg {
    Csv,
    Sqlite,
}

impl From<SinkArg> for SinkKind {
    fn from(arg: SinkArg) -> Self {
        match arg {
            SinkArg::Csv => SinkKind::Csv,
            SinkArg::Sqlite => SinkKind::Sqlite,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Some(sink) = cli.sink {
        config.output.sink = sink.into();
    }

    match cli.command {
        Command::Sources => {
            handle_sources(&config);
            Ok(ExitCode::SUCCESS)
        }
        Command::Check => handle_check(&config).await,
        Command::Extract { kind, code } => {
            let pipeline = build_pipeline(config, config_hash, cli.deadline, cli.browser).await?;
            handle_extract(&pipeline, kind, &code, cli.json, cli.quiet).await
        }
        Command::All => {
            let pipeline = build_pipeline(config, config_hash, cli.deadline, cli.browser).await?;
            handle_all(&pipeline, cli.json, cli.quiet).await
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("campus_harvest=info,warn"),
            1 => EnvFilter::new("campus_harvest=debug,info"),
            2 => EnvFilter::new("campus_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

async fn build_pipeline(
    config: Config,
    config_hash: String,
    deadline: Option<u64>,
    browser: bool,
) -> anyhow::Result<Pipeline> {
    let pipeline = if browser {
        browser_pipeline(config, config_hash).await?
    } else {
        Pipeline::new(config, config_hash).context("Failed to build HTTP clients")?
    };
    Ok(match deadline {
        Some(secs) => pipeline.with_deadline(Duration::from_secs(secs.max(1))),
        None => pipeline,
    })
}

#[cfg(feature = "browser")]
async fn browser_pipeline(config: Config, config_hash: String) -> anyhow::Result<Pipeline> {
    use campus_harvest::crawler::BrowserFetcher;
    use std::sync::Arc;

    let fetcher = BrowserFetcher::launch(&config.crawler, &config.user_agent)
        .await
        .context("Failed to start headless browser")?;
    Ok(Pipeline::with_fetcher(config, config_hash, Arc::new(fetcher))?)
}

#[cfg(not(feature = "browser"))]
async fn browser_pipeline(_config: Config, _config_hash: String) -> anyhow::Result<Pipeline> {
    anyhow::bail!("--browser needs campus-harvest built with the `browser` feature")
}

/// Handles the `sources` command: lists what can be extracted
fn handle_sources(config: &Config) {
    println!("=== Configured Sources ({}) ===\n", config.sources.len());

    for kind in RecordKind::ALL {
        let sources: Vec<_> = config.sources_of(kind).collect();
        if sources.is_empty() {
            continue;
        }
        println!("{}:", kind);
        for source in sources {
            println!(
                "  - {} -> {} (stabilize: {:?}, format: {:?})",
                source.code, source.seed, source.stabilize, source.input_format
            );
        }
        println!();
    }
}

/// Handles the `check` command: config is already valid, ping the backend
async fn handle_check(config: &Config) -> anyhow::Result<ExitCode> {
    println!("=== Campus-Harvest Check ===\n");

    println!("Crawler Configuration:");
    println!("  Max depth: {}", config.crawler.max_depth);
    println!("  Max pages: {}", config.crawler.max_pages);
    println!("  Traversal: {:?}", config.crawler.traversal);
    println!("  Politeness delay: {}ms", config.crawler.politeness_delay_ms);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.user_agent());

    println!("\nExtraction:");
    println!("  Endpoint: {}", config.extraction.endpoint);
    println!("  Model: {}", config.extraction.model);
    println!("  Concurrency limit: {}", config.extraction.concurrency_limit);
    println!("  Job timeout: {}s", config.extraction.job_timeout_secs);
    println!("  Run deadline: {}s", config.run.deadline_secs);

    println!("\nOutput:");
    match config.output.sink {
        SinkKind::Csv => println!("  CSV directory: {}", config.output.directory),
        SinkKind::Sqlite => println!("  Database: {}", config.output.database_path),
    }

    println!("\n✓ Configuration is valid ({} sources)", config.sources.len());

    let extractor = OllamaExtractor::new(&config.extraction, &config.user_agent)
        .context("Failed to build extraction client")?;
    if extractor.health_check().await {
        println!("✓ Extraction backend is reachable");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("✗ Extraction backend at {} is not reachable", config.extraction.endpoint);
        Ok(ExitCode::FAILURE)
    }
}

/// Writes a report through the configured sink and the optional markdown report
///
/// With `per_source` the markdown file name is suffixed with the source key.
fn persist(config: &Config, report: &RunReport, per_source: bool) -> anyhow::Result<usize> {
    let mut sink = open_sink(&config.output)?;
    let written = sink
        .write(&report.meta, &report.result)
        .with_context(|| format!("Failed to write {} output", sink.name()))?;

    if let Some(path) = &config.output.report_path {
        let path = if per_source {
            report_path_for(Path::new(path), &report.meta.source_key)
        } else {
            PathBuf::from(path)
        };
        write_markdown_report(&report.meta, &report.result, &path)?;
    }
    Ok(written)
}

fn print_report(report: &RunReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&report.to_json())?);
    } else {
        print_statistics(&report.meta.source_key, &RunStatistics::from_result(&report.result));
    }
    Ok(())
}

/// Handles the `extract` command
async fn handle_extract(
    pipeline: &Pipeline,
    kind: RecordKind,
    code: &str,
    json: bool,
    quiet: bool,
) -> anyhow::Result<ExitCode> {
    let report = match pipeline.run(kind, code).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Extraction failed: {}", e);
            eprintln!("[{}] {}", e.status_code(), e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let written = persist(pipeline.config(), &report, false)?;
    if !quiet || json {
        print_report(&report, json)?;
    }

    if report.count() == 0 {
        println!("[{}] No {} found for {}", report.status_code(), kind, code);
    } else {
        println!(
            "[{}] Extracted {} {} for {} ({} written)",
            report.status_code(),
            report.count(),
            kind,
            code,
            written
        );
    }
    Ok(ExitCode::SUCCESS)
}

/// Handles the `all` command
async fn handle_all(pipeline: &Pipeline, json: bool, quiet: bool) -> anyhow::Result<ExitCode> {
    let summary = pipeline.run_all().await;

    for report in &summary.reports {
        persist(pipeline.config(), report, true)?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&summary.to_json())?);
    } else if !quiet {
        print_batch_summary(&summary);
    }

    Ok(if summary.successful == 0 && summary.failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn print_batch_summary(summary: &BatchSummary) {
    println!("=== Extraction Summary ===\n");

    for source in &summary.sources {
        match &source.error {
            Some(error) => println!("  ✗ {} [{}]: {}", source.source, source.status_code, error),
            None => println!(
                "  ✓ {} [{}]: {} record(s)",
                source.source, source.status_code, source.count
            ),
        }
    }

    println!();
    println!(
        "Successful: {}, Failed: {}, Overall: {:?}",
        summary.successful,
        summary.failed,
        summary.overall()
    );
}
