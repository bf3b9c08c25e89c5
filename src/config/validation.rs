use crate::config::types::{
    Config, CrawlerConfig, ExtractionConfig, OutputConfig, PrefilterConfig, SinkKind,
    SourceConfig, StabilityConfig, UserAgentConfig,
};
use crate::ConfigError;
use scraper::Selector;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_stability_config(&config.stability)?;
    validate_extraction_config(&config.extraction)?;
    validate_output_config(&config.output)?;

    if config.run.deadline_secs < 1 {
        return Err(ConfigError::Validation(
            "deadline-secs must be >= 1".to_string(),
        ));
    }

    validate_sources(&config.sources)?;
    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max-pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    if config.max_concurrent_fetches < 1 || config.max_concurrent_fetches > 32 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent-fetches must be between 1 and 32, got {}",
            config.max_concurrent_fetches
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler-name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler-name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact-url: {}", e)))?;

    Ok(())
}

fn validate_stability_config(config: &StabilityConfig) -> Result<(), ConfigError> {
    if config.max_iterations < 1 {
        return Err(ConfigError::Validation(
            "stability max-iterations must be >= 1".to_string(),
        ));
    }
    Ok(())
}

fn validate_extraction_config(config: &ExtractionConfig) -> Result<(), ConfigError> {
    validate_http_url(&config.endpoint, "extraction endpoint")?;

    if config.model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "extraction model cannot be empty".to_string(),
        ));
    }

    if config.concurrency_limit < 1 || config.concurrency_limit > 64 {
        return Err(ConfigError::Validation(format!(
            "concurrency-limit must be between 1 and 64, got {}",
            config.concurrency_limit
        )));
    }

    if config.job_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "job-timeout-secs must be >= 1".to_string(),
        ));
    }

    if !(0.0..=2.0).contains(&config.temperature) {
        return Err(ConfigError::Validation(format!(
            "temperature must be between 0.0 and 2.0, got {}",
            config.temperature
        )));
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    match config.sink {
        SinkKind::Csv if config.directory.is_empty() => Err(ConfigError::Validation(
            "output directory cannot be empty for the csv sink".to_string(),
        )),
        SinkKind::Sqlite if config.database_path.is_empty() => Err(ConfigError::Validation(
            "database-path cannot be empty for the sqlite sink".to_string(),
        )),
        _ => Ok(()),
    }
}

fn validate_sources(sources: &[SourceConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for source in sources {
        if source.code.is_empty()
            || !source
                .code
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigError::Validation(format!(
                "Source code '{}' must be non-empty and alphanumeric",
                source.code
            )));
        }

        if !seen.insert((source.kind, source.code.to_uppercase())) {
            return Err(ConfigError::Validation(format!(
                "Duplicate source {} {}",
                source.kind, source.code
            )));
        }

        for pattern in &source.allowed_domains {
            validate_domain_pattern(pattern)?;
        }

        let seed = validate_http_url(&source.seed, "seed")?;

        // Compiles the path patterns as a side effect
        let rules = source.allow_rules()?;
        if !rules.domain_allowed(&seed) {
            return Err(ConfigError::SeedOutsideDomains {
                seed: source.seed.clone(),
            });
        }

        validate_prefilter(&source.prefilter)?;
    }

    Ok(())
}

fn validate_prefilter(config: &PrefilterConfig) -> Result<(), ConfigError> {
    for selector in [&config.primary, &config.fallback].into_iter().flatten() {
        Selector::parse(selector)
            .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {}", selector, e)))?;
    }

    if let Some(delimiter) = &config.delimiter {
        if delimiter.is_empty() {
            return Err(ConfigError::Validation(
                "prefilter delimiter cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_http_url(raw: &str, what: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", what, raw, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            what, raw
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!("{} '{}' has no host", what, raw)));
    }

    Ok(url)
}

/// Validates a domain pattern (supports wildcards)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    let domain = pattern.strip_prefix("*.").unwrap_or(pattern);
    validate_domain_string(domain)
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
        || domain.contains("..")
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' is malformed",
            domain
        )));
    }

    // Allow "localhost" for development servers; everything else needs a dot
    if !domain.contains('.') && domain != "localhost" {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must contain at least one dot (e.g., 'example.edu')",
            domain
        )));
    }

    Ok(())
}
