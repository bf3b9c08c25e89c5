//! HTML parser for links, titles, and markdown rendering
//!
//! This module handles parsing page content to extract:
//! - Links to follow (from `<a>` tags and canonical links)
//! - Links embedded in already rendered markdown (`[text](url)`)
//! - Page title
//! - A markdown rendering of the page, used as extraction input

use htmd::HtmlToMarkdown;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;
use url::Url;

/// Extracted information from an HTML page
#[derive(Debug, Clone)]
pub struct ParsedPage {
    /// The page title (from `<title>` tag)
    pub title: Option<String>,

    /// All links found on the page (absolute URLs, document order)
    pub links: Vec<Url>,
}

/// Parses HTML content and extracts links and metadata
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags anywhere in the document
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links
/// - Data URIs and fragment-only anchors
///
/// Relative links are resolved against `base_url`, the originating page.
pub fn parse_html(html: &str, base_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);

    ParsedPage {
        title: extract_title(&document),
        links: extract_links(&document, base_url),
    }
}

fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<Url> {
    let mut links = Vec::new();

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }

            if let Some(absolute_url) = element
                .value()
                .attr("href")
                .and_then(|href| resolve_link(href, base_url))
            {
                links.push(absolute_url);
            }
        }
    }

    if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(absolute_url) = element
                .value()
                .attr("href")
                .and_then(|href| resolve_link(href, base_url))
            {
                links.push(absolute_url);
            }
        }
    }

    links
}

/// Resolves a link href to an absolute HTTP(S) URL without fragment
///
/// Returns None for special schemes, fragment-only anchors and hrefs that
/// do not resolve.
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let mut absolute_url = base_url.join(href).ok()?;
    if absolute_url.scheme() != "http" && absolute_url.scheme() != "https" {
        return None;
    }
    absolute_url.set_fragment(None);
    Some(absolute_url)
}

fn markdown_link_pattern() -> Option<&'static Regex> {
    static LINK: OnceLock<Option<Regex>> = OnceLock::new();
    LINK.get_or_init(|| Regex::new(r"(!?)\[[^\]]*\]\(\s*<?([^)\s>]+)>?(?:\s+[^)]*)?\)").ok())
        .as_ref()
}

/// Extracts `[text](url)` links from rendered markdown
///
/// Image links (`![alt](src)`) are skipped. Used when a fetcher only
/// provides markdown for a page.
pub fn extract_markdown_links(markdown: &str, base_url: &Url) -> Vec<Url> {
    let Some(link_pattern) = markdown_link_pattern() else {
        return Vec::new();
    };

    link_pattern
        .captures_iter(markdown)
        .filter(|caps| caps.get(1).map_or(true, |bang| bang.as_str().is_empty()))
        .filter_map(|caps| caps.get(2))
        .filter_map(|href| resolve_link(href.as_str(), base_url))
        .collect()
}

/// Renders HTML into markdown
///
/// Scripts, styles and the document head are dropped. Falls back to the
/// plain text of the document if conversion fails.
pub fn html_to_markdown(html: &str) -> String {
    let converter = HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "noscript", "head", "template", "svg"])
        .build();

    match converter.convert(html) {
        Ok(markdown) => markdown.trim().to_string(),
        Err(e) => {
            tracing::debug!("Markdown conversion failed, using plain text: {}", e);
            let document = Html::parse_document(html);
            document
                .root_element()
                .text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://example.edu/catalog/page").unwrap()
    }

    #[test]
    fn test_extract_title() {
        let html = r#"<html><head><title>  Course Catalog  </title></head><body></body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(parsed.title, Some("Course Catalog".to_string()));
    }

    #[test]
    fn test_no_title() {
        let parsed = parse_html("<html><head></head><body></body></html>", &base_url());
        assert_eq!(parsed.title, None);
    }

    #[test]
    fn test_relative_links_resolved_against_page() {
        let html = r#"<html><body>
            <a href="/events">Absolute path</a>
            <a href="csci-141">Relative path</a>
            <a href="https://other.edu/x">Other host</a>
        </body></html>"#;
        let parsed = parse_html(html, &base_url());
        let links: Vec<&str> = parsed.links.iter().map(Url::as_str).collect();
        assert_eq!(
            links,
            vec![
                "https://example.edu/events",
                "https://example.edu/catalog/csci-141",
                "https://other.edu/x",
            ]
        );
    }

    #[test]
    fn test_skipped_links() {
        let html = r##"<html><body>
            <a href="javascript:void(0)">js</a>
            <a href="mailto:dept@example.edu">mail</a>
            <a href="tel:+13605550100">call</a>
            <a href="data:text/html,hi">data</a>
            <a href="#section">anchor</a>
            <a href="/syllabus.pdf" download>file</a>
            <a href="/kept">kept</a>
        </body></html>"##;
        let parsed = parse_html(html, &base_url());
        assert_eq!(parsed.links.len(), 1);
        assert_eq!(parsed.links[0].as_str(), "https://example.edu/kept");
    }

    #[test]
    fn test_fragment_stripped_from_link() {
        let parsed = parse_html(r#"<a href="/events#today">Today</a>"#, &base_url());
        assert_eq!(parsed.links[0].as_str(), "https://example.edu/events");
    }

    #[test]
    fn test_canonical_link() {
        let html = r#"<html><head><link rel="canonical" href="https://example.edu/canonical" /></head><body></body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(parsed.links[0].as_str(), "https://example.edu/canonical");
    }

    #[test]
    fn test_markdown_links() {
        let markdown = "See [Events](/events) and ![logo](/logo.png) or [CS](https://cs.example.edu/people \"People\").";
        let links = extract_markdown_links(markdown, &base_url());
        let links: Vec<&str> = links.iter().map(Url::as_str).collect();
        assert_eq!(
            links,
            vec!["https://example.edu/events", "https://cs.example.edu/people"]
        );
    }

    #[test]
    fn test_markdown_rendering() {
        let html = r#"<html><head><title>t</title><style>.x{}</style></head><body>
            <h2>CSCI 141 Computer Programming I</h2>
            <p>Introduction to programming. See <a href="/csci-145">CSCI 145</a>.</p>
            <ul><li>Credits: 4</li><li>Prereq: MATH 112</li></ul>
            <script>track()</script>
        </body></html>"#;

        let markdown = html_to_markdown(html);
        assert!(markdown.contains("CSCI 141 Computer Programming I"));
        assert!(markdown.contains("[CSCI 145](/csci-145)"));
        assert!(markdown.contains("Prereq: MATH 112"));
        assert!(!markdown.contains("track()"));
        assert!(!markdown.contains(".x{}"));
        assert!(!markdown.contains('<'));
    }

    #[test]
    fn test_markdown_keeps_paragraphs_on_their_own_line() {
        let markdown = html_to_markdown("<p>record: Jazz Night</p><p>record: May 3</p>");
        let lines: Vec<&str> = markdown.lines().filter(|l| !l.trim().is_empty()).collect();
        assert_eq!(lines, vec!["record: Jazz Night", "record: May 3"]);
    }

    #[test]
    fn test_rendered_markdown_links_round_back_to_urls() {
        let markdown =
            html_to_markdown(r#"<main><p><a href="/events/page2">More events</a></p></main>"#);
        let links = extract_markdown_links(&markdown, &base_url());
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].as_str(), "https://example.edu/events/page2");
    }
}
