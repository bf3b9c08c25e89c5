use crate::ConfigError;
use regex::Regex;
use url::Url;

/// Extracts the lowercase host of a URL, without port or leading `www.`
///
/// Matches the host form used as the frontier dedup key, so
/// `www.example.edu` and `example.edu` are the same site.
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| strip_www(&h.to_lowercase()).to_string())
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// Checks if a domain matches a wildcard pattern
///
/// `"example.edu"` matches only itself. `"*.example.edu"` matches the bare
/// domain and any subdomain depth (`"cs.example.edu"`, `"a.b.example.edu"`).
/// Both sides are expected to be lowercase.
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(base) => {
            candidate == base
                || candidate
                    .strip_suffix(base)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        }
        None => candidate == pattern,
    }
}

/// Admission rules for discovered links
///
/// An empty domain list or an empty pattern list means that dimension is
/// unconstrained.
#[derive(Debug, Clone, Default)]
pub struct AllowRules {
    domains: Vec<String>,
    patterns: Vec<Regex>,
}

impl AllowRules {
    /// Builds rules from domain patterns and path regexes
    pub fn new(domains: &[String], patterns: &[String]) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p)
                    .map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", p, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            domains: domains
                .iter()
                .map(|d| strip_www(&d.to_lowercase()).to_string())
                .collect(),
            patterns,
        })
    }

    /// Rules that admit every HTTP(S) link
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn has_domain_constraint(&self) -> bool {
        !self.domains.is_empty()
    }

    pub fn has_pattern_constraint(&self) -> bool {
        !self.patterns.is_empty()
    }

    /// True when the URL's host satisfies the allowed domains
    pub fn domain_allowed(&self, url: &Url) -> bool {
        if self.domains.is_empty() {
            return true;
        }
        match extract_domain(url) {
            Some(host) => self.domains.iter().any(|d| matches_wildcard(d, &host)),
            None => false,
        }
    }

    /// True when the URL's path matches at least one allow pattern
    pub fn path_allowed(&self, url: &Url) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.is_match(url.path()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_extract_domain_lowercases_and_drops_port() {
        assert_eq!(
            extract_domain(&url("https://CS.Example.EDU:8443/x")),
            Some("cs.example.edu".to_string())
        );
    }

    #[test]
    fn test_extract_domain_strips_www() {
        assert_eq!(
            extract_domain(&url("https://WWW.example.edu/x")),
            Some("example.edu".to_string())
        );
        assert_eq!(
            extract_domain(&url("https://wwwx.example.edu/")),
            Some("wwwx.example.edu".to_string())
        );
    }

    #[test]
    fn test_www_host_matches_bare_domain() {
        let bare = AllowRules::new(&["example.edu".to_string()], &[]).unwrap();
        assert!(bare.domain_allowed(&url("https://www.example.edu/x")));

        let prefixed = AllowRules::new(&["www.example.edu".to_string()], &[]).unwrap();
        assert!(prefixed.domain_allowed(&url("https://example.edu/x")));
        assert!(!prefixed.domain_allowed(&url("https://cs.example.edu/x")));
    }

    #[test]
    fn test_wildcard_matching() {
        assert!(matches_wildcard("example.edu", "example.edu"));
        assert!(!matches_wildcard("example.edu", "cs.example.edu"));
        assert!(matches_wildcard("*.example.edu", "example.edu"));
        assert!(matches_wildcard("*.example.edu", "catalog.cs.example.edu"));
        assert!(!matches_wildcard("*.example.edu", "notexample.edu"));
        assert!(!matches_wildcard("*.example.edu", "example.edu.evil.com"));
    }

    #[test]
    fn test_unrestricted_admits_everything() {
        let rules = AllowRules::unrestricted();
        assert!(rules.domain_allowed(&url("https://external.com/")));
        assert!(rules.path_allowed(&url("https://external.com/anything")));
        assert!(!rules.has_domain_constraint());
    }

    #[test]
    fn test_domain_constraint_excludes_external() {
        let rules = AllowRules::new(&["example.edu".to_string()], &[]).unwrap();
        assert!(rules.domain_allowed(&url("https://example.edu/events")));
        assert!(!rules.domain_allowed(&url("https://external.com/events")));
    }

    #[test]
    fn test_event_path_patterns() {
        let rules = AllowRules::new(
            &[],
            &[r".*/events$".to_string(), r".*/event/\d+$".to_string()],
        )
        .unwrap();

        assert!(rules.path_allowed(&url("https://example.edu/events")));
        assert!(rules.path_allowed(&url("https://example.edu/event/1234")));
        assert!(rules.path_allowed(&url("https://example.edu/event/1234?tab=info")));
        assert!(!rules.path_allowed(&url("https://example.edu/event/abc")));
        assert!(!rules.path_allowed(&url("https://example.edu/news")));
    }

    #[test]
    fn test_invalid_regex() {
        let result = AllowRules::new(&[], &["[".to_string()]);
        assert!(matches!(result, Err(ConfigError::InvalidPattern(_))));
    }
}
