/// Origin derivation and exclusion pattern matching
use crate::error::{Error, Result};
use regex::Regex;
use url::Url;

/// The grouping key of a URL: `${protocol}//${hostname}`
///
/// Ports, paths, queries and credentials are dropped and the host is
/// lowercased by the parser.
///
/// Examples:
/// - https://www.google.com/search?q=rust → https://www.google.com
/// - http://localhost:3000/app → http://localhost
/// - file:///home/me/notes.txt → file://
pub fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let hostname = parsed.host_str().unwrap_or_default();
    Some(format!("{}://{}", parsed.scheme(), hostname))
}

/// A user exclusion pattern compiled to a regular expression
///
/// `/.../` is taken as a raw regex; anything else is a glob where `*`
/// matches any run of characters and `?` a single one.
#[derive(Debug, Clone)]
pub struct ExclusionPattern {
    source: String,
    regex: Regex,
}

impl ExclusionPattern {
    pub fn compile(pattern: &str) -> Result<ExclusionPattern> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            return Err(Error::validation("excludePatterns", "pattern must not be empty"));
        }

        let expression = match trimmed
            .strip_prefix('/')
            .and_then(|rest| rest.strip_suffix('/'))
        {
            Some(raw) if !raw.is_empty() => raw.to_string(),
            _ => glob_to_regex(trimmed),
        };

        let regex = Regex::new(&expression).map_err(|e| {
            Error::validation("excludePatterns", format!("invalid pattern {}: {}", trimmed, e))
        })?;

        Ok(ExclusionPattern {
            source: trimmed.to_string(),
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, url: &str) -> bool {
        self.regex.is_match(url)
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut expression = String::with_capacity(glob.len() + 8);
    expression.push('^');
    for c in glob.chars() {
        match c {
            '*' => expression.push_str(".*"),
            '?' => expression.push('.'),
            other => expression.push_str(&regex::escape(&other.to_string())),
        }
    }
    expression.push('$');
    expression
}

/// Compile every pattern, failing on the first invalid one
pub fn compile_exclusions(patterns: &[String]) -> Result<Vec<ExclusionPattern>> {
    patterns.iter().map(|p| ExclusionPattern::compile(p)).collect()
}

/// Whether any pattern excludes the URL
pub fn is_excluded(url: &str, patterns: &[ExclusionPattern]) -> bool {
    patterns.iter().any(|pattern| pattern.matches(url))
}
