use regex::Regex;
use std::fmt;

/// A string matcher written either as a literal or as a `/pattern/` regex.
///
/// Regex matchers use unanchored search semantics: a substring match is enough,
/// anchors have to be written into the pattern.
#[derive(Debug, Clone)]
pub enum Matcher {
    Exact(String),
    Pattern { source: String, regex: Regex },
}

impl Matcher {
    pub fn parse(raw: &str) -> Result<Self, regex::Error> {
        match regex_body(raw) {
            Some(body) => Ok(Matcher::Pattern {
                source: raw.to_string(),
                regex: Regex::new(body)?,
            }),
            None => Ok(Matcher::Exact(raw.to_string())),
        }
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        match self {
            Matcher::Exact(s) => s == candidate,
            Matcher::Pattern { regex, .. } => regex.is_match(candidate),
        }
    }

    /// The matcher as it was written in the configuration.
    pub fn as_str(&self) -> &str {
        match self {
            Matcher::Exact(s) => s,
            Matcher::Pattern { source, .. } => source,
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the inner pattern of a `/.../` wrapped string.
fn regex_body(raw: &str) -> Option<&str> {
    if raw.len() >= 2 && raw.starts_with('/') && raw.ends_with('/') {
        Some(&raw[1..raw.len() - 1])
    } else {
        None
    }
}
