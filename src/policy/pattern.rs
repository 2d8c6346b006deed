//! Pattern syntax shared by banned words, the profanity dictionary and keyword reactions.
//!
//! A pattern is a case-insensitive substring unless written as `re:<expr>` or `/<expr>/`.

use regex::{Regex, RegexBuilder};

/// Split user input into `(pattern, is_regex)`.
pub fn parse_pattern_spec(input: &str) -> (String, bool) {
    let trimmed = input.trim();
    if let Some(expr) = trimmed.strip_prefix("re:") {
        return (expr.to_string(), true);
    }
    if trimmed.len() > 2 && trimmed.starts_with('/') && trimmed.ends_with('/') {
        return (trimmed[1..trimmed.len() - 1].to_string(), true);
    }
    (trimmed.to_string(), false)
}

/// A compiled pattern.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Lowercased needle.
    Literal(String),
    Regex(Regex),
}

impl Matcher {
    pub fn compile(pattern: &str, is_regex: bool) -> Result<Self, regex::Error> {
        if is_regex {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .size_limit(1 << 20)
                .build()
                .map(Self::Regex)
        } else {
            Ok(Self::Literal(pattern.to_lowercase()))
        }
    }

    /// Whether `text` contains the pattern. An empty literal never matches.
    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Self::Literal(needle) => !needle.is_empty() && text.to_lowercase().contains(needle),
            Self::Regex(re) => re.is_match(text),
        }
    }
}

/// Check a pattern before storing it. Returns the compile error text on failure.
pub fn validate(pattern: &str, is_regex: bool) -> Result<(), String> {
    if pattern.trim().is_empty() {
        return Err("pattern is empty".into());
    }
    Matcher::compile(pattern, is_regex)
        .map(|_| ())
        .map_err(|e| e.to_string())
}
