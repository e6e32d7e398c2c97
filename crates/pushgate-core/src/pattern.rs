//! Regex matching over commit messages.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// One non-overlapping match of a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternMatch {
    /// The whole matched text.
    pub text: String,
    /// Capture groups 1.., `None` where a group did not participate.
    pub groups: Vec<Option<String>>,
}

impl PatternMatch {
    /// The token this match contributes: capture group 1 when it
    /// participated, the whole match otherwise.
    pub fn token(&self) -> &str {
        match self.groups.first() {
            Some(Some(group)) => group,
            _ => &self.text,
        }
    }
}

/// All non-overlapping matches of `regex` in `message`, in message order.
pub fn find_all(regex: &Regex, message: &str) -> Vec<PatternMatch> {
    regex
        .captures_iter(message)
        .map(|caps| PatternMatch {
            text: caps
                .get(0)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
            groups: caps
                .iter()
                .skip(1)
                .map(|g| g.map(|m| m.as_str().to_string()))
                .collect(),
        })
        .collect()
}

/// Whether `regex` matches anywhere in `message`.
pub fn matches(regex: &Regex, message: &str) -> bool {
    regex.is_match(message)
}

/// Distinct tokens extracted from `message`, first occurrence order.
pub fn extract_tokens(regex: &Regex, message: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for m in find_all(regex, message) {
        let token = m.token();
        if !tokens.iter().any(|t| t == token) {
            tokens.push(token.to_string());
        }
    }
    tokens
}
