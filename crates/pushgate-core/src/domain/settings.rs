//! Immutable per-repository settings snapshot.
//!
//! Regular expressions and query templates are compiled once when the
//! snapshot is built. A pattern or template that fails to compile is kept as
//! an invalid entry instead of failing the whole snapshot, so that only the
//! group or check it belongs to is affected at evaluation time.

use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::identity::AccountIdentity;
use crate::template::{self, Variable};

/// Default bound on a single oracle call.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// How matches of a rule group's rules affect acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptPolicy {
    /// At least one rule must match.
    Accept,
    /// No rule may match.
    Reject,
    /// Never affects acceptance; the group message is always shown.
    ShowMessage,
}

impl AcceptPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            AcceptPolicy::Accept => "accept",
            AcceptPolicy::Reject => "reject",
            AcceptPolicy::ShowMessage => "show_message",
        }
    }
}

/// A compiled regular expression, or the reason it could not be compiled.
#[derive(Debug, Clone)]
pub enum Pattern {
    Compiled(Regex),
    Invalid { source: String, error: String },
}

impl Pattern {
    pub fn compile(source: &str) -> Self {
        match Regex::new(source) {
            Ok(regex) => Pattern::Compiled(regex),
            Err(e) => Pattern::Invalid {
                source: source.to_string(),
                error: e.to_string(),
            },
        }
    }

    /// The expression as written in configuration.
    pub fn source(&self) -> &str {
        match self {
            Pattern::Compiled(regex) => regex.as_str(),
            Pattern::Invalid { source, .. } => source,
        }
    }

    pub fn regex(&self) -> Option<&Regex> {
        match self {
            Pattern::Compiled(regex) => Some(regex),
            Pattern::Invalid { .. } => None,
        }
    }

    /// Compilation error, if any, formatted for reporting.
    pub fn error(&self) -> Option<String> {
        match self {
            Pattern::Compiled(_) => None,
            Pattern::Invalid { source, error } => {
                Some(format!("invalid regex '{source}': {error}"))
            }
        }
    }
}

/// A single message rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub pattern: Pattern,
    pub message: Option<String>,
}

impl Rule {
    pub fn new(regex: &str) -> Self {
        Self {
            pattern: Pattern::compile(regex),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// An accept policy plus an ordered list of rules.
#[derive(Debug, Clone)]
pub struct RuleGroup {
    pub accept: AcceptPolicy,
    pub message: Option<String>,
    pub rules: Vec<Rule>,
}

impl RuleGroup {
    pub fn new(accept: AcceptPolicy) -> Self {
        Self {
            accept,
            message: None,
            rules: Vec::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }
}

/// What to do when the extraction regex finds nothing in a commit message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingTokenPolicy {
    /// The check does not apply to this commit.
    #[default]
    Accept,
    /// The commit must reference at least one token.
    Reject,
}

/// External query check: a template issued once per extracted token.
#[derive(Debug, Clone)]
pub struct QueryCheck {
    pub template: String,
    /// Placeholders in `template` that no variable can resolve.
    pub template_error: Option<String>,
    pub extraction: Option<Pattern>,
    pub message: Option<String>,
    pub missing_token: MissingTokenPolicy,
    pub timeout: Duration,
}

impl QueryCheck {
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        let unknown = template::unresolvable(&template);
        let template_error = if unknown.is_empty() {
            None
        } else {
            Some(format!(
                "query template '{}' uses unknown variable(s): {}",
                template,
                unknown.join(", ")
            ))
        };
        Self {
            template,
            template_error,
            extraction: None,
            message: None,
            missing_token: MissingTokenPolicy::default(),
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    pub fn with_extraction(mut self, regex: &str) -> Self {
        self.extraction = Some(Pattern::compile(regex));
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_missing_token(mut self, policy: MissingTokenPolicy) -> Self {
        self.missing_token = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether the template is issued once per extracted token.
    pub fn uses_token(&self) -> bool {
        template::placeholders(&self.template).contains(&Variable::Regexp.name())
    }
}

/// Identity checks and their violation messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityRequirements {
    pub require_matching_name: bool,
    pub require_matching_name_message: Option<String>,
    pub require_matching_email: bool,
    pub require_matching_email_message: Option<String>,
    /// Committer must resolve to an account in the user directory.
    pub require_known_committer: bool,
    pub require_known_committer_message: Option<String>,
}

/// Refresh and sizing of the process-wide caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub query_ttl: Duration,
    pub query_capacity: usize,
    pub directory_ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            query_ttl: Duration::from_secs(5 * 60),
            query_capacity: 1024,
            directory_ttl: Duration::from_secs(5 * 60),
        }
    }
}

/// Configuration snapshot for one repository, loaded once per push.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub accept_message: Option<String>,
    pub reject_message: Option<String>,
    pub dry_run: bool,
    pub dry_run_message: Option<String>,
    /// Service accounts are never blocked, though they are still evaluated.
    pub allow_service_accounts: bool,
    pub identity: IdentityRequirements,
    /// Present iff the external query check is enabled.
    pub query: Option<QueryCheck>,
    pub groups: Vec<RuleGroup>,
    pub cache: CacheSettings,
    /// Accounts served by the static user directory.
    pub accounts: Vec<AccountIdentity>,
}

impl Settings {
    pub fn with_group(mut self, group: RuleGroup) -> Self {
        self.groups.push(group);
        self
    }

    pub fn with_query(mut self, query: QueryCheck) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_identity(mut self, identity: IdentityRequirements) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_dry_run(mut self, message: Option<String>) -> Self {
        self.dry_run = true;
        self.dry_run_message = message;
        self
    }

    pub fn with_accept_message(mut self, message: impl Into<String>) -> Self {
        self.accept_message = Some(message.into());
        self
    }

    pub fn with_reject_message(mut self, message: impl Into<String>) -> Self {
        self.reject_message = Some(message.into());
        self
    }

    pub fn allowing_service_accounts(mut self) -> Self {
        self.allow_service_accounts = true;
        self
    }

    /// Configuration problems found while compiling, for load-time logging.
    pub fn config_errors(&self) -> Vec<String> {
        let mut errors: Vec<String> = self
            .groups
            .iter()
            .flat_map(|g| g.rules.iter())
            .filter_map(|r| r.pattern.error())
            .collect();
        if let Some(query) = &self.query {
            errors.extend(query.template_error.clone());
            errors.extend(query.extraction.as_ref().and_then(Pattern::error));
        }
        for (setting, message) in self.messages() {
            let unknown = template::unresolvable(message);
            if !unknown.is_empty() {
                errors.push(format!(
                    "{setting} '{message}' uses unknown variable(s): {}",
                    unknown.join(", ")
                ));
            }
        }
        errors
    }

    /// Every operator-authored message, labelled by the setting it came from.
    fn messages(&self) -> Vec<(String, &str)> {
        let identity = &self.identity;
        let mut messages: Vec<(String, Option<&String>)> = vec![
            ("accept_message".into(), self.accept_message.as_ref()),
            ("reject_message".into(), self.reject_message.as_ref()),
            ("dry_run_message".into(), self.dry_run_message.as_ref()),
            (
                "require_matching_name_message".into(),
                identity.require_matching_name_message.as_ref(),
            ),
            (
                "require_matching_email_message".into(),
                identity.require_matching_email_message.as_ref(),
            ),
            (
                "require_known_committer_message".into(),
                identity.require_known_committer_message.as_ref(),
            ),
            (
                "query message".into(),
                self.query.as_ref().and_then(|q| q.message.as_ref()),
            ),
        ];
        for (g, group) in self.groups.iter().enumerate() {
            messages.push((format!("group #{} message", g + 1), group.message.as_ref()));
            for rule in &group.rules {
                messages.push((
                    format!("group #{} rule message", g + 1),
                    rule.message.as_ref(),
                ));
            }
        }
        messages
            .into_iter()
            .filter_map(|(setting, message)| message.map(|m| (setting, m.as_str())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_pattern_is_retained() {
        let rule = Rule::new("([A-Z]+");
        assert!(rule.pattern.regex().is_none());
        assert_eq!(rule.pattern.source(), "([A-Z]+");
        assert!(rule.pattern.error().unwrap().contains("invalid regex"));
    }

    #[test]
    fn query_template_with_unknown_variable_is_flagged() {
        let check = QueryCheck::new("assignee = ${NOBODY}");
        assert!(check.template_error.unwrap().contains("NOBODY"));
    }

    #[test]
    fn query_template_detects_token_use() {
        assert!(QueryCheck::new("issue = ${REGEXP}").uses_token());
        assert!(!QueryCheck::new("status = \"In Progress\"").uses_token());
        assert!(QueryCheck::new("assignee = ${PUSHER_USER}")
            .template_error
            .is_none());
    }

    #[test]
    fn unknown_variables_in_messages_are_config_errors() {
        let settings = Settings::default()
            .with_identity(IdentityRequirements {
                require_matching_email: true,
                require_matching_email_message: Some("Use ${STASH_EMAIL}".into()),
                ..IdentityRequirements::default()
            })
            .with_reject_message("Rejected for ${PUSHER_USER}")
            .with_group(
                RuleGroup::new(AcceptPolicy::Accept)
                    .with_message("Need ${TICKET}")
                    .with_rule(Rule::new("x").with_message("Issue")),
            );

        let errors = settings.config_errors();

        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("require_matching_email_message 'Use ${STASH_EMAIL}'"));
        assert!(errors[0].ends_with("STASH_EMAIL"));
        assert!(errors[1].starts_with("group #1 message"));
    }

    #[test]
    fn config_errors_collects_groups_and_query() {
        let settings = Settings::default()
            .with_group(RuleGroup::new(AcceptPolicy::Accept).with_rule(Rule::new("(")))
            .with_query(QueryCheck::new("x = ${WHAT}").with_extraction("["));
        assert_eq!(settings.config_errors().len(), 3);
    }
}
