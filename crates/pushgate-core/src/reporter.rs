//! Human-readable rendering of a [`VerificationResult`].
//!
//! Only reportable ref changes and commits are printed. Acceptance is read
//! from the tree, never recomputed here.

use crate::domain::changeset::ChangeSet;
use crate::domain::identity::AccountIdentity;
use crate::domain::settings::{AcceptPolicy, RuleGroup, Settings};
use crate::result::{
    ChangeSetVerificationResult, GroupOutcome, IdentityCheck, QueryCheckResult, VerificationResult,
};
use crate::template::{self, Variables};

/// Render the report shown to the pushing client.
pub fn render(
    result: &VerificationResult,
    settings: &Settings,
    pusher: &AccountIdentity,
) -> String {
    let mut out = Report {
        lines: Vec::new(),
        variables: Variables::for_pusher(pusher),
    };

    let headline = if result.is_accepted() {
        &settings.accept_message
    } else {
        &settings.reject_message
    };
    if let Some(message) = headline {
        out.message("", message);
    }

    for ref_result in result.ref_changes.iter().filter(|r| r.has_reportables()) {
        let rc = &ref_result.ref_change;
        out.line(format!("{} {} -> {}", rc.ref_id, rc.short_from(), rc.short_to()));
        for verified in ref_result.changesets.iter().filter(|c| c.result.has_reportables()) {
            out.changeset(&verified.changeset, &verified.result, settings, pusher);
        }
    }

    if settings.accept_message.is_some() || !result.is_accepted() {
        out.blank();
    }

    out.lines.join("\n")
}

struct Report {
    lines: Vec<String>,
    variables: Variables,
}

impl Report {
    fn line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    fn blank(&mut self) {
        self.lines.push(String::new());
    }

    /// A configured message, with pusher variables substituted.
    fn message(&mut self, prefix: &str, message: &str) {
        let text = template::substitute(message, &self.variables);
        self.lines.push(format!("{prefix}{text}"));
    }

    fn changeset(
        &mut self,
        changeset: &ChangeSet,
        result: &ChangeSetVerificationResult,
        settings: &Settings,
        pusher: &AccountIdentity,
    ) {
        let committer = &changeset.committer;
        self.blank();
        self.blank();
        self.line(format!("{} {} <{}>", changeset.id, committer.name, committer.email));
        self.line(format!(">>> {}", changeset.message.trim_end()));

        if let Some(violation) = result.identity.violated(IdentityCheck::Email) {
            self.blank();
            self.line(format!("- Pusher: '{}' != Commit: '{}'", pusher.email, committer.email));
            if let Some(message) = &violation.message {
                self.message("  ", message);
            }
        }
        if let Some(violation) = result.identity.violated(IdentityCheck::Name) {
            self.blank();
            self.line(format!(
                "- Pusher: '{}' != Commit: '{}'",
                pusher.display_name, committer.name
            ));
            if let Some(message) = &violation.message {
                self.message("  ", message);
            }
        }
        if let Some(violation) = result.identity.violated(IdentityCheck::KnownCommitter) {
            self.blank();
            self.line(format!("- Unknown committer: {} <{}>", committer.name, committer.email));
            if let Some(message) = &violation.message {
                self.message("  ", message);
            }
        }

        for outcome in &result.groups {
            let Some(group) = outcome
                .group_index
                .checked_sub(1)
                .and_then(|i| settings.groups.get(i))
            else {
                continue;
            };
            self.group(outcome, group);
        }

        if let Some(query) = &result.query {
            self.query(query);
        }
    }

    fn group(&mut self, outcome: &GroupOutcome, group: &RuleGroup) {
        match outcome.accept {
            AcceptPolicy::Accept if outcome.matched_rules.is_empty() => {
                self.blank();
                let described =
                    group.message.is_some() || group.rules.iter().any(|r| r.message.is_some());
                if described {
                    if let Some(message) = &group.message {
                        self.message("- ", message);
                    }
                    for rule in group.rules.iter() {
                        if let Some(message) = &rule.message {
                            let text = template::substitute(message, &self.variables);
                            self.line(format!("  {}: {}", text, rule.pattern.source()));
                        }
                    }
                } else {
                    self.line(format!(
                        "- Rule group #{} (accept) not satisfied",
                        outcome.group_index
                    ));
                    for rule in group.rules.iter() {
                        self.line(format!("  {}", rule.pattern.source()));
                    }
                }
            }
            AcceptPolicy::Reject if !outcome.matched_rules.is_empty() => {
                self.blank();
                let matched: Vec<_> = outcome
                    .matched_rules
                    .iter()
                    .filter_map(|&i| group.rules.get(i))
                    .collect();
                let described =
                    group.message.is_some() || matched.iter().any(|r| r.message.is_some());
                if described {
                    if let Some(message) = &group.message {
                        self.message("- ", message);
                    }
                    for rule in matched {
                        if let Some(message) = &rule.message {
                            let text = template::substitute(message, &self.variables);
                            self.line(format!("  {}: {}", text, rule.pattern.source()));
                        }
                    }
                } else {
                    for rule in matched {
                        self.line(format!(
                            "- Rule group #{} (reject) matched: {}",
                            outcome.group_index,
                            rule.pattern.source()
                        ));
                    }
                }
            }
            AcceptPolicy::ShowMessage => {
                for message in &outcome.messages {
                    self.blank();
                    self.message("- ", message);
                }
            }
            _ => {}
        }

        if outcome.accept != AcceptPolicy::ShowMessage {
            if let Some(error) = &outcome.config_error {
                self.config_error(error);
            }
        }
    }

    fn query(&mut self, query: &QueryCheckResult) {
        if query.satisfied {
            return;
        }
        if let Some(error) = &query.config_error {
            self.config_error(error);
            return;
        }
        if let Some(missing) = &query.missing_token {
            self.blank();
            self.line(format!("- Query: no token matching {}", missing.regex));
            if let Some(message) = &missing.message {
                self.message("  ", message);
            }
            return;
        }
        for attempt in &query.attempts {
            self.blank();
            self.line(format!("- Query: {}", attempt.query));
            if let Some(message) = &attempt.message {
                self.message("  ", message);
            }
        }
    }

    fn config_error(&mut self, detail: &str) {
        self.blank();
        self.line(format!("- Configuration error: {detail}"));
    }
}
