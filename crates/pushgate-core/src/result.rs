//! Hierarchical verification result: push → ref change → commit.
//!
//! Acceptance is derived bottom-up from the recorded outcomes, and the
//! reporter renders this tree without re-deriving any policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::changeset::{ChangeSet, RefChange};
use crate::domain::settings::AcceptPolicy;

// ---------------------------------------------------------------------------
// Rule groups
// ---------------------------------------------------------------------------

/// Outcome of one rule group against one commit message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupOutcome {
    /// 1-based position of the group in settings.
    pub group_index: usize,
    pub accept: AcceptPolicy,
    /// Indices of the rules whose pattern matched, in rule order.
    pub matched_rules: Vec<usize>,
    pub satisfied: bool,
    /// Messages surfaced by the group: informational when satisfied,
    /// rejection reasons otherwise.
    pub messages: Vec<String>,
    /// A rule of this group could not be compiled.
    pub config_error: Option<String>,
}

impl GroupOutcome {
    pub fn has_reportables(&self) -> bool {
        !self.satisfied || (self.accept == AcceptPolicy::ShowMessage && !self.messages.is_empty())
    }
}

// ---------------------------------------------------------------------------
// External queries
// ---------------------------------------------------------------------------

/// Result of issuing one substituted query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryOutcome {
    /// The query returned at least one result.
    Found,
    NoResults,
    /// The oracle failed; treated as no results.
    Failed { error: String },
}

/// A single attempted query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAttempt {
    pub query: String,
    /// The token substituted into the template, if the template uses one.
    pub token: Option<String>,
    pub outcome: QueryOutcome,
    /// Configured violation message; absent on success.
    pub message: Option<String>,
}

impl QueryAttempt {
    pub fn succeeded(&self) -> bool {
        self.outcome == QueryOutcome::Found
    }
}

/// Result of the external query check for one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCheckResult {
    /// Every attempted query, in extraction order, up to the first success.
    pub attempts: Vec<QueryAttempt>,
    pub satisfied: bool,
    /// The extraction regex found no token; set when that is rejected.
    pub missing_token: Option<MissingToken>,
    pub config_error: Option<String>,
}

/// Details of a rejection due to no extractable token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingToken {
    pub regex: String,
    pub message: Option<String>,
}

impl QueryCheckResult {
    pub fn not_applicable() -> Self {
        Self {
            attempts: Vec::new(),
            satisfied: true,
            missing_token: None,
            config_error: None,
        }
    }

    pub fn config_error(error: String) -> Self {
        Self {
            attempts: Vec::new(),
            satisfied: false,
            missing_token: None,
            config_error: Some(error),
        }
    }

    /// Attempts that did not find results.
    pub fn failed_attempts(&self) -> impl Iterator<Item = &QueryAttempt> {
        self.attempts.iter().filter(|a| !a.succeeded())
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Which identity check was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityCheck {
    Name,
    Email,
    KnownCommitter,
}

/// A violated, enabled identity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityViolation {
    pub check: IdentityCheck,
    pub message: Option<String>,
}

/// Identity comparison of a commit against the pushing account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityResult {
    pub name_matches: bool,
    pub email_matches: bool,
    /// `None` when not checked or the directory was unavailable.
    pub committer_known: Option<bool>,
    pub violations: Vec<IdentityViolation>,
}

impl IdentityResult {
    pub fn accepted(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violated(&self, check: IdentityCheck) -> Option<&IdentityViolation> {
        self.violations.iter().find(|v| v.check == check)
    }
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// Verification of a single commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSetVerificationResult {
    pub identity: IdentityResult,
    /// One outcome per configured group, in settings order.
    pub groups: Vec<GroupOutcome>,
    /// Present iff the query check is enabled.
    pub query: Option<QueryCheckResult>,
}

impl ChangeSetVerificationResult {
    pub fn is_accepted(&self) -> bool {
        self.identity.accepted()
            && self.groups.iter().all(|g| g.satisfied)
            && self.query.as_ref().map_or(true, |q| q.satisfied)
    }

    pub fn has_reportables(&self) -> bool {
        !self.is_accepted() || self.groups.iter().any(GroupOutcome::has_reportables)
    }
}

/// A commit together with its verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedChangeSet {
    pub changeset: ChangeSet,
    pub result: ChangeSetVerificationResult,
}

/// Verification of one ref change; commits kept in provider order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefChangeVerificationResult {
    pub ref_change: RefChange,
    pub changesets: Vec<VerifiedChangeSet>,
}

impl RefChangeVerificationResult {
    pub fn is_accepted(&self) -> bool {
        self.changesets.iter().all(|c| c.result.is_accepted())
    }

    pub fn has_reportables(&self) -> bool {
        self.changesets.iter().any(|c| c.result.has_reportables())
    }
}

/// The whole-push result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// AND over all ref changes.
    pub accepted: bool,
    pub ref_changes: Vec<RefChangeVerificationResult>,
    pub evaluated_at: DateTime<Utc>,
}

impl VerificationResult {
    pub fn new(ref_changes: Vec<RefChangeVerificationResult>) -> Self {
        Self {
            accepted: ref_changes.iter().all(|r| r.is_accepted()),
            ref_changes,
            evaluated_at: Utc::now(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    pub fn has_reportables(&self) -> bool {
        self.ref_changes.iter().any(|r| r.has_reportables())
    }

    /// Number of commits that were rejected.
    pub fn rejected_count(&self) -> usize {
        self.ref_changes
            .iter()
            .flat_map(|r| r.changesets.iter())
            .filter(|c| !c.result.is_accepted())
            .count()
    }

    /// Number of commits that were evaluated.
    pub fn changeset_count(&self) -> usize {
        self.ref_changes.iter().map(|r| r.changesets.len()).sum()
    }
}
