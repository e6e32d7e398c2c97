//! Structured observability hooks for push evaluation.
//!
//! - Push-scoped tracing spans via [`PushSpan`]
//! - Emission functions for key events, each carrying a stable `event` field

use tracing::{info, warn};
use uuid::Uuid;

/// Push-scoped span carrying a fresh `push_id`.
///
/// ```ignore
/// let span = PushSpan::new();
/// evaluate().instrument(span.span().clone()).await;
/// ```
pub struct PushSpan {
    push_id: Uuid,
    span: tracing::Span,
}

impl PushSpan {
    pub fn new() -> Self {
        let push_id = Uuid::new_v4();
        let span = tracing::info_span!("pushgate.push", push_id = %push_id);
        Self { push_id, span }
    }

    pub fn push_id(&self) -> Uuid {
        self.push_id
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}

impl Default for PushSpan {
    fn default() -> Self {
        Self::new()
    }
}

pub fn emit_push_started(pusher: &str, ref_changes: usize) {
    info!(event = "push.started", pusher = %pusher, ref_changes = ref_changes);
}

pub fn emit_push_evaluated(accepted: bool, changesets: usize, rejected: usize, enforced: bool) {
    info!(
        event = "push.evaluated",
        accepted = accepted,
        changesets = changesets,
        rejected = rejected,
        enforced = enforced,
    );
}

/// Evaluation could not complete and the push is let through.
pub fn emit_fail_open(error: &dyn std::fmt::Display) {
    tracing::error!(event = "push.fail_open", error = %error);
}

pub fn emit_query_attempted(query: &str, outcome: &str) {
    tracing::debug!(event = "query.attempted", query = %query, outcome = %outcome);
}

pub fn emit_query_failed(query: &str, error: &dyn std::fmt::Display) {
    warn!(event = "query.failed", query = %query, error = %error);
}

pub fn emit_directory_refreshed(accounts: usize) {
    info!(event = "directory.refreshed", accounts = accounts);
}

pub fn emit_directory_refresh_failed(error: &dyn std::fmt::Display, serving_stale: bool) {
    warn!(
        event = "directory.refresh_failed",
        error = %error,
        serving_stale = serving_stale,
    );
}

pub fn emit_invalid_setting(detail: &str) {
    warn!(event = "settings.invalid_pattern", detail = %detail);
}
