//! External query check.
//!
//! Tokens are extracted from the commit message, substituted into the query
//! template one at a time, and issued to the [`QueryOracle`] in message
//! order until one query finds results. Oracle errors and timeouts are
//! recorded as failed attempts and evaluation moves on to the next token.

use async_trait::async_trait;

use crate::domain::error::OracleError;
use crate::domain::settings::{MissingTokenPolicy, QueryCheck};
use crate::metrics::METRICS;
use crate::obs;
use crate::pattern;
use crate::result::{MissingToken, QueryAttempt, QueryCheckResult, QueryOutcome};
use crate::template::{self, Variable, Variables};

/// Boolean-valued external lookup, e.g. "does this issue query return results?".
#[async_trait]
pub trait QueryOracle: Send + Sync {
    /// Whether the fully substituted `query` has at least one result.
    async fn has_results(&self, query: &str) -> Result<bool, OracleError>;
}

/// Run the query check for one commit message.
///
/// All attempted queries are recorded, whatever their outcome; the check is
/// satisfied as soon as one attempt finds results and no further queries are
/// issued after that.
pub async fn verify_query(
    check: &QueryCheck,
    message: &str,
    variables: &Variables,
    oracle: &dyn QueryOracle,
) -> QueryCheckResult {
    if let Some(error) = &check.template_error {
        return QueryCheckResult::config_error(error.clone());
    }

    let candidates = match candidates(check, message, variables) {
        Ok(candidates) => candidates,
        Err(result) => return result,
    };

    let mut attempts = Vec::with_capacity(candidates.len());
    let mut satisfied = false;

    for (token, query) in candidates {
        let outcome = issue(check, &query, oracle).await;
        let found = outcome == QueryOutcome::Found;
        attempts.push(QueryAttempt {
            query,
            token,
            message: if found { None } else { check.message.clone() },
            outcome,
        });
        if found {
            satisfied = true;
            break;
        }
    }

    QueryCheckResult {
        attempts,
        satisfied,
        missing_token: None,
        config_error: None,
    }
}

/// Substituted `(token, query)` pairs in extraction order.
///
/// A template without the token placeholder yields exactly one query.
fn candidates(
    check: &QueryCheck,
    message: &str,
    variables: &Variables,
) -> Result<Vec<(Option<String>, String)>, QueryCheckResult> {
    if !check.uses_token() {
        return Ok(vec![(None, template::substitute(&check.template, variables))]);
    }

    let Some(extraction) = &check.extraction else {
        return Err(QueryCheckResult::config_error(format!(
            "query template '{}' uses {} but no extraction regex is configured",
            check.template,
            Variable::Regexp.placeholder()
        )));
    };
    let Some(regex) = extraction.regex() else {
        return Err(QueryCheckResult::config_error(
            extraction.error().unwrap_or_default(),
        ));
    };

    let tokens = pattern::extract_tokens(regex, message);
    if tokens.is_empty() {
        return Err(match check.missing_token {
            MissingTokenPolicy::Accept => QueryCheckResult::not_applicable(),
            MissingTokenPolicy::Reject => QueryCheckResult {
                attempts: Vec::new(),
                satisfied: false,
                missing_token: Some(MissingToken {
                    regex: extraction.source().to_string(),
                    message: check.message.clone(),
                }),
                config_error: None,
            },
        });
    }

    Ok(tokens
        .into_iter()
        .map(|token| {
            let bound = variables.clone().with(Variable::Regexp, token.clone());
            let query = template::substitute(&check.template, &bound);
            (Some(token), query)
        })
        .collect())
}

/// Issue one query under the configured timeout.
async fn issue(check: &QueryCheck, query: &str, oracle: &dyn QueryOracle) -> QueryOutcome {
    let outcome = match tokio::time::timeout(check.timeout, oracle.has_results(query)).await {
        Ok(Ok(true)) => QueryOutcome::Found,
        Ok(Ok(false)) => QueryOutcome::NoResults,
        Ok(Err(e)) => failed(query, e),
        Err(_) => failed(
            query,
            OracleError::Timeout {
                timeout_ms: u64::try_from(check.timeout.as_millis()).unwrap_or(u64::MAX),
            },
        ),
    };
    obs::emit_query_attempted(query, outcome_label(&outcome));
    outcome
}

fn failed(query: &str, error: OracleError) -> QueryOutcome {
    METRICS.inc_query_failures();
    obs::emit_query_failed(query, &error);
    QueryOutcome::Failed {
        error: error.to_string(),
    }
}

fn outcome_label(outcome: &QueryOutcome) -> &'static str {
    match outcome {
        QueryOutcome::Found => "found",
        QueryOutcome::NoResults => "no_results",
        QueryOutcome::Failed { .. } => "failed",
    }
}
