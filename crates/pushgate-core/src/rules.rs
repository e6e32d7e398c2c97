//! Rule group evaluation against a commit message.
//!
//! Pure and deterministic: no I/O, no oracle calls.

use crate::domain::settings::{AcceptPolicy, RuleGroup};
use crate::pattern;
use crate::result::GroupOutcome;

/// Evaluate `group` (at `group_index` in settings) against `message`.
///
/// - `Accept`: satisfied iff at least one rule matches. On success the group
///   message and the matched rules' messages are surfaced, in that order.
/// - `Reject`: satisfied iff no rule matches. A violation surfaces the group
///   message and the matched rules' messages as rejection reasons.
/// - `ShowMessage`: always satisfied; the group message is always surfaced.
///
/// A rule whose pattern failed to compile makes an `Accept` or `Reject` group
/// unsatisfied and is recorded as a configuration error.
pub fn evaluate_group(group_index: usize, group: &RuleGroup, message: &str) -> GroupOutcome {
    let mut matched_rules = Vec::new();
    let mut config_error = None;

    for (index, rule) in group.rules.iter().enumerate() {
        match rule.pattern.regex() {
            Some(regex) => {
                if pattern::matches(regex, message) {
                    matched_rules.push(index);
                }
            }
            None => {
                if config_error.is_none() {
                    config_error = rule.pattern.error();
                }
            }
        }
    }

    let matched_messages = matched_rules
        .iter()
        .filter_map(|&i| group.rules[i].message.clone());

    let (satisfied, messages) = match group.accept {
        AcceptPolicy::Accept => {
            if matched_rules.is_empty() {
                (false, Vec::new())
            } else {
                (
                    true,
                    group.message.clone().into_iter().chain(matched_messages).collect(),
                )
            }
        }
        AcceptPolicy::Reject => {
            if matched_rules.is_empty() {
                (true, Vec::new())
            } else {
                (
                    false,
                    group.message.clone().into_iter().chain(matched_messages).collect(),
                )
            }
        }
        AcceptPolicy::ShowMessage => (true, group.message.clone().into_iter().collect()),
    };

    let satisfied = satisfied && (config_error.is_none() || group.accept == AcceptPolicy::ShowMessage);

    GroupOutcome {
        group_index,
        accept: group.accept,
        matched_rules,
        satisfied,
        messages,
        config_error,
    }
}
