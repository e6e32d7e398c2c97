//! `${NAME}` variable substitution for query templates and messages.
//!
//! Kept separate from regex extraction: callers extract tokens first and bind
//! them as [`Variable::Regexp`] before substituting.

use std::collections::BTreeMap;

use crate::domain::identity::AccountIdentity;

/// Variables an operator may reference from templates and messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Variable {
    /// Login name of the pushing account.
    PusherUser,
    /// Display name of the pushing account.
    PusherName,
    /// Email of the pushing account.
    PusherEmail,
    /// Token extracted from the commit message.
    Regexp,
}

impl Variable {
    pub const ALL: [Variable; 4] = [
        Variable::PusherUser,
        Variable::PusherName,
        Variable::PusherEmail,
        Variable::Regexp,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Variable::PusherUser => "PUSHER_USER",
            Variable::PusherName => "PUSHER_NAME",
            Variable::PusherEmail => "PUSHER_EMAIL",
            Variable::Regexp => "REGEXP",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.name() == name)
    }

    /// The placeholder as it appears in a template, e.g. `${REGEXP}`.
    pub fn placeholder(self) -> String {
        format!("${{{}}}", self.name())
    }
}

/// Bound values for substitution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables(BTreeMap<Variable, String>);

impl Variables {
    /// Bind the pusher variables from an account identity.
    pub fn for_pusher(pusher: &AccountIdentity) -> Self {
        Self::default()
            .with(Variable::PusherUser, &pusher.username)
            .with(Variable::PusherName, &pusher.display_name)
            .with(Variable::PusherEmail, &pusher.email)
    }

    pub fn with(mut self, variable: Variable, value: impl Into<String>) -> Self {
        self.0.insert(variable, value.into());
        self
    }

    pub fn get(&self, variable: Variable) -> Option<&str> {
        self.0.get(&variable).map(String::as_str)
    }
}

/// Names of all `${NAME}` placeholders in `template`, in order of appearance.
pub fn placeholders(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                names.push(&after[..end]);
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    names
}

/// Placeholders in `template` that do not name a known [`Variable`].
pub fn unresolvable(template: &str) -> Vec<String> {
    placeholders(template)
        .into_iter()
        .filter(|name| Variable::from_name(name).is_none())
        .map(str::to_string)
        .collect()
}

/// Replace every bound placeholder in `template`.
///
/// Unknown or unbound placeholders are left verbatim; templates are validated
/// with [`unresolvable`] when settings are built.
pub fn substitute(template: &str, variables: &Variables) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..end];
        match Variable::from_name(name).and_then(|v| variables.get(v)) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}
