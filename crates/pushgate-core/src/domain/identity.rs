//! Account identity of the user performing a push.

use serde::{Deserialize, Serialize};

/// Kind of account behind a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    #[default]
    Normal,
    /// Automated/service account; may be exempted from enforcement.
    Service,
}

/// Identity of an account as supplied by the host or the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountIdentity {
    /// Login name.
    pub username: String,
    /// Human display name, compared against the commit's committer name.
    pub display_name: String,
    pub email: String,
    #[serde(default)]
    pub kind: AccountKind,
}

impl AccountIdentity {
    pub fn new(
        username: impl Into<String>,
        display_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            display_name: display_name.into(),
            email: email.into(),
            kind: AccountKind::Normal,
        }
    }

    /// Mark this identity as a service account.
    pub fn service(mut self) -> Self {
        self.kind = AccountKind::Service;
        self
    }

    pub fn is_service(&self) -> bool {
        self.kind == AccountKind::Service
    }
}
