//! Commits and ref updates as seen by the verification engine.

use serde::{Deserialize, Serialize};

/// All-zero object id git uses for the missing side of a ref creation or deletion.
pub const NULL_SHA: &str = "0000000000000000000000000000000000000000";

/// Identity recorded on a commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Committer {
    pub name: String,
    pub email: String,
}

impl Committer {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// A single commit introduced by a push. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Version-control object id.
    pub id: String,
    /// Full commit message.
    pub message: String,
    pub committer: Committer,
}

impl ChangeSet {
    pub fn new(id: impl Into<String>, message: impl Into<String>, committer: Committer) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
            committer,
        }
    }
}

/// An update of one named ref from `from_hash` to `to_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefChange {
    /// Full ref name, e.g. `refs/heads/main`.
    pub ref_id: String,
    pub from_hash: String,
    pub to_hash: String,
}

impl RefChange {
    pub fn new(
        ref_id: impl Into<String>,
        from_hash: impl Into<String>,
        to_hash: impl Into<String>,
    ) -> Self {
        Self {
            ref_id: ref_id.into(),
            from_hash: from_hash.into(),
            to_hash: to_hash.into(),
        }
    }

    /// Parse one line of git's pre-receive input: `<old> <new> <ref>`.
    pub fn parse_receive_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let from = parts.next()?;
        let to = parts.next()?;
        let ref_id = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(ref_id, from, to))
    }

    /// The ref is being deleted; no commits are introduced.
    pub fn is_delete(&self) -> bool {
        self.to_hash == NULL_SHA
    }

    /// The ref did not exist before this push.
    pub fn is_create(&self) -> bool {
        self.from_hash == NULL_SHA
    }

    /// First ten characters of the old hash.
    pub fn short_from(&self) -> &str {
        short(&self.from_hash)
    }

    /// First ten characters of the new hash.
    pub fn short_to(&self) -> &str {
        short(&self.to_hash)
    }
}

fn short(hash: &str) -> &str {
    hash.get(..10).unwrap_or(hash)
}
