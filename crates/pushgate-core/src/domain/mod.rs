//! Domain models for pushgate.
//!
//! - `ChangeSet` / `RefChange`: what a push introduces
//! - `AccountIdentity`: who is pushing
//! - `Settings`: the per-repository policy snapshot

pub mod changeset;
pub mod error;
pub mod identity;
pub mod settings;

// Re-export main types and errors
pub use changeset::{ChangeSet, Committer, RefChange, NULL_SHA};
pub use error::{GateError, OracleError, Result};
pub use identity::{AccountIdentity, AccountKind};
pub use settings::{
    AcceptPolicy, CacheSettings, IdentityRequirements, MissingTokenPolicy, Pattern, QueryCheck,
    Rule, RuleGroup, Settings,
};
