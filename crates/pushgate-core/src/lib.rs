//! Pushgate Core Library
//!
//! Commit-acceptance policy engine for git pushes: rule groups over commit
//! messages, committer identity checks and external query checks, folded
//! into a verification tree and an accept/reject decision.

pub mod cache;
pub mod config;
pub mod domain;
pub mod engine;
pub mod fakes;
pub mod hook;
pub mod identity;
pub mod metrics;
pub mod obs;
pub mod pattern;
pub mod query;
pub mod reporter;
pub mod result;
pub mod rules;
pub mod telemetry;
pub mod template;

pub use domain::{
    AcceptPolicy, AccountIdentity, AccountKind, CacheSettings, ChangeSet, Committer, GateError,
    IdentityRequirements, MissingTokenPolicy, OracleError, QueryCheck, RefChange, Result, Rule,
    RuleGroup, Settings, NULL_SHA,
};

pub use cache::{
    AccountDirectory, CachedOracle, DirectoryCache, DirectorySnapshot, QueryCache,
    StaticDirectory,
};
pub use config::{FileSettingsSource, SettingsFile};
pub use engine::{ChangeSetProvider, Verifier};
pub use hook::{fail_open_notice, HookResponse, PushHook, SettingsSource};
pub use identity::verify_identity;
pub use query::{verify_query, QueryOracle};
pub use reporter::render;
pub use result::{
    ChangeSetVerificationResult, GroupOutcome, IdentityCheck, IdentityResult, QueryAttempt,
    QueryCheckResult, QueryOutcome, RefChangeVerificationResult, VerificationResult,
    VerifiedChangeSet,
};
pub use rules::evaluate_group;
pub use template::{Variable, Variables};

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
