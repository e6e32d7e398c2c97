//! In-memory fakes for collaborator traits (testing only)
//!
//! Provides `ScriptedOracle`, `StaticChangeSets`, `StaticSettings`,
//! `FailingSettings` and `CountingDirectory`, which satisfy the trait
//! contracts without git, a network or a settings file.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::AccountDirectory;
use crate::domain::changeset::{ChangeSet, RefChange};
use crate::domain::error::{GateError, OracleError, Result};
use crate::domain::identity::AccountIdentity;
use crate::domain::settings::Settings;
use crate::engine::ChangeSetProvider;
use crate::hook::SettingsSource;
use crate::query::QueryOracle;

// ---------------------------------------------------------------------------
// ScriptedOracle
// ---------------------------------------------------------------------------

/// Oracle answering from a per-query script. Unscripted queries fail.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    responses: HashMap<String, std::result::Result<bool, OracleError>>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(
        mut self,
        query: impl Into<String>,
        response: std::result::Result<bool, OracleError>,
    ) -> Self {
        self.responses.insert(query.into(), response);
        self
    }

    /// Sleep for `delay` before answering `query`.
    pub fn with_delay(mut self, query: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(query.into(), delay);
        self
    }

    /// Every query received, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, query: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|q| *q == query).count()
    }
}

#[async_trait]
impl QueryOracle for ScriptedOracle {
    async fn has_results(&self, query: &str) -> std::result::Result<bool, OracleError> {
        self.calls.lock().unwrap().push(query.to_string());
        if let Some(delay) = self.delays.get(query) {
            tokio::time::sleep(*delay).await;
        }
        self.responses
            .get(query)
            .cloned()
            .unwrap_or_else(|| Err(OracleError::Failed(format!("no scripted response for '{query}'"))))
    }
}

// ---------------------------------------------------------------------------
// StaticChangeSets
// ---------------------------------------------------------------------------

/// Change-set provider backed by a `HashMap<ref_id, commits>`.
#[derive(Debug, Default)]
pub struct StaticChangeSets {
    by_ref: HashMap<String, Vec<ChangeSet>>,
    failure: Option<String>,
}

impl StaticChangeSets {
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider whose every lookup fails with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            by_ref: HashMap::new(),
            failure: Some(reason.into()),
        }
    }

    pub fn with_ref(mut self, ref_id: impl Into<String>, changesets: Vec<ChangeSet>) -> Self {
        self.by_ref.insert(ref_id.into(), changesets);
        self
    }
}

#[async_trait]
impl ChangeSetProvider for StaticChangeSets {
    async fn changesets(&self, ref_change: &RefChange) -> Result<Vec<ChangeSet>> {
        if let Some(reason) = &self.failure {
            return Err(GateError::ChangeSets {
                ref_id: ref_change.ref_id.clone(),
                reason: reason.clone(),
            });
        }
        Ok(self.by_ref.get(&ref_change.ref_id).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Settings sources
// ---------------------------------------------------------------------------

/// Settings source returning a fixed snapshot.
#[derive(Debug, Default)]
pub struct StaticSettings {
    settings: Settings,
}

impl StaticSettings {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl SettingsSource for StaticSettings {
    async fn settings(&self) -> Result<Settings> {
        Ok(self.settings.clone())
    }
}

/// Settings source that always fails.
#[derive(Debug)]
pub struct FailingSettings {
    reason: String,
}

impl FailingSettings {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl SettingsSource for FailingSettings {
    async fn settings(&self) -> Result<Settings> {
        Err(GateError::InvalidSettings(self.reason.clone()))
    }
}

// ---------------------------------------------------------------------------
// CountingDirectory
// ---------------------------------------------------------------------------

/// Account directory that counts loads and can be switched to fail.
#[derive(Debug, Default)]
pub struct CountingDirectory {
    accounts: Vec<AccountIdentity>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl CountingDirectory {
    pub fn new(accounts: Vec<AccountIdentity>) -> Self {
        Self {
            accounts,
            ..Default::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of times `accounts` was called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountDirectory for CountingDirectory {
    async fn accounts(&self) -> Result<Vec<AccountIdentity>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(GateError::Directory("directory offline".into()));
        }
        Ok(self.accounts.clone())
    }
}
