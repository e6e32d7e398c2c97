//! Host boundary: turns a push into an accept/reject decision plus output.
//!
//! Evaluation errors never block a push. They are logged and the push is let
//! through with a notice appended to the output.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::Instrument;

use crate::domain::changeset::RefChange;
use crate::domain::error::Result;
use crate::domain::identity::AccountIdentity;
use crate::domain::settings::Settings;
use crate::engine::Verifier;
use crate::metrics::METRICS;
use crate::obs::{self, PushSpan};
use crate::reporter;
use crate::result::VerificationResult;

/// Notice printed to the client when a push is let through after an error.
pub fn fail_open_notice(error: &dyn std::fmt::Display) -> String {
    format!("Error while validating reference changes. Will allow all of them. \"{error}\"\n")
}

/// Supplies the settings snapshot for the target repository.
#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn settings(&self) -> Result<Settings>;
}

/// What the host should do with the push, and what to print to the client.
#[derive(Debug, Clone, Serialize)]
pub struct HookResponse {
    pub accepted: bool,
    pub output: String,
    /// The evaluated tree; absent when evaluation failed.
    pub result: Option<VerificationResult>,
}

/// Pre-receive hook wiring a [`SettingsSource`] to a [`Verifier`].
pub struct PushHook {
    settings: Arc<dyn SettingsSource>,
    verifier: Verifier,
    hook_name: Option<String>,
}

impl PushHook {
    pub fn new(settings: Arc<dyn SettingsSource>, verifier: Verifier) -> Self {
        Self {
            settings,
            verifier,
            hook_name: None,
        }
    }

    /// Name printed at the top of every report.
    pub fn with_hook_name(mut self, name: impl Into<String>) -> Self {
        self.hook_name = Some(name.into());
        self
    }

    /// Evaluate a push and decide whether to let it through.
    ///
    /// Dry-run mode and, when enabled, service-account pushes are always
    /// accepted, though still fully evaluated and reported.
    pub async fn on_receive(
        &self,
        ref_changes: &[RefChange],
        pusher: &AccountIdentity,
    ) -> HookResponse {
        let span = PushSpan::new();
        self.receive(ref_changes, pusher)
            .instrument(span.span().clone())
            .await
    }

    async fn receive(&self, ref_changes: &[RefChange], pusher: &AccountIdentity) -> HookResponse {
        let mut output = String::new();
        if let Some(name) = &self.hook_name {
            output.push_str(name);
            output.push_str("\n\n");
        }

        let (settings, result) = match self.evaluate(ref_changes, pusher).await {
            Ok(evaluated) => evaluated,
            Err(e) => {
                METRICS.inc_fail_opens();
                obs::emit_fail_open(&e);
                output.push_str(&fail_open_notice(&e));
                return HookResponse {
                    accepted: true,
                    output,
                    result: None,
                };
            }
        };

        output.push_str(&reporter::render(&result, &settings, pusher));
        if settings.dry_run {
            if let Some(message) = &settings.dry_run_message {
                output.push('\n');
                output.push_str(message);
                output.push('\n');
            }
        }

        let exempt = settings.allow_service_accounts && pusher.is_service();
        let enforced = !settings.dry_run && !exempt;
        let accepted = !enforced || result.is_accepted();

        obs::emit_push_evaluated(
            result.is_accepted(),
            result.changeset_count(),
            result.rejected_count(),
            enforced,
        );
        METRICS.flush();

        HookResponse {
            accepted,
            output,
            result: Some(result),
        }
    }

    async fn evaluate(
        &self,
        ref_changes: &[RefChange],
        pusher: &AccountIdentity,
    ) -> Result<(Settings, VerificationResult)> {
        let settings = self.settings.settings().await?;
        let result = self.verifier.evaluate(ref_changes, &settings, pusher).await?;
        Ok((settings, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::changeset::{ChangeSet, Committer};
    use crate::domain::settings::{AcceptPolicy, Rule, RuleGroup};
    use crate::fakes::{FailingSettings, ScriptedOracle, StaticChangeSets, StaticSettings};

    fn pusher() -> AccountIdentity {
        AccountIdentity::new("tomas", "Tomas", "my@email.com")
    }

    fn push() -> Vec<RefChange> {
        vec![RefChange::new("refs/heads/master", "e2bc4ed0035", "af35d5c1a4b")]
    }

    fn hook(settings: Settings) -> PushHook {
        let changesets = StaticChangeSets::new().with_ref(
            "refs/heads/master",
            vec![ChangeSet::new(
                "1",
                "fixing stuff",
                Committer::new("Tomas", "my@email.com"),
            )],
        );
        let verifier = Verifier::new(Arc::new(changesets), Arc::new(ScriptedOracle::new()));
        PushHook::new(Arc::new(StaticSettings::new(settings)), verifier)
    }

    fn rejecting() -> Settings {
        Settings::default()
            .with_group(RuleGroup::new(AcceptPolicy::Accept).with_rule(Rule::new(r"[A-Z]+-\d+")))
    }

    #[tokio::test]
    async fn rejection_is_enforced() {
        let response = hook(rejecting()).on_receive(&push(), &pusher()).await;
        assert!(!response.accepted);
        assert!(!response.result.unwrap().is_accepted());
    }

    #[tokio::test]
    async fn hook_name_heads_output() {
        let response = hook(Settings::default())
            .with_hook_name("Simple Stash Commit Checker")
            .on_receive(&push(), &pusher())
            .await;
        assert!(response.accepted);
        assert_eq!(response.output, "Simple Stash Commit Checker\n\n");
    }

    #[tokio::test]
    async fn dry_run_always_accepts() {
        let settings = rejecting().with_dry_run(Some("Dry run, nothing blocked".into()));
        let response = hook(settings).on_receive(&push(), &pusher()).await;

        assert!(response.accepted);
        assert!(!response.result.unwrap().is_accepted());
        assert!(response.output.ends_with("\nDry run, nothing blocked\n"));
    }

    #[tokio::test]
    async fn dry_run_without_message_adds_nothing() {
        let enforced = hook(rejecting()).on_receive(&push(), &pusher()).await;
        let dry = hook(rejecting().with_dry_run(None))
            .on_receive(&push(), &pusher())
            .await;
        assert!(dry.accepted);
        assert_eq!(dry.output, enforced.output);
    }

    #[tokio::test]
    async fn service_account_exemption() {
        let service = pusher().service();

        let exempt = hook(rejecting().allowing_service_accounts())
            .on_receive(&push(), &service)
            .await;
        assert!(exempt.accepted);
        assert!(exempt.output.contains(">>> fixing stuff"));

        let normal = hook(rejecting().allowing_service_accounts())
            .on_receive(&push(), &pusher())
            .await;
        assert!(!normal.accepted);

        let not_allowed = hook(rejecting()).on_receive(&push(), &service).await;
        assert!(!not_allowed.accepted);
    }

    #[tokio::test]
    async fn settings_failure_fails_open() {
        let verifier = Verifier::new(
            Arc::new(StaticChangeSets::new()),
            Arc::new(ScriptedOracle::new()),
        );
        let hook = PushHook::new(Arc::new(FailingSettings::new("bad file")), verifier);

        let response = hook.on_receive(&push(), &pusher()).await;

        assert!(response.accepted);
        assert!(response.result.is_none());
        assert_eq!(
            response.output,
            "Error while validating reference changes. Will allow all of them. \"invalid settings: bad file\"\n"
        );
    }

    #[tokio::test]
    async fn provider_failure_fails_open() {
        let verifier = Verifier::new(
            Arc::new(StaticChangeSets::failing("repository locked")),
            Arc::new(ScriptedOracle::new()),
        );
        let hook = PushHook::new(Arc::new(StaticSettings::new(rejecting())), verifier);

        let response = hook.on_receive(&push(), &pusher()).await;

        assert!(response.accepted);
        assert!(response.output.contains("repository locked"));
    }
}
