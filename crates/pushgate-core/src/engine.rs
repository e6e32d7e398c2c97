//! Verification engine: ref changes -> commits -> checks -> result tree.
//!
//! Ref changes of a push, and commits of a ref change, are evaluated
//! concurrently. Results keep input order.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{join_all, try_join_all};

use crate::cache::{DirectoryCache, DirectorySnapshot};
use crate::domain::changeset::{ChangeSet, RefChange};
use crate::domain::error::Result;
use crate::domain::identity::AccountIdentity;
use crate::domain::settings::Settings;
use crate::identity::verify_identity;
use crate::metrics::METRICS;
use crate::obs;
use crate::query::{verify_query, QueryOracle};
use crate::result::{
    ChangeSetVerificationResult, RefChangeVerificationResult, VerificationResult,
    VerifiedChangeSet,
};
use crate::rules::evaluate_group;
use crate::template::Variables;

/// Supplies the commits a ref change introduces, oldest first or in whatever
/// order the host reports them. Commits already on the target ref must not
/// be returned.
#[async_trait]
pub trait ChangeSetProvider: Send + Sync {
    async fn changesets(&self, ref_change: &RefChange) -> Result<Vec<ChangeSet>>;
}

/// Evaluates a push against a [`Settings`] snapshot.
pub struct Verifier {
    changesets: Arc<dyn ChangeSetProvider>,
    oracle: Arc<dyn QueryOracle>,
    directory: Option<Arc<DirectoryCache>>,
}

/// Per-push state shared read-only by all commit evaluations.
struct PushContext<'a> {
    settings: &'a Settings,
    pusher: &'a AccountIdentity,
    variables: Variables,
    directory: Option<Arc<DirectorySnapshot>>,
}

impl Verifier {
    pub fn new(changesets: Arc<dyn ChangeSetProvider>, oracle: Arc<dyn QueryOracle>) -> Self {
        Self {
            changesets,
            oracle,
            directory: None,
        }
    }

    /// Use `directory` for the known-committer check.
    pub fn with_directory(mut self, directory: Arc<DirectoryCache>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Evaluate every ref change of one push.
    ///
    /// Only a failing change-set provider makes this return an error;
    /// oracle failures and bad patterns are recorded in the tree.
    pub async fn evaluate(
        &self,
        ref_changes: &[RefChange],
        settings: &Settings,
        pusher: &AccountIdentity,
    ) -> Result<VerificationResult> {
        METRICS.inc_pushes();
        obs::emit_push_started(&pusher.username, ref_changes.len());

        let ctx = PushContext {
            settings,
            pusher,
            variables: Variables::for_pusher(pusher),
            directory: self.directory_snapshot(settings).await,
        };

        let refs = try_join_all(ref_changes.iter().map(|rc| self.evaluate_ref(rc, &ctx))).await?;
        Ok(VerificationResult::new(refs))
    }

    async fn directory_snapshot(&self, settings: &Settings) -> Option<Arc<DirectorySnapshot>> {
        if !settings.identity.require_known_committer {
            return None;
        }
        let directory = self.directory.as_ref()?;
        match directory.snapshot().await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(error = %e, "user directory unavailable, skipping known-committer check");
                None
            }
        }
    }

    async fn evaluate_ref(
        &self,
        ref_change: &RefChange,
        ctx: &PushContext<'_>,
    ) -> Result<RefChangeVerificationResult> {
        let changesets = if ref_change.is_delete() {
            Vec::new()
        } else {
            self.changesets.changesets(ref_change).await?
        };

        let verified = join_all(changesets.into_iter().map(|changeset| async move {
            let result = self.evaluate_changeset(&changeset, ctx).await;
            VerifiedChangeSet { changeset, result }
        }))
        .await;

        Ok(RefChangeVerificationResult {
            ref_change: ref_change.clone(),
            changesets: verified,
        })
    }

    async fn evaluate_changeset(
        &self,
        changeset: &ChangeSet,
        ctx: &PushContext<'_>,
    ) -> ChangeSetVerificationResult {
        METRICS.inc_changesets();
        let settings = ctx.settings;

        let identity = verify_identity(
            &changeset.committer,
            ctx.pusher,
            &settings.identity,
            ctx.directory.as_deref(),
        );

        let groups = settings
            .groups
            .iter()
            .enumerate()
            .map(|(i, group)| evaluate_group(i + 1, group, &changeset.message))
            .collect();

        let query = match &settings.query {
            Some(check) => Some(
                verify_query(check, &changeset.message, &ctx.variables, self.oracle.as_ref())
                    .await,
            ),
            None => None,
        };

        ChangeSetVerificationResult {
            identity,
            groups,
            query,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::changeset::{Committer, NULL_SHA};
    use std::time::Duration;

    use crate::domain::settings::{
        AcceptPolicy, IdentityRequirements, QueryCheck, Rule, RuleGroup,
    };
    use crate::fakes::{CountingDirectory, ScriptedOracle, StaticChangeSets};
    use crate::result::IdentityCheck;

    fn pusher() -> AccountIdentity {
        AccountIdentity::new("tomas", "Tomas", "my@email.com")
    }

    fn commit(id: &str, message: &str) -> ChangeSet {
        ChangeSet::new(id, message, Committer::new("Tomas", "my@email.com"))
    }

    fn master() -> RefChange {
        RefChange::new("refs/heads/master", "e2bc4ed0035", "af35d5c1a4b")
    }

    fn verifier(changesets: StaticChangeSets, oracle: ScriptedOracle) -> Verifier {
        Verifier::new(Arc::new(changesets), Arc::new(oracle))
    }

    fn issue_group() -> RuleGroup {
        RuleGroup::new(AcceptPolicy::Accept).with_rule(Rule::new(r"[A-Z]+-\d+"))
    }

    #[tokio::test]
    async fn commit_order_is_preserved() {
        let changesets = StaticChangeSets::new().with_ref(
            "refs/heads/master",
            vec![commit("1", "AB-1 one"), commit("2", "two"), commit("3", "CD-3 three")],
        );
        let settings = Settings::default().with_group(issue_group());

        let result = verifier(changesets, ScriptedOracle::new())
            .evaluate(&[master()], &settings, &pusher())
            .await
            .unwrap();

        let ids: Vec<_> = result.ref_changes[0]
            .changesets
            .iter()
            .map(|c| c.changeset.id.as_str())
            .collect();
        assert_eq!(ids, ["1", "2", "3"]);
        assert!(!result.is_accepted());
        assert_eq!(result.rejected_count(), 1);
        assert!(!result.ref_changes[0].changesets[1].result.is_accepted());
    }

    #[tokio::test]
    async fn groups_numbered_in_settings_order() {
        let changesets = StaticChangeSets::new()
            .with_ref("refs/heads/master", vec![commit("1", "AB-1 fixing stuff")]);
        let settings = Settings::default()
            .with_group(issue_group())
            .with_group(RuleGroup::new(AcceptPolicy::Reject).with_rule(Rule::new("WIP")));

        let result = verifier(changesets, ScriptedOracle::new())
            .evaluate(&[master()], &settings, &pusher())
            .await
            .unwrap();

        let groups = &result.ref_changes[0].changesets[0].result.groups;
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].group_index, 1);
        assert_eq!(groups[1].group_index, 2);
        assert!(result.is_accepted());
    }

    #[tokio::test]
    async fn deleted_ref_introduces_nothing() {
        let deleted = RefChange::new("refs/heads/old", "e2bc4ed0035", NULL_SHA);
        let changesets = StaticChangeSets::new();
        let settings = Settings::default().with_group(issue_group());

        let result = verifier(changesets, ScriptedOracle::new())
            .evaluate(&[deleted], &settings, &pusher())
            .await
            .unwrap();

        assert!(result.is_accepted());
        assert_eq!(result.changeset_count(), 0);
    }

    #[tokio::test]
    async fn query_check_runs_per_commit() {
        let changesets = StaticChangeSets::new().with_ref(
            "refs/heads/master",
            vec![commit("1", "AB-1 first"), commit("2", "CD-2 second")],
        );
        let oracle = ScriptedOracle::new()
            .with_response("issue = AB-1", Ok(true))
            .with_response("issue = CD-2", Ok(false));
        let settings = Settings::default().with_query(
            QueryCheck::new("issue = ${REGEXP}").with_extraction(r"[A-Z]+-\d+"),
        );

        let result = verifier(changesets, oracle)
            .evaluate(&[master()], &settings, &pusher())
            .await
            .unwrap();

        let commits = &result.ref_changes[0].changesets;
        assert!(commits[0].result.is_accepted());
        assert!(!commits[1].result.is_accepted());
        assert!(!result.is_accepted());
    }

    #[tokio::test]
    async fn provider_failure_is_an_error() {
        let changesets = StaticChangeSets::failing("repository unavailable");
        let result = verifier(changesets, ScriptedOracle::new())
            .evaluate(&[master()], &Settings::default(), &pusher())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn multiple_refs_keep_input_order() {
        let changesets = StaticChangeSets::new()
            .with_ref("refs/heads/a", vec![commit("1", "AB-1")])
            .with_ref("refs/heads/b", vec![commit("2", "nothing")]);
        let refs = [
            RefChange::new("refs/heads/a", "1111111111", "2222222222"),
            RefChange::new("refs/heads/b", "3333333333", "4444444444"),
        ];
        let settings = Settings::default().with_group(issue_group());

        let result = verifier(changesets, ScriptedOracle::new())
            .evaluate(&refs, &settings, &pusher())
            .await
            .unwrap();

        assert_eq!(result.ref_changes[0].ref_change.ref_id, "refs/heads/a");
        assert!(result.ref_changes[0].is_accepted());
        assert_eq!(result.ref_changes[1].ref_change.ref_id, "refs/heads/b");
        assert!(!result.ref_changes[1].is_accepted());
    }

    fn known_committer_settings() -> Settings {
        Settings::default().with_identity(IdentityRequirements {
            require_known_committer: true,
            require_known_committer_message: Some("Commit as yourself".into()),
            ..IdentityRequirements::default()
        })
    }

    fn directory_verifier(
        changesets: StaticChangeSets,
        directory: Arc<CountingDirectory>,
    ) -> Verifier {
        let cache = DirectoryCache::new(directory, Duration::from_secs(60));
        verifier(changesets, ScriptedOracle::new()).with_directory(Arc::new(cache))
    }

    #[tokio::test]
    async fn committers_are_checked_against_directory() {
        let changesets = StaticChangeSets::new().with_ref(
            "refs/heads/master",
            vec![
                commit("1", "AB-1 mine"),
                ChangeSet::new("2", "AB-2 theirs", Committer::new("Stranger", "s@example.com")),
            ],
        );
        let directory = Arc::new(CountingDirectory::new(vec![pusher()]));

        let result = directory_verifier(changesets, Arc::clone(&directory))
            .evaluate(&[master()], &known_committer_settings(), &pusher())
            .await
            .unwrap();

        let commits = &result.ref_changes[0].changesets;
        assert_eq!(commits[0].result.identity.committer_known, Some(true));
        assert!(commits[0].result.is_accepted());
        assert_eq!(commits[1].result.identity.committer_known, Some(false));
        let violation = commits[1]
            .result
            .identity
            .violated(IdentityCheck::KnownCommitter)
            .unwrap();
        assert_eq!(violation.message.as_deref(), Some("Commit as yourself"));
        assert!(!result.is_accepted());
        assert_eq!(directory.calls(), 1);
    }

    #[tokio::test]
    async fn unavailable_directory_skips_known_committer_check() {
        let changesets = StaticChangeSets::new().with_ref(
            "refs/heads/master",
            vec![ChangeSet::new("1", "AB-1", Committer::new("Stranger", "s@example.com"))],
        );
        let directory = Arc::new(CountingDirectory::new(vec![pusher()]));
        directory.set_failing(true);

        let result = directory_verifier(changesets, Arc::clone(&directory))
            .evaluate(&[master()], &known_committer_settings(), &pusher())
            .await
            .unwrap();

        let identity = &result.ref_changes[0].changesets[0].result.identity;
        assert_eq!(identity.committer_known, None);
        assert!(identity.violations.is_empty());
        assert!(result.is_accepted());
        assert_eq!(directory.calls(), 1);
    }

    #[tokio::test]
    async fn directory_is_not_consulted_unless_required() {
        let changesets =
            StaticChangeSets::new().with_ref("refs/heads/master", vec![commit("1", "AB-1")]);
        let directory = Arc::new(CountingDirectory::new(Vec::new()));

        let result = directory_verifier(changesets, Arc::clone(&directory))
            .evaluate(&[master()], &Settings::default(), &pusher())
            .await
            .unwrap();

        assert!(result.is_accepted());
        assert_eq!(directory.calls(), 0);
    }
}
