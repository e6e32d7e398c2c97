//! Change-set provider backed by the `git` executable.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use pushgate_core::{ChangeSet, ChangeSetProvider, Committer, GateError, RefChange, Result};

const FIELD: char = '\u{1f}';
const RECORD: char = '\u{1e}';
const LOG_FORMAT: &str = "--format=%H%x1f%cn%x1f%ce%x1f%B%x1e";

/// Reads commits introduced by a ref change from a local repository.
#[derive(Debug, Clone)]
pub struct GitChangeSets {
    repo: PathBuf,
    range: Option<String>,
}

impl GitChangeSets {
    /// Commits reachable from the new hash but from no existing ref, as seen
    /// from inside a pre-receive hook.
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            range: None,
        }
    }

    /// Commits of an explicit `<from>..<to>` range, whatever the ref change says.
    pub fn for_range(repo: impl Into<PathBuf>, range: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            range: Some(range.into()),
        }
    }
}

#[async_trait]
impl ChangeSetProvider for GitChangeSets {
    async fn changesets(&self, ref_change: &RefChange) -> Result<Vec<ChangeSet>> {
        let mut args = vec![
            "log".to_string(),
            "--reverse".to_string(),
            LOG_FORMAT.to_string(),
        ];
        match &self.range {
            Some(range) => args.push(range.clone()),
            None => args.extend([ref_change.to_hash.clone(), "--not".into(), "--all".into()]),
        }

        let stdout = git(&self.repo, &args).await.map_err(|reason| GateError::ChangeSets {
            ref_id: ref_change.ref_id.clone(),
            reason,
        })?;
        Ok(parse_log(&stdout))
    }
}

/// Resolve a revision to its full object id.
pub async fn rev_parse(repo: &Path, rev: &str) -> Result<String> {
    let args = ["rev-parse".to_string(), "--verify".to_string(), format!("{rev}^{{commit}}")];
    git(repo, &args)
        .await
        .map(|out| out.trim().to_string())
        .map_err(|reason| GateError::ChangeSets {
            ref_id: rev.to_string(),
            reason,
        })
}

async fn git(repo: &Path, args: &[String]) -> std::result::Result<String, String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .await
        .map_err(|e| format!("failed to run git: {e}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let subcommand = args.first().map_or("", String::as_str);
        return Err(format!("git {subcommand} failed: {}", stderr.trim()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse `git log` output produced with [`LOG_FORMAT`].
fn parse_log(stdout: &str) -> Vec<ChangeSet> {
    stdout
        .split(RECORD)
        .map(|record| record.trim_start_matches('\n'))
        .filter(|record| !record.is_empty())
        .filter_map(|record| {
            let mut fields = record.splitn(4, FIELD);
            let id = fields.next()?;
            let name = fields.next()?;
            let email = fields.next()?;
            let message = fields.next().unwrap_or_default().trim_end();
            Some(ChangeSet::new(id, message, Committer::new(name, email)))
        })
        .collect()
}
