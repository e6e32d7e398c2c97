//! Query oracle that shells out to an operator-supplied command.
//!
//! The query is passed as the last argument. Exit status 0 with non-empty
//! stdout means "has results"; exit status 1 or empty stdout means none.
//! Anything else is a failure.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use pushgate_core::{OracleError, QueryOracle};

#[derive(Debug, Clone, Default)]
pub struct CommandOracle {
    command: Vec<String>,
}

impl CommandOracle {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl QueryOracle for CommandOracle {
    async fn has_results(&self, query: &str) -> Result<bool, OracleError> {
        let Some((exe, args)) = self.command.split_first() else {
            return Err(OracleError::Unavailable("no query command configured".into()));
        };

        let output = Command::new(exe)
            .args(args)
            .arg(query)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| OracleError::Unavailable(format!("failed to run {exe}: {e}")))?;

        match output.status.code() {
            Some(0) => Ok(!String::from_utf8_lossy(&output.stdout).trim().is_empty()),
            Some(1) => Ok(false),
            _ => Err(OracleError::Failed(format!(
                "{exe} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }
}
