//! TOML settings file.
//!
//! Every field is optional. Regexes and templates are compiled when the file
//! is turned into [`Settings`]; a bad pattern is logged and kept as an invalid
//! entry rather than rejecting the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::error::Result;
use crate::domain::identity::{AccountIdentity, AccountKind};
use crate::domain::settings::{
    AcceptPolicy, CacheSettings, IdentityRequirements, MissingTokenPolicy, QueryCheck, Rule,
    RuleGroup, Settings, DEFAULT_QUERY_TIMEOUT,
};
use crate::hook::SettingsSource;
use crate::obs;

/// On-disk settings, as written by an operator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsFile {
    pub accept_message: Option<String>,
    pub reject_message: Option<String>,
    pub dry_run: bool,
    pub dry_run_message: Option<String>,
    pub allow_service_accounts: bool,
    pub identity: IdentityRequirements,
    pub query: QuerySection,
    pub groups: Vec<GroupSection>,
    pub cache: CacheSection,
    pub directory: DirectorySection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySection {
    pub enabled: bool,
    pub template: String,
    pub extraction_regex: Option<String>,
    pub message: Option<String>,
    pub missing_token: MissingTokenPolicy,
    pub timeout_ms: u64,
    /// Program and leading arguments of the query oracle; the query is
    /// appended as the last argument.
    pub command: Vec<String>,
}

impl Default for QuerySection {
    fn default() -> Self {
        Self {
            enabled: false,
            template: String::new(),
            extraction_regex: None,
            message: None,
            missing_token: MissingTokenPolicy::default(),
            timeout_ms: u64::try_from(DEFAULT_QUERY_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
            command: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSection {
    pub accept: AcceptPolicy,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub rules: Vec<RuleSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSection {
    pub regex: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub query_ttl_secs: u64,
    pub query_capacity: usize,
    pub directory_ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        let defaults = CacheSettings::default();
        Self {
            query_ttl_secs: defaults.query_ttl.as_secs(),
            query_capacity: defaults.query_capacity,
            directory_ttl_secs: defaults.directory_ttl.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorySection {
    pub accounts: Vec<AccountSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSection {
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub service: bool,
}

impl SettingsFile {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Query oracle command, if the query check is configured with one.
    pub fn query_command(&self) -> Option<&[String]> {
        (!self.query.command.is_empty()).then_some(self.query.command.as_slice())
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            query_ttl: Duration::from_secs(self.cache.query_ttl_secs),
            query_capacity: self.cache.query_capacity,
            directory_ttl: Duration::from_secs(self.cache.directory_ttl_secs),
        }
    }

    /// Accounts of the static user directory.
    pub fn accounts(&self) -> Vec<AccountIdentity> {
        self.directory
            .accounts
            .iter()
            .map(|a| AccountIdentity {
                username: a.username.clone(),
                display_name: a.display_name.clone(),
                email: a.email.clone(),
                kind: if a.service {
                    AccountKind::Service
                } else {
                    AccountKind::Normal
                },
            })
            .collect()
    }

    /// Compile into the immutable snapshot used for evaluation.
    pub fn to_settings(&self) -> Settings {
        let groups = self
            .groups
            .iter()
            .map(|g| {
                let mut group = RuleGroup::new(g.accept);
                group.message = g.message.clone();
                for r in &g.rules {
                    let mut rule = Rule::new(&r.regex);
                    rule.message = r.message.clone();
                    group = group.with_rule(rule);
                }
                group
            })
            .collect();

        let settings = Settings {
            accept_message: self.accept_message.clone(),
            reject_message: self.reject_message.clone(),
            dry_run: self.dry_run,
            dry_run_message: self.dry_run_message.clone(),
            allow_service_accounts: self.allow_service_accounts,
            identity: self.identity.clone(),
            query: self.query_check(),
            groups,
            cache: self.cache_settings(),
            accounts: self.accounts(),
        };

        for detail in settings.config_errors() {
            obs::emit_invalid_setting(&detail);
        }
        settings
    }

    fn query_check(&self) -> Option<QueryCheck> {
        let q = &self.query;
        if !q.enabled {
            return None;
        }
        let mut check = QueryCheck::new(q.template.clone())
            .with_missing_token(q.missing_token)
            .with_timeout(Duration::from_millis(q.timeout_ms));
        if let Some(regex) = &q.extraction_regex {
            check = check.with_extraction(regex);
        }
        if let Some(message) = &q.message {
            check = check.with_message(message.clone());
        }
        if q.template.trim().is_empty() {
            check.template_error = Some("query check is enabled but has no template".into());
        }
        Some(check)
    }
}

/// Reads the settings file on every push.
#[derive(Debug, Clone)]
pub struct FileSettingsSource {
    path: PathBuf,
}

impl FileSettingsSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SettingsSource for FileSettingsSource {
    async fn settings(&self) -> Result<Settings> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        Ok(SettingsFile::from_toml_str(&content)?.to_settings())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::GateError;

    const SAMPLE: &str = r#"
reject_message = "Rejected, see below"
dry_run = true
dry_run_message = "Dry run"
allow_service_accounts = true

[identity]
require_matching_email = true
require_matching_email_message = "Use your own email"

[query]
enabled = true
template = "issue = ${REGEXP}"
extraction_regex = '\b[A-Z][A-Z0-9]+-\d+\b'
message = "Issue must exist!"
missing_token = "reject"
timeout_ms = 2500
command = ["jira-query", "--count"]

[[groups]]
accept = "accept"
message = "You need to specify an issue"

[[groups.rules]]
regex = '[A-Z]+-\d+'
message = "JIRA"

[[groups]]
accept = "show_message"
message = "Remember to move the issue"

[cache]
query_ttl_secs = 60

[[directory.accounts]]
username = "ci"
display_name = "Build Bot"
email = "ci@example.com"
service = true
"#;

    #[test]
    fn empty_file_is_default() {
        let settings = SettingsFile::from_toml_str("").unwrap().to_settings();
        assert!(settings.query.is_none());
        assert!(settings.groups.is_empty());
        assert!(!settings.dry_run);
        assert_eq!(settings.cache, CacheSettings::default());
    }

    #[test]
    fn query_section_defaults_to_ten_second_timeout() {
        let file = SettingsFile::from_toml_str("[query]\nenabled = true\ntemplate = \"x\"\n")
            .unwrap();
        assert_eq!(file.query.timeout_ms, 10_000);
        let query = file.to_settings().query.unwrap();
        assert_eq!(query.timeout, DEFAULT_QUERY_TIMEOUT);
    }

    #[test]
    fn sample_file_compiles() {
        let file = SettingsFile::from_toml_str(SAMPLE).unwrap();
        assert_eq!(
            file.query_command(),
            Some(&["jira-query".to_string(), "--count".to_string()][..])
        );

        let settings = file.to_settings();
        assert_eq!(settings.reject_message.as_deref(), Some("Rejected, see below"));
        assert!(settings.dry_run);
        assert!(settings.allow_service_accounts);
        assert!(settings.identity.require_matching_email);
        assert!(!settings.identity.require_matching_name);

        let query = settings.query.as_ref().unwrap();
        assert!(query.uses_token());
        assert_eq!(query.missing_token, MissingTokenPolicy::Reject);
        assert_eq!(query.timeout, Duration::from_millis(2500));
        assert!(query.extraction.as_ref().unwrap().regex().is_some());

        assert_eq!(settings.groups.len(), 2);
        assert_eq!(settings.groups[0].accept, AcceptPolicy::Accept);
        assert_eq!(settings.groups[0].rules[0].message.as_deref(), Some("JIRA"));
        assert_eq!(settings.groups[1].accept, AcceptPolicy::ShowMessage);

        assert_eq!(settings.cache.query_ttl, Duration::from_secs(60));
        assert_eq!(settings.cache.query_capacity, 1024);
        assert!(settings.accounts[0].is_service());
        assert!(settings.config_errors().is_empty());
    }

    #[test]
    fn bad_regex_does_not_reject_file() {
        let file = SettingsFile::from_toml_str(
            r#"
[[groups]]
accept = "reject"
[[groups.rules]]
regex = "([A-Z"
"#,
        )
        .unwrap();
        let settings = file.to_settings();
        assert_eq!(settings.config_errors().len(), 1);
        assert!(settings.groups[0].rules[0].pattern.regex().is_none());
    }

    #[test]
    fn enabled_query_without_template_is_config_error() {
        let settings = SettingsFile::from_toml_str("[query]\nenabled = true\n")
            .unwrap()
            .to_settings();
        let query = settings.query.unwrap();
        assert!(query.template_error.unwrap().contains("no template"));
    }

    #[test]
    fn unknown_accept_policy_is_parse_error() {
        let err = SettingsFile::from_toml_str("[[groups]]\naccept = \"maybe\"\n").unwrap_err();
        assert!(matches!(err, GateError::SettingsParse(_)));
    }

    #[tokio::test]
    async fn file_source_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pushgate.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let settings = FileSettingsSource::new(&path).settings().await.unwrap();
        assert_eq!(settings.groups.len(), 2);

        let missing = FileSettingsSource::new(dir.path().join("absent.toml"));
        assert!(matches!(missing.settings().await, Err(GateError::Io(_))));
    }
}
