//! Pushgate - commit acceptance policy for git pushes
//!
//! ## Commands
//!
//! - `pre-receive`: run as a git pre-receive hook; reads `<old> <new> <ref>`
//!   lines on stdin and exits non-zero when the push is rejected
//! - `check`: evaluate an existing commit range against the settings

mod git;
mod oracle;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{warn, Level};

use pushgate_core::metrics::METRICS;
use pushgate_core::obs;
use pushgate_core::{
    fail_open_notice, AccountIdentity, CachedOracle, ChangeSetProvider, DirectoryCache,
    FileSettingsSource, HookResponse, PushHook, QueryCache, QueryOracle, RefChange, SettingsFile,
    StaticDirectory, Verifier,
};

use crate::git::GitChangeSets;
use crate::oracle::CommandOracle;

#[derive(Parser)]
#[command(name = "pushgate")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Commit acceptance policy for git pushes", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Print the verification result as JSON instead of the text report
    #[arg(long, global = true)]
    json: bool,

    /// Settings file
    #[arg(long, global = true, env = "PUSHGATE_SETTINGS", default_value = "pushgate.toml")]
    settings: PathBuf,

    /// Repository to read commits from
    #[arg(long, global = true, default_value = ".")]
    repo: PathBuf,

    /// Name printed at the top of the report
    #[arg(long, global = true)]
    hook_name: Option<String>,

    /// Login name of the pushing account
    #[arg(long, global = true, env = "PUSHGATE_USER", default_value = "")]
    user: String,

    /// Display name of the pushing account
    #[arg(long, global = true, env = "PUSHGATE_NAME", default_value = "")]
    name: String,

    /// Email of the pushing account
    #[arg(long, global = true, env = "PUSHGATE_EMAIL", default_value = "")]
    email: String,

    /// The pushing account is a service account
    #[arg(long, global = true, env = "PUSHGATE_SERVICE")]
    service: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a push from git pre-receive input on stdin
    PreReceive,

    /// Evaluate an existing commit range
    Check {
        /// Commit range, e.g. `origin/main..HEAD`
        #[arg(long)]
        range: String,

        /// Ref name reported for the range
        #[arg(long = "ref", default_value = "HEAD")]
        ref_name: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    pushgate_core::telemetry::init_tracing(cli.log_json, level);

    match run(&cli).await {
        Ok(code) => Ok(code),
        // A pre-receive hook that exits non-zero blocks the push.
        Err(e) if matches!(cli.command, Commands::PreReceive) => {
            let error = format!("{e:#}");
            METRICS.inc_fail_opens();
            obs::emit_fail_open(&error);
            // Best effort: stdout may be the thing that failed.
            let _ = write!(io::stdout(), "{}", fail_open_notice(&error));
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Err(e),
    }
}

async fn run(cli: &Cli) -> Result<ExitCode> {
    let (ref_changes, changesets) = match &cli.command {
        Commands::PreReceive => {
            let provider: Arc<dyn ChangeSetProvider> = Arc::new(GitChangeSets::new(&cli.repo));
            (read_ref_changes(io::stdin().lock())?, provider)
        }
        Commands::Check { range, ref_name } => {
            let provider: Arc<dyn ChangeSetProvider> =
                Arc::new(GitChangeSets::for_range(&cli.repo, range));
            (vec![range_ref_change(&cli.repo, range, ref_name).await?], provider)
        }
    };

    let hook = build_hook(cli, changesets);
    let pusher = pusher(cli);
    let response = hook.on_receive(&ref_changes, &pusher).await;

    print_response(&response, cli.json)?;
    Ok(if response.accepted {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn pusher(cli: &Cli) -> AccountIdentity {
    let identity = AccountIdentity::new(&cli.user, &cli.name, &cli.email);
    if cli.service {
        identity.service()
    } else {
        identity
    }
}

/// Wire settings, oracle and directory caches into a hook.
///
/// The settings file is read here only for the oracle command and cache
/// sizing. The hook reads it again, so a broken file still fails open.
fn build_hook(cli: &Cli, changesets: Arc<dyn ChangeSetProvider>) -> PushHook {
    let file = match SettingsFile::load(&cli.settings) {
        Ok(file) => file,
        Err(e) => {
            warn!(path = %cli.settings.display(), error = %e, "could not read settings");
            SettingsFile::default()
        }
    };
    let cache = file.cache_settings();

    let command: Arc<dyn QueryOracle> = Arc::new(CommandOracle::new(
        file.query_command().map(<[String]>::to_vec).unwrap_or_default(),
    ));
    let oracle = CachedOracle::new(
        command,
        Arc::new(QueryCache::new(cache.query_capacity)),
        cache.query_ttl,
    );
    let directory = DirectoryCache::new(
        Arc::new(StaticDirectory::new(file.accounts())),
        cache.directory_ttl,
    );

    let verifier = Verifier::new(changesets, Arc::new(oracle)).with_directory(Arc::new(directory));
    let hook = PushHook::new(Arc::new(FileSettingsSource::new(&cli.settings)), verifier);
    match &cli.hook_name {
        Some(name) => hook.with_hook_name(name),
        None => hook,
    }
}

/// Parse git pre-receive input. Malformed lines are skipped; ref names that
/// are not valid UTF-8 are decoded lossily.
fn read_ref_changes(mut input: impl BufRead) -> Result<Vec<RefChange>> {
    let mut ref_changes = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = input
            .read_until(b'\n', &mut buf)
            .context("failed to read pre-receive input")?;
        if read == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        if line.trim().is_empty() {
            continue;
        }
        match RefChange::parse_receive_line(&line) {
            Some(rc) => ref_changes.push(rc),
            None => warn!(line = %line.trim_end(), "ignoring malformed pre-receive line"),
        }
    }
    Ok(ref_changes)
}

async fn range_ref_change(repo: &Path, range: &str, ref_name: &str) -> Result<RefChange> {
    let Some((from, to)) = range.split_once("..") else {
        bail!("range must look like <from>..<to>, got '{range}'");
    };
    let from = git::rev_parse(repo, from).await?;
    let to = git::rev_parse(repo, to).await?;
    Ok(RefChange::new(ref_name, from, to))
}

fn print_response(response: &HookResponse, json: bool) -> Result<()> {
    let mut stdout = io::stdout().lock();
    if json {
        writeln!(stdout, "{}", serde_json::to_string_pretty(response)?)?;
    } else {
        write!(stdout, "{}", response.output)?;
    }
    stdout.flush()?;
    Ok(())
}
