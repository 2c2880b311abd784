//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{ArgAction, Parser};
use colored::control;
use thiserror::Error;

use ost_migrate::core::config::Settings;
use ost_migrate::core::errors::OstmError;
use ost_migrate::core::signals::SignalHandler;
use ost_migrate::core::targets::MigrationConfig;
use ost_migrate::layout::getstripe::LfsGetstripe;
use ost_migrate::logger::activity::{ActivityEvent, ActivityLogger};
use ost_migrate::logger::console::Console;
use ost_migrate::logger::jsonl::JsonlWriter;
use ost_migrate::scanner::dispatch::MigrationDispatcher;
use ost_migrate::scanner::visitor::MigrationVisitor;
use ost_migrate::scanner::walker::{TreeWalker, WalkOutcome};

/// Find files with stripes on evacuated Lustre OSTs and migrate them off.
#[derive(Debug, Parser)]
#[command(
    name = "ost-migrate",
    author,
    version,
    about = "Find files striped onto evacuated storage targets and migrate them",
    long_about = None
)]
pub struct Cli {
    /// Storage-target (OST) index to evacuate. Repeat for several targets.
    #[arg(short = 'o', long = "ost", value_name = "INDEX", required = true, action = ArgAction::Append)]
    ost: Vec<String>,
    /// Numeric base of every OST index: 10 or 16.
    #[arg(short = 'b', long = "base", value_name = "BASE", required = true)]
    base: String,
    /// Only report matching files; never start a migration.
    #[arg(short = 'f', long = "find-only", visible_alias = "dry-run")]
    find_only: bool,
    /// Root of the tree to walk.
    #[arg(value_name = "PATH")]
    root: PathBuf,
    /// Override config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Number of walk worker threads.
    #[arg(long, value_name = "N")]
    parallelism: Option<usize>,
    /// Migration program to run on each matching file.
    #[arg(long, value_name = "PROGRAM")]
    action: Option<String>,
    /// Append a JSONL activity record per event to this file.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
    /// Stop the walk after this many consecutive migration failures (0 never stops).
    #[arg(long, value_name = "N")]
    max_consecutive_failures: Option<u32>,
    /// Disable colored output.
    #[arg(long)]
    no_color: bool,
}

/// CLI-level error with an exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// The walk stopped before covering the whole tree.
    #[error("{0}")]
    Partial(String),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) => 3,
            Self::Partial(_) => 4,
        }
    }
}

impl From<OstmError> for CliError {
    fn from(err: OstmError) -> Self {
        if err.is_config_error() {
            Self::User(err.to_string())
        } else {
            Self::Runtime(err.to_string())
        }
    }
}

/// Resolve settings and run one walk.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    let color = !cli.no_color && std::env::var_os("NO_COLOR").is_none() && io::stderr().is_terminal();
    if !color {
        control::set_override(false);
    }

    let settings = resolve_settings(cli)?;
    let config = MigrationConfig::from_args(
        &cli.ost,
        &cli.base,
        cli.find_only,
        &cli.root,
        settings.targets.max_target_count,
    )?;
    let config_hash = settings.stable_hash()?;

    let jsonl = settings.paths.jsonl_log.as_ref().map(JsonlWriter::open);
    let logger = Arc::new(ActivityLogger::new(Console::stdio(color), jsonl));

    let layouts = LfsGetstripe::new(settings.layout.program.clone(), settings.layout.max_stripe_count)
        .map_err(|e| CliError::Internal(e.to_string()))?;
    let dispatcher = MigrationDispatcher::new(
        settings.action.spec(),
        Arc::clone(&logger),
        settings.safety.max_consecutive_failures,
    );
    let signals = SignalHandler::new();
    let visitor = MigrationVisitor::new(
        config.clone(),
        Box::new(layouts),
        dispatcher,
        Arc::clone(&logger),
    )
    .with_cancel(signals.shared_flag());

    logger.log(ActivityEvent::WalkStarted {
        root: config.root_path.clone(),
        targets: config.targets.to_string(),
        find_only: config.find_only,
        config_hash,
    });

    let start = Instant::now();
    let walker = TreeWalker::new(settings.walk.walker());
    let report = match walker.walk(&config.root_path, &visitor, signals.flag()) {
        Ok(report) => report,
        Err(e) => {
            logger.flush();
            return Err(e.into());
        }
    };

    if report.outcome == WalkOutcome::Cancelled {
        logger.log(ActivityEvent::WalkInterrupted);
    }
    #[allow(clippy::cast_possible_truncation)]
    let duration_ms = start.elapsed().as_millis() as u64;
    logger.log(ActivityEvent::WalkCompleted {
        outcome: report.outcome,
        entries_visited: report.entries_visited,
        duration_ms,
    });
    logger.flush();

    match report.outcome {
        WalkOutcome::Completed => Ok(()),
        WalkOutcome::Aborted => Err(CliError::Partial(
            "walk stopped after consecutive migration failures".to_string(),
        )),
        WalkOutcome::Cancelled => Err(CliError::Partial("walk interrupted by signal".to_string())),
    }
}

/// Config file and environment, then CLI flags on top.
fn resolve_settings(cli: &Cli) -> Result<Settings, CliError> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(parallelism) = cli.parallelism {
        settings.walk.parallelism = parallelism;
    }
    if let Some(action) = &cli.action {
        settings.action.program.clone_from(action);
    }
    if let Some(path) = &cli.log_file {
        settings.paths.jsonl_log = Some(path.clone());
    }
    if let Some(max) = cli.max_consecutive_failures {
        settings.safety.max_consecutive_failures = max;
    }
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_config() -> tempfile::NamedTempFile {
        tempfile::NamedTempFile::new().unwrap()
    }

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(args)
    }

    #[test]
    fn parses_repeated_targets_and_flags() {
        let cli = parse(&["ost-migrate", "-o", "5", "--ost", "6", "-o", "7", "-b", "10", "-f", "/lustre"])
            .unwrap();
        assert_eq!(cli.ost, vec!["5", "6", "7"]);
        assert_eq!(cli.base, "10");
        assert!(cli.find_only);
        assert_eq!(cli.root, PathBuf::from("/lustre"));
    }

    #[test]
    fn dry_run_is_an_alias_for_find_only() {
        let cli = parse(&["ost-migrate", "-o", "1f", "-b", "16", "--dry-run", "/lustre"]).unwrap();
        assert!(cli.find_only);
    }

    #[test]
    fn missing_required_arguments_are_usage_errors() {
        assert!(parse(&["ost-migrate", "-b", "10", "/lustre"]).is_err());
        assert!(parse(&["ost-migrate", "-o", "5", "/lustre"]).is_err());
        assert!(parse(&["ost-migrate", "-o", "5", "-b", "10"]).is_err());
        assert!(parse(&["ost-migrate", "-o", "5", "-b", "10", "/a", "/b"]).is_err());
    }

    #[test]
    fn parses_overrides() {
        let cli = parse(&[
            "ost-migrate",
            "-o",
            "5",
            "-b",
            "10",
            "--parallelism",
            "4",
            "--action",
            "/opt/bin/lfs_migrate",
            "--log-file",
            "/tmp/ostm.jsonl",
            "--max-consecutive-failures",
            "3",
            "--config",
            "/etc/ost-migrate.toml",
            "--no-color",
            "/lustre",
        ])
        .unwrap();
        assert_eq!(cli.parallelism, Some(4));
        assert_eq!(cli.action.as_deref(), Some("/opt/bin/lfs_migrate"));
        assert_eq!(cli.max_consecutive_failures, Some(3));
        assert!(cli.no_color);
    }

    #[test]
    fn cli_flags_override_config_file() {
        let file = empty_config();
        std::fs::write(file.path(), "[walk]\nparallelism = 2\n").unwrap();
        let path = file.path().to_string_lossy().into_owned();
        let cli = parse(&[
            "ost-migrate", "-o", "5", "-b", "10", "--config", &path, "--parallelism", "9",
            "--max-consecutive-failures", "4", "/lustre",
        ])
        .unwrap();
        let settings = resolve_settings(&cli).unwrap();
        assert_eq!(settings.walk.parallelism, 9);
        assert_eq!(settings.safety.max_consecutive_failures, 4);
    }

    #[test]
    fn unsupported_base_is_a_user_error() {
        let file = empty_config();
        let path = file.path().to_string_lossy().into_owned();
        let cli = parse(&["ost-migrate", "-o", "5", "-b", "8", "--config", &path, "/nonexistent"])
            .unwrap();
        let err = run(&cli).unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("OSTM-1006"), "{err}");
    }

    #[test]
    fn malformed_and_out_of_range_targets_are_user_errors() {
        let file = empty_config();
        let path = file.path().to_string_lossy().into_owned();
        for token in ["12abc", "1025", "0x10"] {
            let cli = parse(&["ost-migrate", "-o", token, "-b", "10", "--config", &path, "/nonexistent"])
                .unwrap();
            let err = run(&cli).unwrap_err();
            assert_eq!(err.exit_code(), 1, "token {token}: {err}");
        }
    }

    #[test]
    fn zero_parallelism_override_is_rejected() {
        let file = empty_config();
        let path = file.path().to_string_lossy().into_owned();
        let cli = parse(&[
            "ost-migrate", "-o", "5", "-b", "10", "--config", &path, "--parallelism", "0", "/lustre",
        ])
        .unwrap();
        let err = resolve_settings(&cli).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn exit_codes_follow_contract() {
        assert_eq!(CliError::User(String::new()).exit_code(), 1);
        assert_eq!(CliError::Runtime(String::new()).exit_code(), 2);
        assert_eq!(CliError::Internal(String::new()).exit_code(), 3);
        assert_eq!(CliError::Partial(String::new()).exit_code(), 4);
    }

    #[test]
    fn core_errors_map_by_kind() {
        let user: CliError = OstmError::UnsupportedBase {
            base: "8".to_string(),
        }
        .into();
        assert_eq!(user.exit_code(), 1);
        let runtime: CliError = OstmError::io("/lustre", io::Error::other("gone")).into();
        assert_eq!(runtime.exit_code(), 2);
    }
}
