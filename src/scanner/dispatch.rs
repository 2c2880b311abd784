//! Migration dispatcher: report a matched file, or run the migration action on
//! it and supervise the child to completion.
//!
//! The only blocking point is the wait for the child; it blocks the calling
//! walk worker and nothing else. Failed migrations are never retried. An
//! optional breaker stops the walk after a run of consecutive failures.

#![allow(missing_docs)]

use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Instant;

use crate::core::errors::OstmError;
use crate::core::targets::MigrationConfig;
use crate::logger::activity::{ActivityEvent, ActivityLogger};
use crate::platform::process::ExitStatus;

/// Default migration action.
pub const DEFAULT_ACTION_PROGRAM: &str = "lfs_migrate";

/// Skip-confirmation flag of the default action.
pub const DEFAULT_ACTION_ARGS: &[&str] = &["-y"];

/// Program plus the arguments placed before the file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for ActionSpec {
    fn default() -> Self {
        Self {
            program: DEFAULT_ACTION_PROGRAM.to_string(),
            args: DEFAULT_ACTION_ARGS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl ActionSpec {
    /// Invocation for one file: `<program> <args...> <path>`.
    #[must_use]
    pub fn command(&self, path: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(path).stdin(Stdio::null());
        cmd
    }
}

/// Result of handing one matched file to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Find-only mode: the file was reported, nothing was run.
    Reported,
    /// The action ran to termination.
    Dispatched(ExitStatus),
    /// The action could not be started.
    DispatchFailed(String),
}

impl ActionOutcome {
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        match self {
            Self::Reported => false,
            Self::Dispatched(status) => !status.success(),
            Self::DispatchFailed(_) => true,
        }
    }
}

/// Counts consecutive action failures across all workers. A threshold of 0
/// disables it.
#[derive(Debug, Default)]
pub struct FailureBreaker {
    threshold: u32,
    consecutive: AtomicU32,
    tripped: AtomicBool,
}

impl FailureBreaker {
    #[must_use]
    pub const fn new(threshold: u32) -> Self {
        Self {
            threshold,
            consecutive: AtomicU32::new(0),
            tripped: AtomicBool::new(false),
        }
    }

    pub fn record_success(&self) {
        self.consecutive.store(0, Ordering::Release);
    }

    /// Returns the run length the first time the threshold is reached.
    pub fn record_failure(&self) -> Option<u32> {
        if self.threshold == 0 {
            return None;
        }
        let run = self.consecutive.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        if run >= self.threshold && !self.tripped.swap(true, Ordering::AcqRel) {
            return Some(run);
        }
        None
    }

    #[must_use]
    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }
}

/// Runs (or reports) the migration action for matched files.
pub struct MigrationDispatcher {
    action: ActionSpec,
    logger: Arc<ActivityLogger>,
    breaker: FailureBreaker,
}

impl MigrationDispatcher {
    #[must_use]
    pub fn new(action: ActionSpec, logger: Arc<ActivityLogger>, max_consecutive_failures: u32) -> Self {
        Self {
            action,
            logger,
            breaker: FailureBreaker::new(max_consecutive_failures),
        }
    }

    /// Whether the consecutive-failure breaker has tripped.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.breaker.is_tripped()
    }

    pub fn dispatch(&self, path: &Path, config: &MigrationConfig) -> ActionOutcome {
        if config.find_only {
            self.logger.log(ActivityEvent::Candidate {
                path: path.to_path_buf(),
            });
            return ActionOutcome::Reported;
        }

        self.logger.log(ActivityEvent::MigrationStarted {
            path: path.to_path_buf(),
        });
        let start = Instant::now();

        let status = match self.action.command(path).status() {
            Ok(status) => ExitStatus::from(status),
            Err(source) => {
                let reason = source.to_string();
                self.logger
                    .log(ActivityEvent::DispatchFailed(OstmError::ActionSpawn {
                        path: path.to_path_buf(),
                        program: self.action.program.clone(),
                        source,
                    }));
                self.note_failure();
                return ActionOutcome::DispatchFailed(reason);
            }
        };

        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;

        if status.success() {
            self.breaker.record_success();
            self.logger.log(ActivityEvent::MigrationSucceeded {
                path: path.to_path_buf(),
                duration_ms,
            });
        } else {
            self.logger.log(ActivityEvent::MigrationFailed {
                error: OstmError::ActionFailed {
                    path: path.to_path_buf(),
                    program: self.action.program.clone(),
                    status,
                },
                duration_ms,
            });
            self.note_failure();
        }

        ActionOutcome::Dispatched(status)
    }

    fn note_failure(&self) {
        if let Some(consecutive) = self.breaker.record_failure() {
            self.logger
                .log(ActivityEvent::BreakerTripped(OstmError::FailureBreaker {
                    consecutive,
                }));
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::targets::{NumericBase, TargetSet};
    use crate::logger::console::{CaptureBuffer, capture};

    fn config(find_only: bool) -> MigrationConfig {
        MigrationConfig {
            targets: TargetSet::from_indices(vec![5, 6, 7], 1024).unwrap(),
            base: NumericBase::Decimal,
            find_only,
            root_path: "/lustre".into(),
        }
    }

    /// `sh -c <script> ostm <path>`: the file path lands in `$1`.
    fn shell_action(script: &str) -> ActionSpec {
        ActionSpec {
            program: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), script.to_string(), "ostm".to_string()],
        }
    }

    fn dispatcher(action: ActionSpec, breaker: u32) -> (MigrationDispatcher, CaptureBuffer, CaptureBuffer) {
        let (console, out, err) = capture();
        let logger = Arc::new(ActivityLogger::new(console, None));
        (MigrationDispatcher::new(action, logger, breaker), out, err)
    }

    #[test]
    fn default_action_skips_confirmation() {
        let spec = ActionSpec::default();
        assert_eq!(spec.program, "lfs_migrate");
        assert_eq!(spec.args, vec!["-y"]);
        let cmd = spec.command(Path::new("/lustre/a"));
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, vec!["-y", "/lustre/a"]);
    }

    #[test]
    fn find_only_reports_without_running_anything() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let (d, out, err) = dispatcher(shell_action(&format!("touch {}", marker.display())), 0);

        let outcome = d.dispatch(Path::new("/lustre/run/out.h5"), &config(true));

        assert_eq!(outcome, ActionOutcome::Reported);
        assert!(!marker.exists());
        assert_eq!(out.lines(), vec!["found a file to migrate: /lustre/run/out.h5"]);
        assert!(err.contents().is_empty());
    }

    #[test]
    fn zero_exit_is_silent_success() {
        let (d, out, err) = dispatcher(shell_action("exit 0"), 0);
        let outcome = d.dispatch(Path::new("/lustre/a"), &config(false));
        assert_eq!(outcome, ActionOutcome::Dispatched(ExitStatus::ExitedWithCode(0)));
        assert!(err.contents().is_empty());
        assert_eq!(out.lines(), vec!["migrating: /lustre/a"]);
    }

    #[test]
    fn path_is_passed_as_last_argument() {
        let (d, _out, err) = dispatcher(shell_action(r#"test "$1" = /lustre/run/x.dat"#), 0);
        let outcome = d.dispatch(Path::new("/lustre/run/x.dat"), &config(false));
        assert_eq!(outcome, ActionOutcome::Dispatched(ExitStatus::ExitedWithCode(0)));
        assert!(err.contents().is_empty());
    }

    #[test]
    fn nonzero_exit_logs_exactly_one_error_line() {
        let (d, _out, err) = dispatcher(shell_action("exit 1"), 0);
        let outcome = d.dispatch(Path::new("/lustre/b"), &config(false));

        assert_eq!(outcome, ActionOutcome::Dispatched(ExitStatus::ExitedWithCode(1)));
        let lines = err.lines();
        assert_eq!(lines.len(), 1, "{lines:?}");
        assert!(lines[0].contains("/lustre/b"));
        assert!(lines[0].contains("exited with status: 1"));
        assert!(lines[0].contains("OSTM-3102"));
    }

    #[test]
    fn signal_death_is_decoded_and_logged() {
        let (d, _out, err) = dispatcher(shell_action("kill -9 $$"), 0);
        let outcome = d.dispatch(Path::new("/lustre/c"), &config(false));
        assert_eq!(outcome, ActionOutcome::Dispatched(ExitStatus::TerminatedBySignal(9)));
        let lines = err.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("terminated by signal: 9"), "{}", lines[0]);
    }

    #[test]
    fn missing_program_is_dispatch_failure() {
        let action = ActionSpec {
            program: "/definitely/not/lfs_migrate".to_string(),
            args: vec!["-y".to_string()],
        };
        let (d, _out, err) = dispatcher(action, 0);
        let outcome = d.dispatch(Path::new("/lustre/d"), &config(false));

        assert!(matches!(outcome, ActionOutcome::DispatchFailed(_)));
        assert!(outcome.is_failure());
        let lines = err.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("OSTM-3101") && lines[0].contains("/lustre/d"));
    }

    #[test]
    fn failures_never_trip_a_disabled_breaker() {
        let (d, _out, _err) = dispatcher(shell_action("exit 3"), 0);
        for _ in 0..5 {
            d.dispatch(Path::new("/lustre/e"), &config(false));
        }
        assert!(!d.should_stop());
    }

    #[test]
    fn breaker_trips_once_after_consecutive_failures() {
        let (d, _out, err) = dispatcher(shell_action("exit 3"), 2);
        d.dispatch(Path::new("/lustre/e1"), &config(false));
        assert!(!d.should_stop());
        d.dispatch(Path::new("/lustre/e2"), &config(false));
        assert!(d.should_stop());
        d.dispatch(Path::new("/lustre/e3"), &config(false));

        let trips = err.lines().iter().filter(|l| l.contains("OSTM-3103")).count();
        assert_eq!(trips, 1);
    }

    #[test]
    fn success_resets_the_failure_run() {
        let breaker = FailureBreaker::new(2);
        assert_eq!(breaker.record_failure(), None);
        breaker.record_success();
        assert_eq!(breaker.record_failure(), None);
        assert_eq!(breaker.record_failure(), Some(2));
        assert!(breaker.is_tripped());
        assert_eq!(breaker.record_failure(), None);
    }
}
