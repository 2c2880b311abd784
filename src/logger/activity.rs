//! Activity fan-out: typed walk events to the console and the JSONL log.
//!
//! Walk workers call [`ActivityLogger::log`] directly. Each event yields at
//! most one console line and at most one JSONL record, and bumps the run
//! counters that feed the end-of-walk summary.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

use crate::core::errors::OstmError;
use crate::logger::console::Console;
use crate::logger::jsonl::{EventType, JsonlWriter, LogEntry, Severity};
use crate::platform::process::ExitStatus;
use crate::scanner::walker::WalkOutcome;

/// Everything the walk reports.
#[derive(Debug)]
pub enum ActivityEvent {
    WalkStarted {
        root: PathBuf,
        targets: String,
        find_only: bool,
        config_hash: String,
    },
    UnreadableDirectory {
        path: PathBuf,
        reason: String,
    },
    UnstatableEntry {
        path: PathBuf,
        reason: String,
    },
    /// Carries an [`OstmError::LayoutQuery`].
    LayoutQueryFailed(OstmError),
    EmptyLayout {
        path: PathBuf,
    },
    /// Find-only report of a matching file.
    Candidate {
        path: PathBuf,
    },
    MigrationStarted {
        path: PathBuf,
    },
    MigrationSucceeded {
        path: PathBuf,
        duration_ms: u64,
    },
    /// Carries an [`OstmError::ActionFailed`].
    MigrationFailed {
        error: OstmError,
        duration_ms: u64,
    },
    /// Carries an [`OstmError::ActionSpawn`].
    DispatchFailed(OstmError),
    /// Carries an [`OstmError::FailureBreaker`].
    BreakerTripped(OstmError),
    WalkInterrupted,
    WalkCompleted {
        outcome: WalkOutcome,
        entries_visited: u64,
        duration_ms: u64,
    },
}

/// Run counters, updated concurrently by walk workers.
#[derive(Debug, Default)]
pub struct RunStats {
    files_examined: AtomicU64,
    layout_failures: AtomicU64,
    empty_layouts: AtomicU64,
    matched: AtomicU64,
    reported: AtomicU64,
    migrated: AtomicU64,
    migration_failures: AtomicU64,
    dispatch_failures: AtomicU64,
    unreadable_dirs: AtomicU64,
    unstatable_entries: AtomicU64,
}

impl RunStats {
    /// A regular file was handed to the layout query.
    pub fn note_file_examined(&self) {
        self.files_examined.fetch_add(1, Ordering::Relaxed);
    }

    /// A file's layout overlapped the evacuated targets.
    pub fn note_match(&self) {
        self.matched.fetch_add(1, Ordering::Relaxed);
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record(&self, event: &ActivityEvent) {
        match event {
            ActivityEvent::UnreadableDirectory { .. } => Self::bump(&self.unreadable_dirs),
            ActivityEvent::UnstatableEntry { .. } => Self::bump(&self.unstatable_entries),
            ActivityEvent::LayoutQueryFailed(_) => Self::bump(&self.layout_failures),
            ActivityEvent::EmptyLayout { .. } => Self::bump(&self.empty_layouts),
            ActivityEvent::Candidate { .. } => Self::bump(&self.reported),
            ActivityEvent::MigrationSucceeded { .. } => Self::bump(&self.migrated),
            ActivityEvent::MigrationFailed { .. } => Self::bump(&self.migration_failures),
            ActivityEvent::DispatchFailed(_) => Self::bump(&self.dispatch_failures),
            ActivityEvent::WalkStarted { .. }
            | ActivityEvent::MigrationStarted { .. }
            | ActivityEvent::BreakerTripped(_)
            | ActivityEvent::WalkInterrupted
            | ActivityEvent::WalkCompleted { .. } => {}
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> RunSummary {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        RunSummary {
            outcome: None,
            entries_visited: 0,
            files_examined: load(&self.files_examined),
            layout_failures: load(&self.layout_failures),
            empty_layouts: load(&self.empty_layouts),
            matched: load(&self.matched),
            reported: load(&self.reported),
            migrated: load(&self.migrated),
            migration_failures: load(&self.migration_failures),
            dispatch_failures: load(&self.dispatch_failures),
            unreadable_dirs: load(&self.unreadable_dirs),
            unstatable_entries: load(&self.unstatable_entries),
            duration_ms: 0,
        }
    }
}

/// End-of-walk totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub outcome: Option<WalkOutcome>,
    pub entries_visited: u64,
    pub files_examined: u64,
    pub layout_failures: u64,
    pub empty_layouts: u64,
    pub matched: u64,
    pub reported: u64,
    pub migrated: u64,
    pub migration_failures: u64,
    pub dispatch_failures: u64,
    pub unreadable_dirs: u64,
    pub unstatable_entries: u64,
    pub duration_ms: u64,
}

impl RunSummary {
    /// One-line human summary.
    #[must_use]
    pub fn render(&self) -> String {
        let outcome = self.outcome.map_or("finished", WalkOutcome::as_str);
        #[allow(clippy::cast_precision_loss)]
        let secs = self.duration_ms as f64 / 1000.0;
        format!(
            "walk {outcome} in {secs:.1}s: {} entries, {} files examined, {} matched, \
             {} reported, {} migrated, {} migration failures, {} launch failures, \
             {} layout errors, {} unreadable directories, {} unstatable entries",
            self.entries_visited,
            self.files_examined,
            self.matched,
            self.reported,
            self.migrated,
            self.migration_failures,
            self.dispatch_failures,
            self.layout_failures,
            self.unreadable_dirs,
            self.unstatable_entries,
        )
    }

    /// Failures the operator has to follow up on.
    #[must_use]
    pub const fn failure_count(&self) -> u64 {
        self.layout_failures + self.migration_failures + self.dispatch_failures
    }
}

/// Shared logger handed to every walk worker by reference.
pub struct ActivityLogger {
    console: Console,
    jsonl: Option<Mutex<JsonlWriter>>,
    stats: RunStats,
}

impl ActivityLogger {
    #[must_use]
    pub fn new(console: Console, jsonl: Option<JsonlWriter>) -> Self {
        Self {
            console,
            jsonl: jsonl.map(Mutex::new),
            stats: RunStats::default(),
        }
    }

    #[must_use]
    pub const fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn log(&self, event: ActivityEvent) {
        self.stats.record(&event);
        let summary = match &event {
            ActivityEvent::WalkCompleted {
                outcome,
                entries_visited,
                duration_ms,
            } => {
                let mut summary = self.stats.snapshot();
                summary.outcome = Some(*outcome);
                summary.entries_visited = *entries_visited;
                summary.duration_ms = *duration_ms;
                Some(summary)
            }
            _ => None,
        };

        self.write_console(&event, summary.as_ref());
        if let Some(jsonl) = &self.jsonl {
            let entry = to_log_entry(&event, summary.as_ref());
            let degraded = {
                let mut writer = jsonl.lock();
                writer.write_entry(&entry);
                if summary.is_some() {
                    writer.fsync();
                }
                (summary.is_some() && writer.state() == "stderr")
                    .then(|| (writer.path().to_path_buf(), writer.lines_written()))
            };
            if let Some((path, written)) = degraded {
                self.console.warning(&format!(
                    "activity log {} failed after {written} records; the rest went to stderr",
                    path.display()
                ));
            }
        }
    }

    /// Final totals of the run so far.
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        self.stats.snapshot()
    }

    pub fn flush(&self) {
        self.console.flush();
        if let Some(jsonl) = &self.jsonl {
            jsonl.lock().fsync();
        }
    }

    fn write_console(&self, event: &ActivityEvent, summary: Option<&RunSummary>) {
        match event {
            ActivityEvent::WalkStarted {
                root,
                targets,
                find_only,
                ..
            } => {
                let mode = if *find_only { "find-only" } else { "migrating" };
                self.console.info(&format!(
                    "walking with root as: {} (targets {targets}, {mode})",
                    root.display()
                ));
            }
            ActivityEvent::UnreadableDirectory { path, reason } => {
                self.console
                    .warning(&format!("unreadable directory: {}: {reason}", path.display()));
            }
            ActivityEvent::UnstatableEntry { path, reason } => {
                self.console
                    .warning(&format!("unstatable file: {}: {reason}", path.display()));
            }
            ActivityEvent::Candidate { path } => {
                self.console
                    .info(&format!("found a file to migrate: {}", path.display()));
            }
            ActivityEvent::MigrationStarted { path } => {
                self.console.info(&format!("migrating: {}", path.display()));
            }
            ActivityEvent::LayoutQueryFailed(error)
            | ActivityEvent::MigrationFailed { error, .. }
            | ActivityEvent::DispatchFailed(error)
            | ActivityEvent::BreakerTripped(error) => {
                self.console.error(&error.to_string());
            }
            ActivityEvent::WalkInterrupted => {
                self.console.warning("walk interrupted, stopping");
            }
            ActivityEvent::WalkCompleted { .. } => {
                if let Some(summary) = summary {
                    self.console.info(&summary.render());
                    let failures = summary.failure_count();
                    if failures > 0 {
                        self.console
                            .warning(&format!("{failures} files need follow-up, see the errors above"));
                    }
                }
            }
            ActivityEvent::EmptyLayout { .. } | ActivityEvent::MigrationSucceeded { .. } => {}
        }
    }
}

fn to_log_entry(event: &ActivityEvent, summary: Option<&RunSummary>) -> LogEntry {
    match event {
        ActivityEvent::WalkStarted {
            root,
            targets,
            find_only,
            config_hash,
        } => LogEntry::new(EventType::WalkStart, Severity::Info)
            .with_path(root)
            .with_details(format!(
                "targets={targets} find_only={find_only} config_hash={config_hash}"
            )),
        ActivityEvent::UnreadableDirectory { path, reason } => {
            LogEntry::new(EventType::UnreadableDirectory, Severity::Warning)
                .with_path(path)
                .with_details(reason.clone())
        }
        ActivityEvent::UnstatableEntry { path, reason } => {
            LogEntry::new(EventType::UnstatableEntry, Severity::Warning)
                .with_path(path)
                .with_details(reason.clone())
        }
        ActivityEvent::LayoutQueryFailed(error) => {
            LogEntry::new(EventType::LayoutQueryFailed, Severity::Error).with_error(error)
        }
        ActivityEvent::EmptyLayout { path } => {
            LogEntry::new(EventType::EmptyLayout, Severity::Info).with_path(path)
        }
        ActivityEvent::Candidate { path } => {
            LogEntry::new(EventType::MigrationCandidate, Severity::Info).with_path(path)
        }
        ActivityEvent::MigrationStarted { path } => {
            LogEntry::new(EventType::MigrationStart, Severity::Info).with_path(path)
        }
        ActivityEvent::MigrationSucceeded { path, duration_ms } => {
            let mut e = LogEntry::new(EventType::MigrationSucceeded, Severity::Info).with_path(path);
            e.duration_ms = Some(*duration_ms);
            e.ok = Some(true);
            e.status = Some(ExitStatus::ExitedWithCode(0).to_string());
            e
        }
        ActivityEvent::MigrationFailed { error, duration_ms } => {
            let mut e = LogEntry::new(EventType::MigrationFailed, Severity::Error).with_error(error);
            e.duration_ms = Some(*duration_ms);
            if let OstmError::ActionFailed { status, .. } = error {
                e.status = Some(status.to_string());
            }
            e
        }
        ActivityEvent::DispatchFailed(error) => {
            LogEntry::new(EventType::DispatchFailed, Severity::Error).with_error(error)
        }
        ActivityEvent::BreakerTripped(error) => {
            LogEntry::new(EventType::FailureBreaker, Severity::Error).with_error(error)
        }
        ActivityEvent::WalkInterrupted => {
            LogEntry::new(EventType::WalkInterrupted, Severity::Warning)
        }
        ActivityEvent::WalkCompleted { duration_ms, .. } => {
            let mut e = LogEntry::new(EventType::WalkComplete, Severity::Info);
            e.duration_ms = Some(*duration_ms);
            e.details = summary.and_then(|s| serde_json::to_string(s).ok());
            e
        }
    }
}
