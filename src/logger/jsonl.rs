//! JSONL activity log: one self-contained JSON object per line.
//!
//! Lines are assembled in memory and written with a single `write_all` on a
//! file opened in append mode, so concurrent tailers never see a partial
//! record. If the file cannot be opened or a write fails, the writer degrades
//! to stderr with an `[OSTM-JSONL]` prefix for the rest of the run.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{OstmError, Result};

/// Severity level for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Event types of a migration walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    WalkStart,
    UnreadableDirectory,
    UnstatableEntry,
    LayoutQueryFailed,
    EmptyLayout,
    MigrationCandidate,
    MigrationStart,
    MigrationSucceeded,
    MigrationFailed,
    DispatchFailed,
    FailureBreaker,
    WalkInterrupted,
    WalkComplete,
}

/// A single JSONL record. Only `ts`, `event` and `severity` are always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 UTC timestamp with milliseconds.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Wall time of the action in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    /// Decoded child termination, e.g. `exited with status: 1`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// OSTM error code when the event is a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// Create a new entry stamped with the current UTC time.
    #[must_use]
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: format_utc_now(),
            event,
            severity,
            path: None,
            duration_ms: None,
            ok: None,
            status: None,
            code: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: &Path) -> Self {
        self.path = Some(path.display().to_string());
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Fill `path`, `code` and `details` from a failure.
    #[must_use]
    pub fn with_error(mut self, err: &OstmError) -> Self {
        if let Some(path) = err.path() {
            self.path = Some(path.display().to_string());
        }
        self.code = Some(err.code().to_string());
        self.details = Some(err.to_string());
        self.ok = Some(false);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Normal,
    Stderr,
}

/// Append-only JSONL writer with stderr fallback.
pub struct JsonlWriter {
    path: PathBuf,
    file: Option<File>,
    state: WriterState,
    lines_written: u64,
}

impl JsonlWriter {
    /// Open (or create) the log file. Falls back to stderr on failure.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match open_append(&path) {
            Ok(file) => Self {
                path,
                file: Some(file),
                state: WriterState::Normal,
                lines_written: 0,
            },
            Err(e) => {
                let _ = writeln!(io::stderr(), "[OSTM-JSONL] {e}; writing records to stderr");
                Self {
                    path,
                    file: None,
                    state: WriterState::Stderr,
                    lines_written: 0,
                }
            }
        }
    }

    /// Write one entry as one line.
    pub fn write_entry(&mut self, entry: &LogEntry) {
        let line = match serde_json::to_string(entry) {
            Ok(json) => format!("{json}\n"),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[OSTM-JSONL] serialize error: {e}");
                return;
            }
        };
        self.write_line(&line);
    }

    /// Force the written records to stable storage.
    pub fn fsync(&mut self) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
            let _ = file.sync_data();
        }
    }

    /// Current degradation state.
    #[must_use]
    pub fn state(&self) -> &str {
        match self.state {
            WriterState::Normal => "normal",
            WriterState::Stderr => "stderr",
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records written to the file (not counting stderr fallback lines).
    #[must_use]
    pub const fn lines_written(&self) -> u64 {
        self.lines_written
    }

    fn write_line(&mut self, line: &str) {
        if self.state == WriterState::Normal {
            if let Some(file) = self.file.as_mut() {
                match file.write_all(line.as_bytes()) {
                    Ok(()) => {
                        self.lines_written += 1;
                        return;
                    }
                    Err(e) => {
                        let _ = writeln!(
                            io::stderr(),
                            "[OSTM-JSONL] write to {} failed: {e}; writing records to stderr",
                            self.path.display()
                        );
                    }
                }
            }
            self.file = None;
            self.state = WriterState::Stderr;
        }
        let _ = write!(io::stderr(), "[OSTM-JSONL] {line}");
    }
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| OstmError::io(parent, source))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| OstmError::io(path, source))
}

fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
