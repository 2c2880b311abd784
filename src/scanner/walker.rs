//! Parallel tree walker driving an [`EntryVisitor`].
//!
//! Directories are work items on an unbounded crossbeam channel; N scoped
//! worker threads pull them, classify each child and hand it to the visitor.
//! An in-flight counter tells idle workers when the tree is exhausted. Work is
//! never dropped: the walk ends only when every queued directory has been
//! processed, the visitor asks to abort, or the cancellation flag is raised.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel as channel;
use serde::Serialize;

use crate::core::errors::{OstmError, Result};
use crate::scanner::visitor::{EntryClassification, EntryVisitor, VisitDecision};

const IDLE_POLL: Duration = Duration::from_millis(50);

/// Walker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkerConfig {
    pub parallelism: usize,
    /// Descend into directories on other filesystems than the root.
    pub cross_devices: bool,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            cross_devices: true,
        }
    }
}

/// Half the available cores, at least one.
#[must_use]
pub fn default_parallelism() -> usize {
    thread::available_parallelism()
        .map(|n| n.get() / 2)
        .unwrap_or(1)
        .max(1)
}

/// How a walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkOutcome {
    Completed,
    /// The visitor returned [`VisitDecision::Abort`].
    Aborted,
    /// The cancellation flag was raised.
    Cancelled,
}

impl WalkOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Totals of one walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkReport {
    pub outcome: WalkOutcome,
    pub entries_visited: u64,
    pub regular_files: u64,
    pub unreadable_directories: u64,
}

/// Parallel directory walker.
///
/// Safety invariants:
/// - Symlinks are never followed and never reported
/// - Sockets, FIFOs and device nodes are not reported
/// - Never crosses filesystem boundaries unless configured
#[derive(Debug, Clone)]
pub struct TreeWalker {
    config: WalkerConfig,
}

impl TreeWalker {
    #[must_use]
    pub const fn new(config: WalkerConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &WalkerConfig {
        &self.config
    }

    /// Walk `root`, calling `visitor` for the root and every entry beneath it.
    ///
    /// Fails only when the root itself cannot be examined or no worker thread
    /// can be started.
    pub fn walk<V>(&self, root: &Path, visitor: &V, cancel: &AtomicBool) -> Result<WalkReport>
    where
        V: EntryVisitor + ?Sized,
    {
        let meta = fs::metadata(root).map_err(|source| OstmError::io(root, source))?;
        self.walk_on_device(root, &meta, device_id(&meta), visitor, cancel)
    }

    /// Walk with `root_dev` as the device subdirectories must stay on.
    fn walk_on_device<V>(
        &self,
        root: &Path,
        meta: &fs::Metadata,
        root_dev: u64,
        visitor: &V,
        cancel: &AtomicBool,
    ) -> Result<WalkReport>
    where
        V: EntryVisitor + ?Sized,
    {
        let (work_tx, work_rx) = channel::unbounded::<PathBuf>();
        let shared = Shared {
            visitor,
            config: &self.config,
            root_dev,
            work_tx,
            work_rx,
            in_flight: AtomicUsize::new(0),
            aborted: AtomicBool::new(false),
            cancel,
            entries_visited: AtomicU64::new(0),
            regular_files: AtomicU64::new(0),
            unreadable_directories: AtomicU64::new(0),
        };

        if !shared.stopped() {
            if meta.is_dir() {
                shared.enqueue(root.to_path_buf());
            } else if meta.is_file() {
                shared.visit(root, EntryClassification::RegularFile);
            }
        }

        if shared.in_flight.load(Ordering::Acquire) > 0 {
            thread::scope(|s| -> Result<()> {
                let parallelism = self.config.parallelism.max(1);
                for i in 0..parallelism {
                    let name = format!("ost-walk-{i}");
                    let shared = &shared;
                    let spawned = thread::Builder::new()
                        .name(name.clone())
                        .spawn_scoped(s, move || shared.run_worker());
                    if let Err(source) = spawned {
                        if i == 0 {
                            return Err(OstmError::ThreadSpawn { name, source });
                        }
                        break;
                    }
                }
                Ok(())
            })?;
        }

        Ok(shared.report())
    }
}

struct Shared<'a, V: ?Sized> {
    visitor: &'a V,
    config: &'a WalkerConfig,
    root_dev: u64,
    work_tx: channel::Sender<PathBuf>,
    work_rx: channel::Receiver<PathBuf>,
    in_flight: AtomicUsize,
    aborted: AtomicBool,
    cancel: &'a AtomicBool,
    entries_visited: AtomicU64,
    regular_files: AtomicU64,
    unreadable_directories: AtomicU64,
}

impl<V> Shared<'_, V>
where
    V: EntryVisitor + ?Sized,
{
    fn stopped(&self) -> bool {
        self.aborted.load(Ordering::Acquire) || self.cancel.load(Ordering::Acquire)
    }

    /// Hand one entry to the visitor. Returns false once the walk must stop.
    fn visit(&self, path: &Path, classification: EntryClassification) -> bool {
        self.entries_visited.fetch_add(1, Ordering::Relaxed);
        match &classification {
            EntryClassification::RegularFile => {
                self.regular_files.fetch_add(1, Ordering::Relaxed);
            }
            EntryClassification::UnreadableDirectory { .. } => {
                self.unreadable_directories.fetch_add(1, Ordering::Relaxed);
            }
            EntryClassification::Directory | EntryClassification::UnstatableEntry { .. } => {}
        }
        if self.visitor.visit(path, classification) == VisitDecision::Abort {
            self.aborted.store(true, Ordering::Release);
        }
        !self.stopped()
    }

    fn enqueue(&self, dir: PathBuf) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        if self.work_tx.send(dir).is_err() {
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
        }
    }

    fn run_worker(&self) {
        loop {
            if self.stopped() {
                return;
            }
            match self.work_rx.recv_timeout(IDLE_POLL) {
                Ok(dir) => {
                    self.process_directory(&dir);
                    self.in_flight.fetch_sub(1, Ordering::AcqRel);
                }
                Err(channel::RecvTimeoutError::Timeout) => {
                    if self.in_flight.load(Ordering::Acquire) == 0 {
                        return;
                    }
                }
                Err(channel::RecvTimeoutError::Disconnected) => return,
            }
        }
    }

    /// Open one directory, report it, then report or enqueue its children.
    fn process_directory(&self, dir: &Path) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                self.visit(
                    dir,
                    EntryClassification::UnreadableDirectory {
                        reason: err.to_string(),
                    },
                );
                return;
            }
        };

        if !self.visit(dir, EntryClassification::Directory) {
            return;
        }

        for entry_result in entries {
            if self.stopped() {
                return;
            }

            let entry = match entry_result {
                Ok(entry) => entry,
                Err(err) => {
                    self.visit(
                        dir,
                        EntryClassification::UnstatableEntry {
                            reason: format!("directory listing failed: {err}"),
                        },
                    );
                    continue;
                }
            };
            let path = entry.path();

            let file_type = match entry.file_type() {
                Ok(ft) => ft,
                Err(err) => {
                    self.visit(
                        &path,
                        EntryClassification::UnstatableEntry {
                            reason: err.to_string(),
                        },
                    );
                    continue;
                }
            };

            if file_type.is_symlink() {
                continue;
            }

            if file_type.is_dir() {
                if !self.config.cross_devices {
                    match fs::symlink_metadata(&path) {
                        Ok(meta) if device_id(&meta) != self.root_dev => continue,
                        Ok(_) => {}
                        Err(err) => {
                            self.visit(
                                &path,
                                EntryClassification::UnstatableEntry {
                                    reason: err.to_string(),
                                },
                            );
                            continue;
                        }
                    }
                }
                self.enqueue(path);
            } else if file_type.is_file() {
                self.visit(&path, EntryClassification::RegularFile);
            }
        }
    }

    fn report(&self) -> WalkReport {
        let outcome = if self.cancel.load(Ordering::Acquire) {
            WalkOutcome::Cancelled
        } else if self.aborted.load(Ordering::Acquire) {
            WalkOutcome::Aborted
        } else {
            WalkOutcome::Completed
        };
        WalkReport {
            outcome,
            entries_visited: self.entries_visited.load(Ordering::Relaxed),
            regular_files: self.regular_files.load(Ordering::Relaxed),
            unreadable_directories: self.unreadable_directories.load(Ordering::Relaxed),
        }
    }
}

/// Get device ID from metadata (for cross-device detection).
fn device_id(meta: &fs::Metadata) -> u64 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        meta.dev()
    }
    #[cfg(not(unix))]
    {
        let _ = meta;
        0
    }
}
