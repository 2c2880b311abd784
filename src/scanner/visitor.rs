//! Per-entry walk callback: classify, query layout, match, dispatch.
//!
//! The walker calls [`EntryVisitor::visit`] once per entry, from any worker
//! thread. [`MigrationVisitor`] holds only read-only configuration plus the
//! shared logger and dispatcher, so it can be driven with synthetic entries
//! and a fake [`LayoutSource`] without touching a real filesystem.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::targets::MigrationConfig;
use crate::layout::LayoutSource;
use crate::logger::activity::{ActivityEvent, ActivityLogger};
use crate::scanner::dispatch::MigrationDispatcher;
use crate::scanner::matcher::layout_matches;

/// What the walker found at a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryClassification {
    Directory,
    /// Could not be opened; its subtree is not walked.
    UnreadableDirectory { reason: String },
    /// Metadata could not be read.
    UnstatableEntry { reason: String },
    RegularFile,
}

/// Whether the walk should go on after this entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitDecision {
    Continue,
    Abort,
}

/// Callback invoked by the walker for every reported entry.
pub trait EntryVisitor: Sync {
    fn visit(&self, path: &Path, classification: EntryClassification) -> VisitDecision;
}

impl<F> EntryVisitor for F
where
    F: Fn(&Path, EntryClassification) -> VisitDecision + Sync,
{
    fn visit(&self, path: &Path, classification: EntryClassification) -> VisitDecision {
        self(path, classification)
    }
}

/// The migration walk callback.
pub struct MigrationVisitor {
    config: MigrationConfig,
    layouts: Box<dyn LayoutSource>,
    dispatcher: MigrationDispatcher,
    logger: Arc<ActivityLogger>,
    cancel: Option<Arc<AtomicBool>>,
}

impl MigrationVisitor {
    #[must_use]
    pub fn new(
        config: MigrationConfig,
        layouts: Box<dyn LayoutSource>,
        dispatcher: MigrationDispatcher,
        logger: Arc<ActivityLogger>,
    ) -> Self {
        Self {
            config,
            layouts,
            dispatcher,
            logger,
            cancel: None,
        }
    }

    /// Stop visiting, and never start another action, once `cancel` is set.
    #[must_use]
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    #[must_use]
    pub const fn config(&self) -> &MigrationConfig {
        &self.config
    }

    fn visit_file(&self, path: &Path) -> VisitDecision {
        self.logger.stats().note_file_examined();

        let layout = match self.layouts.stripe_layout(path) {
            Ok(layout) => layout,
            Err(err) => {
                self.logger
                    .log(ActivityEvent::LayoutQueryFailed(err.for_path(path)));
                return VisitDecision::Continue;
            }
        };

        if layout.is_empty() {
            self.logger.log(ActivityEvent::EmptyLayout {
                path: path.to_path_buf(),
            });
            return VisitDecision::Continue;
        }

        if !layout_matches(&layout, &self.config.targets) {
            return VisitDecision::Continue;
        }
        drop(layout);

        if self.cancelled() {
            return VisitDecision::Abort;
        }
        self.logger.stats().note_match();
        let outcome = self.dispatcher.dispatch(path, &self.config);

        if outcome.is_failure() && self.dispatcher.should_stop() {
            VisitDecision::Abort
        } else {
            VisitDecision::Continue
        }
    }
}

impl EntryVisitor for MigrationVisitor {
    fn visit(&self, path: &Path, classification: EntryClassification) -> VisitDecision {
        if self.cancelled() || self.dispatcher.should_stop() {
            return VisitDecision::Abort;
        }
        match classification {
            EntryClassification::Directory => VisitDecision::Continue,
            EntryClassification::UnreadableDirectory { reason } => {
                self.logger.log(ActivityEvent::UnreadableDirectory {
                    path: path.to_path_buf(),
                    reason,
                });
                VisitDecision::Continue
            }
            EntryClassification::UnstatableEntry { reason } => {
                self.logger.log(ActivityEvent::UnstatableEntry {
                    path: path.to_path_buf(),
                    reason,
                });
                VisitDecision::Continue
            }
            EntryClassification::RegularFile => self.visit_file(path),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    use parking_lot::Mutex;

    use crate::core::targets::{NumericBase, TargetSet};
    use crate::layout::{LayoutQueryError, StripeLayout};
    use crate::logger::console::{CaptureBuffer, capture};
    use crate::scanner::dispatch::ActionSpec;

    /// Layout source answering from a fixed table and recording every query.
    #[derive(Default)]
    struct TableLayouts {
        table: HashMap<PathBuf, std::result::Result<Vec<u32>, i32>>,
        queried: Mutex<Vec<PathBuf>>,
    }

    impl TableLayouts {
        fn with(mut self, path: &str, answer: std::result::Result<Vec<u32>, i32>) -> Self {
            self.table.insert(PathBuf::from(path), answer);
            self
        }
    }

    impl LayoutSource for TableLayouts {
        fn stripe_layout(&self, path: &Path) -> std::result::Result<StripeLayout, LayoutQueryError> {
            self.queried.lock().push(path.to_path_buf());
            match self.table.get(path) {
                Some(Ok(targets)) => Ok(StripeLayout::bounded(targets.clone(), 2000)?),
                Some(Err(code)) => Err(LayoutQueryError::new(*code, "lookup failed")),
                None => Err(LayoutQueryError::new(-2, "not in table")),
            }
        }
    }

    struct Harness {
        visitor: MigrationVisitor,
        logger: Arc<ActivityLogger>,
        out: CaptureBuffer,
        err: CaptureBuffer,
    }

    fn harness(layouts: TableLayouts, find_only: bool, action: &str, breaker: u32) -> Harness {
        let (console, out, err) = capture();
        let logger = Arc::new(ActivityLogger::new(console, None));
        let action = ActionSpec {
            program: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), action.to_string(), "ostm".to_string()],
        };
        let dispatcher = MigrationDispatcher::new(action, Arc::clone(&logger), breaker);
        let config = MigrationConfig {
            targets: TargetSet::from_indices(vec![5, 6, 7], 1024).unwrap(),
            base: NumericBase::Decimal,
            find_only,
            root_path: PathBuf::from("/lustre"),
        };
        Harness {
            visitor: MigrationVisitor::new(config, Box::new(layouts), dispatcher, Arc::clone(&logger)),
            logger,
            out,
            err,
        }
    }

    fn file(h: &Harness, path: &str) -> VisitDecision {
        h.visitor.visit(Path::new(path), EntryClassification::RegularFile)
    }

    #[test]
    fn directories_are_a_silent_no_op() {
        let h = harness(TableLayouts::default(), true, "exit 0", 0);
        let decision = h.visitor.visit(Path::new("/lustre/dir"), EntryClassification::Directory);
        assert_eq!(decision, VisitDecision::Continue);
        assert!(h.out.contents().is_empty());
        assert!(h.err.contents().is_empty());
    }

    #[test]
    fn traversal_problems_warn_and_continue() {
        let h = harness(TableLayouts::default(), true, "exit 0", 0);
        let unreadable = EntryClassification::UnreadableDirectory {
            reason: "Permission denied".to_string(),
        };
        let unstatable = EntryClassification::UnstatableEntry {
            reason: "No such file or directory".to_string(),
        };
        assert_eq!(h.visitor.visit(Path::new("/lustre/locked"), unreadable), VisitDecision::Continue);
        assert_eq!(h.visitor.visit(Path::new("/lustre/gone"), unstatable), VisitDecision::Continue);

        let lines = h.err.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("unreadable directory: /lustre/locked"));
        assert!(lines[1].contains("unstatable file: /lustre/gone"));
    }

    #[test]
    fn matching_file_is_reported_in_find_only_mode() {
        let layouts = TableLayouts::default().with("/lustre/a.dat", Ok(vec![3, 6]));
        let h = harness(layouts, true, "exit 0", 0);
        assert_eq!(file(&h, "/lustre/a.dat"), VisitDecision::Continue);
        assert_eq!(h.out.lines(), vec!["found a file to migrate: /lustre/a.dat"]);
    }

    #[test]
    fn disjoint_file_is_neither_reported_nor_dispatched() {
        let layouts = TableLayouts::default().with("/lustre/b.dat", Ok(vec![1, 2]));
        let h = harness(layouts, false, "exit 1", 0);
        assert_eq!(file(&h, "/lustre/b.dat"), VisitDecision::Continue);
        assert!(h.out.contents().is_empty());
        assert!(h.err.contents().is_empty());
        assert_eq!(h.logger.summary().matched, 0);
    }

    #[test]
    fn layout_failure_logs_path_and_code_then_continues() {
        let layouts = TableLayouts::default().with("/lustre/bad", Err(-5));
        let h = harness(layouts, true, "exit 0", 0);
        assert_eq!(file(&h, "/lustre/bad"), VisitDecision::Continue);
        let lines = h.err.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("/lustre/bad") && lines[0].contains("-5"), "{}", lines[0]);
    }

    #[test]
    fn empty_layout_is_no_match() {
        let layouts = TableLayouts::default().with("/lustre/released", Ok(vec![]));
        let h = harness(layouts, true, "exit 0", 0);
        assert_eq!(file(&h, "/lustre/released"), VisitDecision::Continue);
        assert!(h.out.contents().is_empty());
        assert_eq!(h.logger.summary().empty_layouts, 1);
    }

    #[test]
    fn layout_failure_on_one_file_does_not_affect_another() {
        let layouts = TableLayouts::default()
            .with("/lustre/a", Err(-61))
            .with("/lustre/b", Ok(vec![7]));
        let h = harness(layouts, true, "exit 0", 0);
        file(&h, "/lustre/a");
        file(&h, "/lustre/b");
        assert_eq!(h.out.lines(), vec!["found a file to migrate: /lustre/b"]);
        let summary = h.logger.summary();
        assert_eq!(summary.layout_failures, 1);
        assert_eq!(summary.reported, 1);
    }

    #[test]
    fn failed_migration_continues_by_default() {
        let layouts = TableLayouts::default()
            .with("/lustre/a", Ok(vec![5]))
            .with("/lustre/b", Ok(vec![6]));
        let h = harness(layouts, false, "exit 1", 0);
        assert_eq!(file(&h, "/lustre/a"), VisitDecision::Continue);
        assert_eq!(file(&h, "/lustre/b"), VisitDecision::Continue);
        assert_eq!(h.logger.summary().migration_failures, 2);
    }

    #[test]
    fn tripped_breaker_aborts_the_walk() {
        let layouts = TableLayouts::default()
            .with("/lustre/a", Ok(vec![5]))
            .with("/lustre/b", Ok(vec![6]))
            .with("/lustre/c", Ok(vec![7]));
        let h = harness(layouts, false, "exit 1", 2);
        assert_eq!(file(&h, "/lustre/a"), VisitDecision::Continue);
        assert_eq!(file(&h, "/lustre/b"), VisitDecision::Abort);
        assert_eq!(file(&h, "/lustre/c"), VisitDecision::Abort);
        assert_eq!(h.logger.summary().migration_failures, 2);
    }

    #[test]
    fn cancellation_aborts_before_any_action_starts() {
        let layouts = TableLayouts::default().with("/lustre/a", Ok(vec![5]));
        let tmp = tempfile::tempdir().unwrap();
        let marker = tmp.path().join("ran");
        let mut h = harness(layouts, false, &format!("touch {}", marker.display()), 0);
        let cancel = Arc::new(AtomicBool::new(false));
        h.visitor = h.visitor.with_cancel(Arc::clone(&cancel));

        cancel.store(true, Ordering::SeqCst);
        assert_eq!(file(&h, "/lustre/a"), VisitDecision::Abort);
        let dir = h.visitor.visit(Path::new("/lustre/dir"), EntryClassification::Directory);
        assert_eq!(dir, VisitDecision::Abort);
        assert!(!marker.exists());
        assert_eq!(h.logger.summary().migrated, 0);
    }

    #[test]
    fn uncancelled_visitor_dispatches_normally() {
        let layouts = TableLayouts::default().with("/lustre/a", Ok(vec![5]));
        let mut h = harness(layouts, false, "exit 0", 0);
        h.visitor = h.visitor.with_cancel(Arc::new(AtomicBool::new(false)));
        assert_eq!(file(&h, "/lustre/a"), VisitDecision::Continue);
        assert_eq!(h.logger.summary().migrated, 1);
    }

    #[test]
    fn closures_are_visitors() {
        let seen = Mutex::new(Vec::new());
        let visitor = |path: &Path, _class: EntryClassification| {
            seen.lock().push(path.to_path_buf());
            VisitDecision::Continue
        };
        visitor.visit(Path::new("/x"), EntryClassification::RegularFile);
        assert_eq!(seen.lock().len(), 1);
    }
}
