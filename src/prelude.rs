//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use ost_migrate::prelude::*;
//! ```

// Core
pub use crate::core::config::Settings;
pub use crate::core::errors::{OstmError, Result};
pub use crate::core::targets::{MigrationConfig, NumericBase, TargetSet};

// Layout
pub use crate::layout::getstripe::LfsGetstripe;
pub use crate::layout::{LayoutQueryError, LayoutSource, StripeLayout};

// Platform
pub use crate::platform::process::ExitStatus;

// Logger
pub use crate::logger::activity::{ActivityEvent, ActivityLogger, RunSummary};
pub use crate::logger::console::Console;
pub use crate::logger::jsonl::JsonlWriter;

// Scanner
pub use crate::scanner::dispatch::{ActionOutcome, ActionSpec, MigrationDispatcher};
pub use crate::scanner::matcher::layout_matches;
pub use crate::scanner::visitor::{
    EntryClassification, EntryVisitor, MigrationVisitor, VisitDecision,
};
pub use crate::scanner::walker::{TreeWalker, WalkOutcome, WalkReport, WalkerConfig};
