#![forbid(unsafe_code)]

//! ost-migrate: find files with stripes on evacuated Lustre storage targets
//! (OSTs) and hand each one to a migration action.
//!
//! A parallel [`scanner::walker::TreeWalker`] visits every entry under a root.
//! For each regular file the [`scanner::visitor::MigrationVisitor`] asks a
//! [`layout::LayoutSource`] which targets hold the file's stripes, matches
//! them against the evacuated [`core::targets::TargetSet`], and either
//! reports the file (find-only) or runs the migration action on it through
//! the [`scanner::dispatch::MigrationDispatcher`].
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use ost_migrate::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use ost_migrate::core::config::Settings;
//! use ost_migrate::scanner::walker::{TreeWalker, WalkerConfig};
//! ```

pub mod prelude;

pub mod core;
pub mod layout;
pub mod logger;
pub mod platform;
pub mod scanner;
