//! Core types: errors, configuration, target sets, signals.

pub mod config;
pub mod errors;
#[cfg(feature = "cli")]
pub mod signals;
pub mod targets;
