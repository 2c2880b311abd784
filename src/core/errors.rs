//! OSTM-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::platform::process::ExitStatus;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, OstmError>;

/// Top-level error type for ost-migrate.
#[derive(Debug, Error)]
pub enum OstmError {
    #[error("[OSTM-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[OSTM-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[OSTM-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[OSTM-1004] invalid target index {token:?} in base {base}: {details}")]
    InvalidTargetIndex {
        token: String,
        base: u32,
        details: String,
    },

    #[error("[OSTM-1005] target index {value} out of range [0, {max}]")]
    TargetOutOfRange { value: u64, max: u32 },

    #[error("[OSTM-1006] unsupported numeric base {base} (expected 10 or 16)")]
    UnsupportedBase { base: String },

    #[error("[OSTM-2001] stripe layout query for {path} failed with result code {code}: {details}")]
    LayoutQuery {
        path: PathBuf,
        code: i32,
        details: String,
    },

    #[error("[OSTM-2002] stripe layout has {count} stripes, more than the maximum {max}")]
    LayoutTooWide { count: usize, max: usize },

    #[error("[OSTM-2003] unparseable stripe layout output: {details}")]
    LayoutParse { details: String },

    #[error("[OSTM-3001] failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[OSTM-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[OSTM-3003] failed to spawn thread {name}: {source}")]
    ThreadSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[OSTM-3101] failed to launch {program} for [{path}]: {source}")]
    ActionSpawn {
        path: PathBuf,
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[OSTM-3102] {program} for [{path}] {status}")]
    ActionFailed {
        path: PathBuf,
        program: String,
        status: ExitStatus,
    },

    #[error("[OSTM-3103] {consecutive} consecutive migration failures, stopping walk")]
    FailureBreaker { consecutive: u32 },

    #[error("[OSTM-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl OstmError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "OSTM-1001",
            Self::MissingConfig { .. } => "OSTM-1002",
            Self::ConfigParse { .. } => "OSTM-1003",
            Self::InvalidTargetIndex { .. } => "OSTM-1004",
            Self::TargetOutOfRange { .. } => "OSTM-1005",
            Self::UnsupportedBase { .. } => "OSTM-1006",
            Self::LayoutQuery { .. } => "OSTM-2001",
            Self::LayoutTooWide { .. } => "OSTM-2002",
            Self::LayoutParse { .. } => "OSTM-2003",
            Self::Spawn { .. } => "OSTM-3001",
            Self::Io { .. } => "OSTM-3002",
            Self::ThreadSpawn { .. } => "OSTM-3003",
            Self::ActionSpawn { .. } => "OSTM-3101",
            Self::ActionFailed { .. } => "OSTM-3102",
            Self::FailureBreaker { .. } => "OSTM-3103",
            Self::Runtime { .. } => "OSTM-3900",
        }
    }

    /// Whether the failure happened before any traversal and is the operator's to fix.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::MissingConfig { .. }
                | Self::ConfigParse { .. }
                | Self::InvalidTargetIndex { .. }
                | Self::TargetOutOfRange { .. }
                | Self::UnsupportedBase { .. }
        )
    }

    /// The file or directory the failure concerns, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::MissingConfig { path }
            | Self::LayoutQuery { path, .. }
            | Self::Io { path, .. }
            | Self::ActionSpawn { path, .. }
            | Self::ActionFailed { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for OstmError {
    fn from(value: serde_json::Error) -> Self {
        Self::Runtime {
            details: format!("serde_json: {value}"),
        }
    }
}

impl From<toml::de::Error> for OstmError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
