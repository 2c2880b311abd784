//! Configuration system: TOML file + env var overrides + smart defaults.
//!
//! Layering, lowest to highest precedence: built-in defaults, the TOML file,
//! `OSTM_*` environment variables, then CLI flags (applied by the caller).

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{OstmError, Result};
use crate::core::targets::DEFAULT_MAX_TARGET_COUNT;
use crate::layout::DEFAULT_MAX_STRIPE_COUNT;
use crate::scanner::dispatch::{ActionSpec, DEFAULT_ACTION_ARGS, DEFAULT_ACTION_PROGRAM};
use crate::scanner::walker::{WalkerConfig, default_parallelism};

/// Full ost-migrate settings model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Settings {
    pub action: ActionConfig,
    pub layout: LayoutConfig,
    pub targets: TargetsConfig,
    pub walk: WalkConfig,
    pub safety: SafetyConfig,
    pub paths: PathsConfig,
}

/// External migration action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ActionConfig {
    pub program: String,
    /// Arguments placed before the file path.
    pub args: Vec<String>,
}

/// Stripe-layout query tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LayoutConfig {
    pub program: String,
    pub max_stripe_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TargetsConfig {
    /// Largest accepted storage-target index, inclusive.
    pub max_target_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WalkConfig {
    pub parallelism: usize,
    pub cross_devices: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct SafetyConfig {
    /// Stop the walk after this many consecutive migration failures. 0 never stops.
    pub max_consecutive_failures: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct PathsConfig {
    /// JSONL activity log; unset disables it.
    pub jsonl_log: Option<PathBuf>,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_ACTION_PROGRAM.to_string(),
            args: DEFAULT_ACTION_ARGS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            program: "lfs".to_string(),
            max_stripe_count: DEFAULT_MAX_STRIPE_COUNT,
        }
    }
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            max_target_count: DEFAULT_MAX_TARGET_COUNT,
        }
    }
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            cross_devices: true,
        }
    }
}

impl ActionConfig {
    #[must_use]
    pub fn spec(&self) -> ActionSpec {
        ActionSpec {
            program: self.program.clone(),
            args: self.args.clone(),
        }
    }
}

impl WalkConfig {
    #[must_use]
    pub const fn walker(&self) -> WalkerConfig {
        WalkerConfig {
            parallelism: self.parallelism,
            cross_devices: self.cross_devices,
        }
    }
}

impl Settings {
    /// Default configuration path: `~/.config/ost-migrate/config.toml`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!("[OSTM-CONFIG] WARNING: HOME not set, looking for config under /tmp");
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        home_dir.join(".config").join("ost-migrate").join("config.toml")
    }

    /// Load settings from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);

        let mut settings = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf)
                .map_err(|source| OstmError::io(&path_buf, source))?;
            toml::from_str::<Self>(&raw)?
        } else if path.is_some() {
            return Err(OstmError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        settings.apply_env_overrides_from(env_var)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Deterministic hash of the effective settings for the activity log.
    ///
    /// FNV-1a over canonical JSON, stable across processes and releases.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("OSTM_ACTION_PROGRAM") {
            self.action.program = raw;
        }
        if let Some(raw) = lookup("OSTM_LAYOUT_PROGRAM") {
            self.layout.program = raw;
        }
        if let Some(raw) = lookup("OSTM_LAYOUT_MAX_STRIPE_COUNT") {
            self.layout.max_stripe_count = parse_env("OSTM_LAYOUT_MAX_STRIPE_COUNT", &raw)?;
        }
        if let Some(raw) = lookup("OSTM_TARGETS_MAX_TARGET_COUNT") {
            self.targets.max_target_count = parse_env("OSTM_TARGETS_MAX_TARGET_COUNT", &raw)?;
        }
        if let Some(raw) = lookup("OSTM_WALK_PARALLELISM") {
            self.walk.parallelism = parse_env("OSTM_WALK_PARALLELISM", &raw)?;
        }
        if let Some(raw) = lookup("OSTM_WALK_CROSS_DEVICES") {
            self.walk.cross_devices = parse_env("OSTM_WALK_CROSS_DEVICES", &raw)?;
        }
        if let Some(raw) = lookup("OSTM_SAFETY_MAX_CONSECUTIVE_FAILURES") {
            self.safety.max_consecutive_failures =
                parse_env("OSTM_SAFETY_MAX_CONSECUTIVE_FAILURES", &raw)?;
        }
        if let Some(raw) = lookup("OSTM_JSONL_LOG") {
            self.paths.jsonl_log = Some(PathBuf::from(raw));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.action.program.trim().is_empty() {
            return Err(OstmError::InvalidConfig {
                details: "action.program must not be empty".to_string(),
            });
        }
        if self.layout.program.trim().is_empty() {
            return Err(OstmError::InvalidConfig {
                details: "layout.program must not be empty".to_string(),
            });
        }
        if self.layout.max_stripe_count == 0 {
            return Err(OstmError::InvalidConfig {
                details: "layout.max_stripe_count must be at least 1".to_string(),
            });
        }
        if self.walk.parallelism == 0 {
            return Err(OstmError::InvalidConfig {
                details: "walk.parallelism must be at least 1".to_string(),
            });
        }
        if self
            .paths
            .jsonl_log
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            return Err(OstmError::InvalidConfig {
                details: "paths.jsonl_log must not be empty when set".to_string(),
            });
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|error| OstmError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}
