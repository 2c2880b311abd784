//! Target-set configuration: the operator's list of storage targets to evacuate.
//!
//! Everything here runs before the walk starts. A malformed or out-of-range
//! index is fatal; the walk never begins with a partially parsed target list.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::core::errors::{OstmError, Result};

/// Largest storage-target index accepted by default (inclusive).
pub const DEFAULT_MAX_TARGET_COUNT: u32 = 1024;

/// Numeric base used to interpret target-index tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericBase {
    Decimal,
    Hexadecimal,
}

impl NumericBase {
    /// The radix passed to the integer parser.
    #[must_use]
    pub const fn radix(self) -> u32 {
        match self {
            Self::Decimal => 10,
            Self::Hexadecimal => 16,
        }
    }
}

impl FromStr for NumericBase {
    type Err = OstmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "10" => Ok(Self::Decimal),
            "16" => Ok(Self::Hexadecimal),
            other => Err(OstmError::UnsupportedBase {
                base: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for NumericBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.radix())
    }
}

/// Parse one target-index token in `base`, rejecting anything but digits.
///
/// Base 16 accepts an optional `0x`/`0X` prefix. Signs, whitespace, and
/// trailing characters are errors.
pub fn parse_target_index(token: &str, base: NumericBase, max_target_count: u32) -> Result<u32> {
    let invalid = |details: &str| OstmError::InvalidTargetIndex {
        token: token.to_string(),
        base: base.radix(),
        details: details.to_string(),
    };

    let digits = match base {
        NumericBase::Hexadecimal => token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token),
        NumericBase::Decimal => token,
    };

    if digits.is_empty() {
        return Err(invalid("no digits"));
    }
    if let Some(bad) = digits.chars().find(|c| !c.is_digit(base.radix())) {
        return Err(invalid(&format!("unexpected character {bad:?}")));
    }

    // Digits are validated above, so the only failure left is overflow.
    let value = u64::from_str_radix(digits, base.radix()).map_err(|_| OstmError::TargetOutOfRange {
        value: u64::MAX,
        max: max_target_count,
    })?;

    if value > u64::from(max_target_count) {
        return Err(OstmError::TargetOutOfRange {
            value,
            max: max_target_count,
        });
    }

    u32::try_from(value).map_err(|_| OstmError::TargetOutOfRange {
        value,
        max: max_target_count,
    })
}

/// Immutable, ordered set of storage-target indices slated for evacuation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSet {
    indices: Vec<u32>,
}

impl TargetSet {
    /// Parse repeated tokens into a target set. Fails on the first bad token
    /// and on an empty token list.
    pub fn parse<S: AsRef<str>>(
        tokens: &[S],
        base: NumericBase,
        max_target_count: u32,
    ) -> Result<Self> {
        if tokens.is_empty() {
            return Err(OstmError::InvalidConfig {
                details: "at least one target index is required".to_string(),
            });
        }
        let indices = tokens
            .iter()
            .map(|t| parse_target_index(t.as_ref(), base, max_target_count))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { indices })
    }

    /// Build a set from already-validated indices.
    pub fn from_indices(indices: Vec<u32>, max_target_count: u32) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i > max_target_count) {
            return Err(OstmError::TargetOutOfRange {
                value: u64::from(bad),
                max: max_target_count,
            });
        }
        Ok(Self { indices })
    }

    #[must_use]
    pub fn contains(&self, index: u32) -> bool {
        self.indices.contains(&index)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Indices in the order the operator supplied them.
    #[must_use]
    pub fn as_slice(&self) -> &[u32] {
        &self.indices
    }
}

impl fmt::Display for TargetSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.indices.iter().map(u32::to_string).collect();
        write!(f, "{{{}}}", joined.join(","))
    }
}

/// Run configuration shared read-only by every walk worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationConfig {
    pub targets: TargetSet,
    pub base: NumericBase,
    pub find_only: bool,
    pub root_path: PathBuf,
}

impl MigrationConfig {
    /// Validate operator input and build the configuration.
    pub fn from_args<S: AsRef<str>>(
        target_tokens: &[S],
        base: &str,
        find_only: bool,
        root_path: &Path,
        max_target_count: u32,
    ) -> Result<Self> {
        let base: NumericBase = base.parse()?;
        let targets = TargetSet::parse(target_tokens, base, max_target_count)?;
        if root_path.as_os_str().is_empty() {
            return Err(OstmError::InvalidConfig {
                details: "root path must not be empty".to_string(),
            });
        }
        Ok(Self {
            targets,
            base,
            find_only,
            root_path: anchored(root_path),
        })
    }
}

/// A relative root starting with `-` gets a `./` prefix, so neither `lfs` nor
/// the action reads it or any path beneath it as an option.
fn anchored(root_path: &Path) -> PathBuf {
    if root_path.is_relative() && root_path.as_os_str().to_string_lossy().starts_with('-') {
        Path::new(".").join(root_path)
    } else {
        root_path.to_path_buf()
    }
}
