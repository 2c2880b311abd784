//! Stripe-layout retrieval: the boundary to the storage-placement metadata.
//!
//! The walk only needs one query per regular file: which storage targets hold
//! its stripes. [`LayoutSource`] is that query; [`getstripe::LfsGetstripe`]
//! answers it with the `lfs` tool.

pub mod getstripe;

use std::fmt;
use std::path::Path;

use thiserror::Error;

use crate::core::errors::OstmError;
use crate::platform::process::errno;

/// Default upper bound on the number of stripes a layout may report.
pub const DEFAULT_MAX_STRIPE_COUNT: usize = 2000;

/// Failed layout query. `code` is a non-zero result code; negative values
/// are `-errno`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("result code {code}: {details}")]
pub struct LayoutQueryError {
    pub code: i32,
    pub details: String,
}

impl LayoutQueryError {
    #[must_use]
    pub fn new(code: i32, details: impl Into<String>) -> Self {
        Self {
            code,
            details: details.into(),
        }
    }

    /// Attach the queried path to produce the logged error.
    #[must_use]
    pub fn for_path(self, path: &Path) -> OstmError {
        OstmError::LayoutQuery {
            path: path.to_path_buf(),
            code: self.code,
            details: self.details,
        }
    }
}

impl From<OstmError> for LayoutQueryError {
    fn from(err: OstmError) -> Self {
        let code = match &err {
            OstmError::LayoutTooWide { .. } => -errno::e2big(),
            OstmError::LayoutQuery { code, .. } => *code,
            OstmError::Spawn { source, .. } | OstmError::Io { source, .. } => -errno::of(source),
            _ => -errno::einval(),
        };
        Self::new(code, err.to_string())
    }
}

/// Ordered storage-target indices holding one file's stripes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StripeLayout {
    targets: Vec<u32>,
}

impl StripeLayout {
    /// Build a layout, refusing more than `max_stripe_count` stripes rather
    /// than truncating.
    pub fn bounded(targets: Vec<u32>, max_stripe_count: usize) -> crate::core::errors::Result<Self> {
        if targets.len() > max_stripe_count {
            return Err(OstmError::LayoutTooWide {
                count: targets.len(),
                max: max_stripe_count,
            });
        }
        Ok(Self { targets })
    }

    #[must_use]
    pub fn stripe_count(&self) -> usize {
        self.targets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Target index of each stripe, in stripe order.
    #[must_use]
    pub fn targets(&self) -> &[u32] {
        &self.targets
    }
}

impl fmt::Display for StripeLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.targets.iter().map(u32::to_string).collect();
        write!(f, "[{}]", joined.join(","))
    }
}

/// Source of per-file stripe layouts. Called concurrently from walk workers.
pub trait LayoutSource: Send + Sync {
    fn stripe_layout(&self, path: &Path) -> Result<StripeLayout, LayoutQueryError>;
}
