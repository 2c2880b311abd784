//! Layout source backed by `lfs getstripe`.
//!
//! The tool prints one `obdidx` table per instantiated layout component:
//!
//! ```text
//! /lustre/scratch/run42/out.h5
//! lmm_stripe_count:  2
//! lmm_stripe_size:   1048576
//! lmm_pattern:       raid0
//! lmm_layout_gen:    0
//! lmm_stripe_offset: 6
//!         obdidx           objid           objid           group
//!              6         8392711       0x801007              0
//!              3         8391940       0x800d04              0
//! ```
//!
//! The first column of every table row is the storage-target index. Newer
//! tools print composite components as `lmm_objects:` lists instead, either
//! inline (`- 0: { l_ost_idx: 12, l_fid: [...] }`) or YAML style
//! (`- l_ost_idx: 12`); all three forms are read. Indices from all components
//! are concatenated in output order.
//!
//! A file with no objects (released, data-on-MDT only, or a zero stripe count)
//! yields an empty layout. Anything else that does not account for its
//! declared stripes, or output with no layout lines at all, is a parse error.

use std::path::Path;
use std::process::Command;

use regex::Regex;

use crate::core::errors::{OstmError, Result};
use crate::layout::{LayoutQueryError, LayoutSource, StripeLayout};
use crate::platform::process::{ExitStatus, errno};

const TABLE_HEADER: &str = r"^\s*obdidx\s+objid\b";
const TABLE_ROW: &str = r"^\s*(\d+)\s+(?:\d+|0x[0-9a-fA-F]+)(?:\s+\S+)*\s*$";
const OBJECT_ENTRY: &str = r"^\s*-\s*(?:\d+:\s*\{\s*)?l_ost_idx:\s*(\d+)";
const STRIPE_COUNT: &str = r"^\s*lmm_stripe_count:\s*(-?\d+)\s*$";
const PATTERN: &str = r"^\s*lmm_pattern:\s*(\S+)";
const COMPONENT_ID: &str = r"^\s*lcme_id:";
const COMPONENT_FLAGS: &str = r"^\s*lcme_flags:\s*(\S+)";

/// Line-oriented parser for `lfs getstripe` output.
#[derive(Debug, Clone)]
pub struct GetstripeParser {
    table_header: Regex,
    table_row: Regex,
    object_entry: Regex,
    stripe_count: Regex,
    pattern: Regex,
    component_id: Regex,
    component_flags: Regex,
}

/// What one layout component declared and what it listed.
#[derive(Debug, Default)]
struct Component {
    declared: Option<i64>,
    pattern: Option<String>,
    uninstantiated: bool,
    objects: usize,
}

impl Component {
    /// Components that legitimately carry no objects.
    fn has_no_objects(&self) -> bool {
        self.uninstantiated
            || self.declared.is_some_and(|n| n <= 0)
            || self
                .pattern
                .as_deref()
                .is_some_and(|p| p == "mdt" || p.split(',').any(|part| part == "released"))
    }

    fn check(&self) -> Result<()> {
        let Some(declared) = self.declared else {
            return Ok(());
        };
        if self.has_no_objects() {
            return Ok(());
        }
        if usize::try_from(declared).ok() != Some(self.objects) {
            return Err(OstmError::LayoutParse {
                details: format!(
                    "component declares {declared} stripes (pattern {}) but lists {} objects",
                    self.pattern.as_deref().unwrap_or("unknown"),
                    self.objects
                ),
            });
        }
        Ok(())
    }
}

impl GetstripeParser {
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| OstmError::Runtime {
                details: format!("getstripe pattern {pattern:?}: {e}"),
            })
        };
        Ok(Self {
            table_header: compile(TABLE_HEADER)?,
            table_row: compile(TABLE_ROW)?,
            object_entry: compile(OBJECT_ENTRY)?,
            stripe_count: compile(STRIPE_COUNT)?,
            pattern: compile(PATTERN)?,
            component_id: compile(COMPONENT_ID)?,
            component_flags: compile(COMPONENT_FLAGS)?,
        })
    }

    /// Extract storage-target indices, in output order.
    pub fn parse(&self, text: &str) -> Result<Vec<u32>> {
        let mut targets = Vec::new();
        let mut in_table = false;
        let mut recognised = false;
        let mut component = Component::default();

        for line in text.lines() {
            if self.component_id.is_match(line) {
                std::mem::take(&mut component).check()?;
                in_table = false;
                recognised = true;
                continue;
            }
            if let Some(caps) = self.component_flags.captures(line) {
                component.uninstantiated = !caps[1].split(',').any(|flag| flag == "init");
                continue;
            }
            if let Some(caps) = self.stripe_count.captures(line) {
                if component.declared.is_some() {
                    std::mem::take(&mut component).check()?;
                }
                component.declared = Some(parse_count(&caps[1])?);
                in_table = false;
                recognised = true;
                continue;
            }
            if let Some(caps) = self.pattern.captures(line) {
                component.pattern = Some(caps[1].to_string());
                recognised = true;
                continue;
            }
            if self.table_header.is_match(line) {
                in_table = true;
                recognised = true;
                continue;
            }
            if let Some(caps) = self.object_entry.captures(line) {
                in_table = false;
                recognised = true;
                targets.push(parse_index(&caps[1])?);
                component.objects += 1;
                continue;
            }
            if !in_table {
                continue;
            }
            match self.table_row.captures(line) {
                Some(caps) => {
                    targets.push(parse_index(&caps[1])?);
                    component.objects += 1;
                }
                None => in_table = false,
            }
        }
        component.check()?;

        if !recognised {
            return Err(OstmError::LayoutParse {
                details: format!("no layout lines in tool output ({} bytes)", text.len()),
            });
        }
        Ok(targets)
    }
}

fn parse_count(raw: &str) -> Result<i64> {
    raw.parse::<i64>().map_err(|e| OstmError::LayoutParse {
        details: format!("bad stripe count {raw:?}: {e}"),
    })
}

fn parse_index(raw: &str) -> Result<u32> {
    raw.parse::<u32>().map_err(|e| OstmError::LayoutParse {
        details: format!("bad storage-target index {raw:?}: {e}"),
    })
}

/// Queries layouts by running `<program> getstripe <path>`.
#[derive(Debug, Clone)]
pub struct LfsGetstripe {
    program: String,
    max_stripe_count: usize,
    parser: GetstripeParser,
}

impl LfsGetstripe {
    pub fn new(program: impl Into<String>, max_stripe_count: usize) -> Result<Self> {
        Ok(Self {
            program: program.into(),
            max_stripe_count,
            parser: GetstripeParser::new()?,
        })
    }

    fn run(&self, path: &Path) -> std::result::Result<String, LayoutQueryError> {
        let output = Command::new(&self.program)
            .arg("getstripe")
            .arg(path)
            .output()
            .map_err(|source| {
                LayoutQueryError::from(OstmError::Spawn {
                    program: self.program.clone(),
                    source,
                })
            })?;

        match ExitStatus::from(output.status) {
            ExitStatus::ExitedWithCode(0) => {}
            ExitStatus::ExitedWithCode(code) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(LayoutQueryError::new(
                    code,
                    format!("{} getstripe: {}", self.program, stderr.trim()),
                ));
            }
            status @ (ExitStatus::TerminatedBySignal(_) | ExitStatus::UnknownRawStatus(_)) => {
                return Err(LayoutQueryError::new(
                    -errno::eintr(),
                    format!("{} getstripe {status}", self.program),
                ));
            }
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl LayoutSource for LfsGetstripe {
    fn stripe_layout(&self, path: &Path) -> std::result::Result<StripeLayout, LayoutQueryError> {
        let stdout = self.run(path)?;
        let targets = self.parser.parse(&stdout)?;
        Ok(StripeLayout::bounded(targets, self.max_stripe_count)?)
    }
}
