//! Operator console plus optional JSONL activity log, fanned out from typed events.

pub mod activity;
pub mod console;
pub mod jsonl;
