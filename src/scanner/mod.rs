//! Migration scanner: tree walker, per-entry visitor, stripe matcher, dispatcher.

pub mod dispatch;
pub mod matcher;
pub mod visitor;
pub mod walker;
