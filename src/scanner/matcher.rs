//! Stripe matcher: does any stripe of a file sit on an evacuated target?

use crate::core::targets::TargetSet;
use crate::layout::StripeLayout;

/// True on the first stripe whose target is in `targets`.
///
/// Which stripe matched is irrelevant to callers; only overlap matters.
/// An empty layout or an empty target set never matches.
#[must_use]
pub fn layout_matches(layout: &StripeLayout, targets: &TargetSet) -> bool {
    layout.targets().iter().any(|&idx| targets.contains(idx))
}
