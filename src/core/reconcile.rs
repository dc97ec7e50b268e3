//! Freshness-based merge of settled NAV figures.
//!
//! The live estimate is for an in-progress session and goes stale once a newer
//! settlement posts, so the most recently dated settlement wins. Dates are
//! compared as strings; both feeds format them zero-padded, which keeps
//! lexical and chronological order in agreement.

use super::snapshot::{FundSnapshot, Settlement};
use tracing::debug;

fn dated(settlement: &Settlement) -> Option<&str> {
    settlement.jzrq.as_deref().filter(|d| !d.is_empty())
}

/// Returns true when `secondary` should replace `primary`.
pub fn secondary_is_fresher(primary: &Settlement, secondary: &Settlement) -> bool {
    match (dated(primary), dated(secondary)) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(p), Some(s)) => s >= p,
    }
}

pub fn reconcile(primary: Settlement, secondary: Option<Settlement>) -> Settlement {
    match secondary {
        Some(secondary) if secondary_is_fresher(&primary, &secondary) => {
            debug!(
                primary = ?primary.jzrq,
                secondary = ?secondary.jzrq,
                "Secondary settlement is at least as recent, using it"
            );
            secondary
        }
        _ => primary,
    }
}

/// Applies [`reconcile`] to a snapshot, leaving the live estimate fields alone.
pub fn reconcile_snapshot(snapshot: &mut FundSnapshot, secondary: Option<Settlement>) {
    let merged = reconcile(snapshot.settlement(), secondary);
    snapshot.apply_settlement(merged);
}
