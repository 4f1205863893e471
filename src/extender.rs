//! Anti-sniping close-time extension.
//!
//! A bid landing inside the trailing window pushes the close time out so
//! other bidders can respond. The extension is computed and applied inside
//! the same serialized step as the bid's admission, never from an
//! `end_time` read before the bid was resolved.

use crate::config::Policy;
use crate::model::Auction;

/// Decide whether a bid arriving at `arrival` extends the auction.
///
/// Returns the new end time, or `None` when no extension applies. The
/// rule: the remaining time is shorter than the policy window, the
/// auction's kind participates in extensions, and the extension cap is
/// not exhausted. The new end time is `arrival + window`.
pub fn maybe_extend(policy: &Policy, auction: &Auction, arrival: u64) -> Option<u64> {
    if !auction.kind.extends_on_late_bids() {
        return None;
    }
    if !policy.max_extensions.allows(auction.extension_count) {
        return None;
    }
    if auction.time_remaining_at(arrival) >= policy.extension_window_secs {
        return None;
    }
    Some(arrival + policy.extension_window_secs)
}
