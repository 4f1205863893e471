//! Proxy bid resolution: ascending English auction with second-price
//! semantics over sealed proxy ceilings.
//!
//! Every live bid competes with an effective ceiling: the stated amount
//! for manual bids, the sealed `max_amount` for automatic ones. The
//! resolver is pure: it reports the new price, the new leader, and the
//! status changes; the supervisor persists and publishes them.

use crate::config::Policy;
use crate::model::{Auction, Bid, BidId, BidKind, BidStatus};

/// A status change the resolution produced, in the order it should be
/// logged and published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub bid_id: BidId,
    pub from: BidStatus,
    pub to: BidStatus,
}

/// Outcome of one resolution step.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub new_price: u64,
    pub leader: Option<BidId>,
    pub changes: Vec<StatusChange>,
}

/// Resolve an incoming bid against the auction's live field.
///
/// `live` is the auction's existing bids (any status; non-live ones are
/// ignored); `incoming` is the newly admitted bid, not yet in `live`.
/// The price never decreases on an admission.
pub fn resolve(policy: &Policy, auction: &Auction, live: &[Bid], incoming: &Bid) -> Resolution {
    let mut field: Vec<&Bid> = live.iter().filter(|b| b.is_live()).collect();
    field.push(incoming);

    let winner = best(&field).expect("field contains at least the incoming bid");
    let runner_up = field
        .iter()
        .filter(|b| b.id != winner.id)
        .map(|b| b.ceiling())
        .max();

    let price = settle_price(policy, auction, winner, runner_up)
        .max(auction.current_price)
        .max(auction.starting_price);

    Resolution {
        new_price: price,
        leader: Some(winner.id),
        changes: status_changes(&field, winner.id),
    }
}

/// Re-resolve after a bid was removed (retraction), exactly as if the
/// removed bid had never existed.
///
/// `remaining` is the live field without the removed bid. Unlike an
/// admission, the price is recomputed from scratch and may decrease.
pub fn resolve_after_removal(policy: &Policy, auction: &Auction, remaining: &[Bid]) -> Resolution {
    let field: Vec<&Bid> = remaining.iter().filter(|b| b.is_live()).collect();

    let Some(winner) = best(&field) else {
        return Resolution {
            new_price: auction.starting_price,
            leader: None,
            changes: Vec::new(),
        };
    };

    let runner_up = field
        .iter()
        .filter(|b| b.id != winner.id)
        .map(|b| b.ceiling())
        .max();

    let price = settle_price(policy, auction, winner, runner_up).max(auction.starting_price);

    Resolution {
        new_price: price,
        leader: Some(winner.id),
        changes: status_changes(&field, winner.id),
    }
}

/// The bid that wins the field: highest ceiling, ties broken by earliest
/// `created_at`, then lowest arrival sequence. The tie-break keeps an
/// incumbent in the lead against an equal later ceiling.
fn best<'a>(field: &[&'a Bid]) -> Option<&'a Bid> {
    field
        .iter()
        .copied()
        .max_by(|a, b| {
            a.ceiling()
                .cmp(&b.ceiling())
                .then(b.created_at.cmp(&a.created_at))
                .then(b.sequence.cmp(&a.sequence))
        })
}

/// Second-price settlement: a manual winner stands at its stated amount;
/// an automatic winner pays one increment above the runner-up ceiling,
/// capped at its own ceiling. Unopposed, the price rests at the start.
fn settle_price(policy: &Policy, auction: &Auction, winner: &Bid, runner_up: Option<u64>) -> u64 {
    match winner.kind {
        BidKind::Automatic => match runner_up {
            Some(r) => winner.ceiling().min(r + policy.increment_for(r)),
            None => auction.starting_price,
        },
        BidKind::Manual | BidKind::BuyNow => winner.amount,
    }
}

/// Status changes for the resolved field: the winner becomes `Winning`,
/// every other bid still marked `Active` or `Winning` becomes `Outbid`.
fn status_changes(field: &[&Bid], winner: BidId) -> Vec<StatusChange> {
    let mut changes = Vec::new();
    for bid in field {
        let to = if bid.id == winner {
            BidStatus::Winning
        } else {
            BidStatus::Outbid
        };
        if bid.status != to {
            changes.push(StatusChange {
                bid_id: bid.id,
                from: bid.status,
                to,
            });
        }
    }
    changes
}
