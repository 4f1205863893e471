use serde::{Deserialize, Serialize};

use crate::model::{AuctionId, BidId, BidderId};

/// Status of a bid. Append-only via [`BidStatus::can_transition`]; a
/// violation is treated as a fatal inconsistency, never silently patched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BidStatus {
    /// Admitted, not yet resolved against the field.
    Active,
    /// The single current leader of its auction.
    Winning,
    /// Displaced by a higher bid; automatic bids remain in contention
    /// for re-resolution after a retraction.
    Outbid,
    /// Final leader of a closed auction.
    Won,
    /// Terminal state for every other bid of a closed auction.
    Lost,
    /// Withdrawn by the bidder before closure; kept for audit.
    Retracted,
    /// Turned away by the eligibility gate; kept for audit.
    Rejected,
}

impl BidStatus {
    /// Whether a transition to `next` is legal.
    pub fn can_transition(self, next: Self) -> bool {
        use BidStatus::{Active, Lost, Outbid, Retracted, Winning, Won};
        matches!(
            (self, next),
            (Active, Winning | Outbid | Retracted | Lost)
                | (Winning, Outbid | Won | Lost | Retracted)
                | (Outbid, Winning | Retracted | Lost)
        )
    }

    /// Whether the bid still participates in proxy resolution.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Active | Self::Winning | Self::Outbid)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Won | Self::Lost | Self::Retracted | Self::Rejected)
    }
}

/// How the bid was placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BidKind {
    /// A one-shot bid at a stated amount.
    Manual,
    /// A proxy bid carrying a sealed ceiling the engine raises toward.
    Automatic,
    /// An instant purchase at or above the auction's buy-now price.
    BuyNow,
}

/// A bid record as held in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    pub auction_id: AuctionId,
    pub bidder: BidderId,

    /// The bid's standing amount in minor units. For automatic bids this
    /// is the entry amount; the resolver raises the auction price, not
    /// this field.
    pub amount: u64,
    /// Sealed proxy ceiling, present iff `kind == Automatic`. Never
    /// exposed through events or read APIs while the bid is live.
    pub max_amount: Option<u64>,

    pub status: BidStatus,
    pub kind: BidKind,

    /// Flagged by the eligibility gate from the external fraud score.
    pub is_suspicious: bool,
    /// External fraud score (0.0-10.0) captured at admission.
    pub fraud_score: Option<f64>,

    /// Retraction or rejection reason, for audit review.
    pub note: Option<String>,

    /// Submission timestamp; immutable, part of the resolution order.
    pub created_at: u64,
    /// Per-auction arrival sequence assigned by the supervisor; the
    /// final tie-breaker of the resolution total order.
    pub sequence: u64,
}

impl Bid {
    /// Highest price this bid can reach: the sealed ceiling for automatic
    /// bids, the stated amount otherwise.
    pub fn ceiling(&self) -> u64 {
        self.max_amount.unwrap_or(self.amount)
    }

    pub fn is_live(&self) -> bool {
        self.status.is_live()
    }
}

/// One append-only entry of the per-auction bid-status audit log,
/// persisted atomically with the step that caused it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidTransition {
    pub auction_id: AuctionId,
    pub bid_id: BidId,
    /// `None` for the admission entry that creates the bid.
    pub from: Option<BidStatus>,
    pub to: BidStatus,
    pub at: u64,
    pub reason: Option<String>,
}
