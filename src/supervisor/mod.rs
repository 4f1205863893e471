//! Per-auction lifecycle supervision.
//!
//! Every auction is owned by exactly one actor task; bids for the same
//! auction are admitted and resolved strictly one at a time, in arrival
//! order at the actor's queue. That single-owner serialization, not
//! engine-wide locking, is what makes the second-price outcome
//! deterministic. Bids for different auctions never block each other.

mod actor;

pub(crate) use actor::AuctionActor;

use tokio::sync::oneshot;

use crate::error::EngineResult;
use crate::gate::RejectReason;
use crate::model::{AuctionId, BidId, BidKind, BidderId};

/// A bid submission as received from the transport layer.
#[derive(Debug, Clone)]
pub struct SubmitBid {
    pub auction_id: AuctionId,
    pub bidder: BidderId,
    /// Stated amount in minor units.
    pub amount: u64,
    /// Sealed proxy ceiling; required for automatic bids, forbidden
    /// otherwise.
    pub max_amount: Option<u64>,
    pub kind: BidKind,
    /// Optional idempotency key: resubmitting with a bid id returned by
    /// an earlier attempt replays the recorded outcome instead of
    /// creating a new bid.
    pub bid_id: Option<BidId>,
}

/// Synchronous answer to a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidReceipt {
    pub accepted: bool,
    pub bid_id: BidId,
    /// Present when the gate rejected the bid.
    pub reason: Option<RejectReason>,
    /// Auction price after the step.
    pub current_price: u64,
    /// Whether the submitted bid is the current leader.
    pub winning: bool,
}

/// Moderation overrides on a single auction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationAction {
    Suspend,
    Resume,
    Cancel,
}

/// Monotone display counters the engine bumps on behalf of read traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKind {
    View,
    Watch,
}

/// Commands processed by an auction's actor, one at a time.
#[derive(Debug)]
pub(crate) enum Command {
    Submit {
        request: SubmitBid,
        reply: oneshot::Sender<EngineResult<BidReceipt>>,
    },
    Retract {
        bid_id: BidId,
        bidder: BidderId,
        reason: String,
        reply: oneshot::Sender<EngineResult<()>>,
    },
    Moderate {
        action: ModerationAction,
        reply: oneshot::Sender<EngineResult<()>>,
    },
    /// Lifecycle clock: activation, dutch descent, natural close. The
    /// background clock sends these without a reply; tests and callers
    /// that need a completed tick attach one.
    Tick {
        now: u64,
        reply: Option<oneshot::Sender<()>>,
    },
    /// View/watch counter bump, serialized with the auction's writes.
    Touch { counter: CounterKind },
}
