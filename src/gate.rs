//! Eligibility gate: policy checks a bid must pass before admission.
//!
//! The gate is a pure function over its inputs: no clock reads, no
//! store access, no side effects. Persistence of the accept/reject
//! outcome happens downstream in the supervisor.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::Policy;
use crate::model::{AccountStatus, Auction, AuctionKind, BidKind, BidderSnapshot};
use crate::supervisor::SubmitBid;

/// Why the gate turned a bid away. User-visible; never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// The auction is not accepting bids right now.
    AuctionNotOpen,
    /// The bidder's account cannot bid here (standing, or own auction).
    Ineligible,
    /// Credit score below the policy floor.
    InsufficientCredit,
    /// Fraud score at or above the reject threshold.
    FraudSuspected,
    /// The amount fails the pricing rule for the auction's kind.
    BidTooLow,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::AuctionNotOpen => "auction is not open for bidding",
            Self::Ineligible => "bidder is not eligible for this auction",
            Self::InsufficientCredit => "credit score below bidding minimum",
            Self::FraudSuspected => "bid failed fraud screening",
            Self::BidTooLow => "bid amount below the minimum for this auction",
        };
        f.write_str(text)
    }
}

/// Outcome of a passed gate: fraud annotations to persist with the bid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Admitted {
    /// Set when the fraud score falls in the flag band
    /// `[fraud_flag_threshold, fraud_reject_threshold)`.
    pub suspicious: bool,
    pub fraud_score: f64,
}

/// Run the admission checks in policy order; the first failure wins.
///
/// Check order: auction open, account standing (and not the seller),
/// credit floor, fraud threshold, pricing rule for the auction kind.
pub fn admit(
    policy: &Policy,
    auction: &Auction,
    snapshot: &BidderSnapshot,
    request: &SubmitBid,
    now: u64,
) -> Result<Admitted, RejectReason> {
    if !auction.is_open_at(now) {
        return Err(RejectReason::AuctionNotOpen);
    }

    if snapshot.account_status != AccountStatus::Active || snapshot.bidder_id == auction.seller {
        return Err(RejectReason::Ineligible);
    }

    if snapshot.credit_score < policy.min_credit_score {
        return Err(RejectReason::InsufficientCredit);
    }

    if snapshot.fraud_score >= policy.fraud_reject_threshold {
        return Err(RejectReason::FraudSuspected);
    }

    check_pricing(policy, auction, request, now)?;

    Ok(Admitted {
        suspicious: snapshot.fraud_score >= policy.fraud_flag_threshold,
        fraud_score: snapshot.fraud_score,
    })
}

/// Pricing rule per auction kind (gate step 5).
fn check_pricing(
    policy: &Policy,
    auction: &Auction,
    request: &SubmitBid,
    now: u64,
) -> Result<(), RejectReason> {
    if request.kind == BidKind::BuyNow {
        // Buy-now is admissible on any auction carrying a buy-now price,
        // but never below the standing price a bidding war has reached.
        return match auction.buy_now_price {
            Some(price) if request.amount >= price && request.amount >= auction.current_price => {
                Ok(())
            }
            _ => Err(RejectReason::BidTooLow),
        };
    }

    match auction.kind {
        AuctionKind::Dutch => {
            // Proxy ceilings have no meaning against a descending ask;
            // only manual bids at or above the current price qualify.
            if request.kind != BidKind::Manual {
                return Err(RejectReason::BidTooLow);
            }
            if request.amount >= auction.dutch_price_at(now) {
                Ok(())
            } else {
                Err(RejectReason::BidTooLow)
            }
        }
        AuctionKind::Penny => {
            // Fixed manual raise, exactly one increment above current.
            if request.kind != BidKind::Manual {
                return Err(RejectReason::BidTooLow);
            }
            if request.amount == auction.current_price + policy.penny_increment {
                Ok(())
            } else {
                Err(RejectReason::BidTooLow)
            }
        }
        AuctionKind::Standard | AuctionKind::Reserve | AuctionKind::BuyNow => {
            if request.amount >= auction.minimum_next_bid(policy) {
                Ok(())
            } else {
                Err(RejectReason::BidTooLow)
            }
        }
    }
}
