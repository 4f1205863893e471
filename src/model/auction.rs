use serde::{Deserialize, Serialize};

use crate::config::Policy;
use crate::model::{AuctionId, BidderId};
use crate::traits::TimeProvider;

/// Status of an auction in its lifecycle.
///
/// Transitions are one-directional except `Suspended`, which moderation
/// can clear back to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionStatus {
    /// Scheduled but not yet open for bids.
    Upcoming,
    /// Open and accepting bids.
    Active,
    /// Closed normally; winner (if any) is final.
    Ended,
    /// Withdrawn by the seller or moderation before completion.
    Cancelled,
    /// Frozen by moderation; no bids are admitted.
    Suspended,
}

impl AuctionStatus {
    /// Whether a transition to `next` is a legal lifecycle move.
    pub fn can_transition(self, next: Self) -> bool {
        use AuctionStatus::{Active, Cancelled, Ended, Suspended, Upcoming};
        matches!(
            (self, next),
            (Upcoming, Active | Cancelled)
                | (Active, Ended | Cancelled | Suspended)
                | (Suspended, Active | Cancelled)
        )
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Cancelled)
    }
}

/// Pricing discipline of an auction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionKind {
    /// Ascending English auction with proxy bidding.
    Standard,
    /// Standard rules plus a seller-set reserve that gates the sale.
    Reserve,
    /// Carries a buy-now price that ends the auction instantly when met.
    BuyNow,
    /// Price descends on a clock schedule; first admissible bid wins.
    Dutch,
    /// Fixed-increment raises only; proxy bids are not accepted.
    Penny,
}

impl AuctionKind {
    /// Whether the anti-sniping extender applies to this kind.
    pub fn extends_on_late_bids(self) -> bool {
        matches!(self, Self::Standard | Self::Reserve)
    }
}

/// Clock-owned price descent for dutch auctions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutchSchedule {
    /// Price drop applied per interval, in minor units.
    pub decrement: u64,
    /// Seconds between price drops.
    pub interval_secs: u64,
    /// Price never descends below this.
    pub floor_price: u64,
}

impl DutchSchedule {
    /// Price at `now` for an auction that opened at `start` with
    /// `starting_price`. Descent is stepwise, never below the floor.
    pub fn price_at(&self, starting_price: u64, start: u64, now: u64) -> u64 {
        if self.interval_secs == 0 {
            return starting_price.max(self.floor_price);
        }
        let steps = now.saturating_sub(start) / self.interval_secs;
        starting_price
            .saturating_sub(self.decrement.saturating_mul(steps))
            .max(self.floor_price)
    }
}

/// An auction record as held in the store.
///
/// The engine owns `current_price`, `end_time`, `extension_count`,
/// `status`, `bid_count`, and the winner fields; `is_paid`/`is_shipped`
/// belong to the payment and shipping collaborators and are read-only
/// here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auction {
    pub id: AuctionId,
    pub seller: BidderId,
    pub title: String,

    /// Opening price in minor currency units. `current_price` never goes
    /// below it.
    pub starting_price: u64,
    pub current_price: u64,
    /// Seller-set minimum sale price; below it the auction ends unsold.
    pub reserve_price: Option<u64>,
    /// Instant-purchase price, required for `BuyNow`-kind auctions.
    pub buy_now_price: Option<u64>,
    /// Descent schedule, required for `Dutch`-kind auctions.
    pub dutch: Option<DutchSchedule>,

    pub start_time: u64,
    /// Moves only forward, and only via the anti-sniping extender.
    pub end_time: u64,
    pub extension_count: u32,

    pub status: AuctionStatus,
    pub kind: AuctionKind,

    // Monotone counters.
    pub bid_count: u32,
    pub watch_count: u32,
    pub view_count: u32,

    /// Set exactly once, at closure.
    pub winner_id: Option<BidderId>,
    pub final_price: Option<u64>,

    /// Owned by the payment/shipping collaborators.
    pub is_paid: bool,
    pub is_shipped: bool,

    pub created_at: u64,
    pub updated_at: u64,
}

impl Auction {
    /// Create a builder using the given time provider for `created_at`.
    pub const fn builder<T: TimeProvider>(time: T) -> AuctionBuilder<T> {
        AuctionBuilder::new(time)
    }

    /// Whether the auction is open for bids at `now`.
    pub fn is_open_at(&self, now: u64) -> bool {
        self.status == AuctionStatus::Active && now >= self.start_time && now < self.end_time
    }

    /// Whether the deadline has passed at `now`.
    pub const fn has_ended_at(&self, now: u64) -> bool {
        self.end_time <= now
    }

    /// Seconds remaining at `now` (0 once ended).
    pub const fn time_remaining_at(&self, now: u64) -> u64 {
        self.end_time.saturating_sub(now)
    }

    /// Whether the reserve is met (vacuously true without one).
    pub fn reserve_met(&self) -> bool {
        self.reserve_price.map_or(true, |r| self.current_price >= r)
    }

    /// Smallest admissible next bid under the policy increment table.
    ///
    /// Before the first bid the starting price itself is admissible.
    pub fn minimum_next_bid(&self, policy: &Policy) -> u64 {
        if self.bid_count == 0 {
            self.starting_price
        } else {
            self.current_price + policy.increment_for(self.current_price)
        }
    }

    /// Current descending price for a dutch auction at `now`; falls back
    /// to `current_price` for every other kind.
    pub fn dutch_price_at(&self, now: u64) -> u64 {
        match self.dutch {
            Some(schedule) => schedule.price_at(self.starting_price, self.start_time, now),
            None => self.current_price,
        }
    }
}

/// Builder for auction records.
pub struct AuctionBuilder<T: TimeProvider> {
    time: T,
    id: Option<AuctionId>,
    seller: Option<BidderId>,
    title: Option<String>,
    starting_price: Option<u64>,
    reserve_price: Option<u64>,
    buy_now_price: Option<u64>,
    dutch: Option<DutchSchedule>,
    start_time: Option<u64>,
    duration_secs: Option<u64>,
    kind: AuctionKind,
}

impl<T: TimeProvider> AuctionBuilder<T> {
    pub const fn new(time: T) -> Self {
        Self {
            time,
            id: None,
            seller: None,
            title: None,
            starting_price: None,
            reserve_price: None,
            buy_now_price: None,
            dutch: None,
            start_time: None,
            duration_secs: None,
            kind: AuctionKind::Standard,
        }
    }

    #[must_use]
    pub const fn id(mut self, id: AuctionId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub const fn seller(mut self, seller: BidderId) -> Self {
        self.seller = Some(seller);
        self
    }

    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub const fn starting_price(mut self, amount: u64) -> Self {
        self.starting_price = Some(amount);
        self
    }

    #[must_use]
    pub const fn reserve_price(mut self, amount: u64) -> Self {
        self.reserve_price = Some(amount);
        self
    }

    #[must_use]
    pub const fn buy_now_price(mut self, amount: u64) -> Self {
        self.buy_now_price = Some(amount);
        self
    }

    #[must_use]
    pub const fn dutch(mut self, schedule: DutchSchedule) -> Self {
        self.dutch = Some(schedule);
        self
    }

    /// Opening time; defaults to the builder's clock "now".
    #[must_use]
    pub const fn start_time(mut self, at: u64) -> Self {
        self.start_time = Some(at);
        self
    }

    #[must_use]
    pub const fn duration(mut self, seconds: u64) -> Self {
        self.duration_secs = Some(seconds);
        self
    }

    #[must_use]
    pub const fn kind(mut self, kind: AuctionKind) -> Self {
        self.kind = kind;
        self
    }

    /// Build the auction (returns an error naming the missing field).
    pub fn build(self) -> Result<Auction, String> {
        let now = self.time.now_unix();
        let starting_price = self.starting_price.ok_or("starting_price is required")?;
        let start_time = self.start_time.unwrap_or(now);
        let kind = self.kind;

        if kind == AuctionKind::BuyNow && self.buy_now_price.is_none() {
            return Err("buy_now_price is required for buy-now auctions".into());
        }
        if kind == AuctionKind::Dutch && self.dutch.is_none() {
            return Err("dutch schedule is required for dutch auctions".into());
        }
        if kind == AuctionKind::Reserve && self.reserve_price.is_none() {
            return Err("reserve_price is required for reserve auctions".into());
        }

        let status = if now >= start_time {
            AuctionStatus::Active
        } else {
            AuctionStatus::Upcoming
        };

        Ok(Auction {
            id: self.id.ok_or("id is required")?,
            seller: self.seller.ok_or("seller is required")?,
            title: self.title.ok_or("title is required")?,
            starting_price,
            current_price: starting_price,
            reserve_price: self.reserve_price,
            buy_now_price: self.buy_now_price,
            dutch: self.dutch,
            start_time,
            end_time: start_time + self.duration_secs.ok_or("duration is required")?,
            extension_count: 0,
            status,
            kind,
            bid_count: 0,
            watch_count: 0,
            view_count: 0,
            winner_id: None,
            final_price: None,
            is_paid: false,
            is_shipped: false,
            created_at: now,
            updated_at: now,
        })
    }
}
