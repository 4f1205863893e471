//! Auction record store abstraction.
//!
//! The store exclusively owns durable auction and bid state; the engine
//! holds only the in-flight working set for the auction it is currently
//! serializing. Access for a given auction is single-writer (the owning
//! supervisor task); display reads may come from replicas with eventual
//! consistency, which never affects engine correctness.

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{Auction, AuctionId, Bid, BidId, BidTransition};

/// One atomic durability unit: the auction row, every bid row touched by
/// the step, and the audit-log entries the step produced.
///
/// A commit either lands completely or not at all. Commits are idempotent
/// by record id: replaying the same step after a crash upserts identical
/// rows and appends no observable change, which is what makes the
/// supervisor's retry loop safe.
#[derive(Debug, Clone)]
pub struct CommitStep {
    pub auction: Auction,
    pub bids: Vec<Bid>,
    pub transitions: Vec<BidTransition>,
}

/// Abstraction over the durable auction/bid store.
#[async_trait]
pub trait RecordStore: Send + Sync + Clone + 'static {
    /// Load an auction by id. `None` if it does not exist.
    async fn load_auction(&self, id: AuctionId) -> Result<Option<Auction>>;

    /// Load all bids of an auction, in arrival-sequence order.
    async fn load_bids(&self, auction: AuctionId) -> Result<Vec<Bid>>;

    /// Allocate the next bid id.
    async fn next_bid_id(&self) -> Result<BidId>;

    /// Atomically persist one serialized step.
    async fn commit(&self, step: CommitStep) -> Result<()>;
}
