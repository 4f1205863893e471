//! In-memory record store with scripted failure injection.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::model::{Auction, AuctionId, Bid, BidId, BidTransition};
use crate::traits::{CommitStep, RecordStore};

#[derive(Default)]
struct Inner {
    auctions: HashMap<AuctionId, Auction>,
    bids: HashMap<BidId, Bid>,
    by_auction: HashMap<AuctionId, Vec<BidId>>,
    log: Vec<BidTransition>,
    next_bid_id: u64,
    fail_commits: u32,
    commit_count: u64,
}

/// In-memory [`RecordStore`]. Commits are upserts keyed by record id, so
/// replaying a step is observably idempotent, the property the engine's
/// crash-recovery retry depends on.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an auction, as the out-of-scope listing endpoint would.
    pub async fn seed_auction(&self, auction: Auction) {
        let mut inner = self.inner.write().await;
        inner.auctions.insert(auction.id, auction);
    }

    /// Make the next `n` commits fail with a transient error.
    pub async fn fail_next_commits(&self, n: u32) {
        self.inner.write().await.fail_commits = n;
    }

    /// Number of commits that have landed.
    pub async fn commit_count(&self) -> u64 {
        self.inner.read().await.commit_count
    }

    /// The append-only bid-status audit log for one auction.
    pub async fn transition_log(&self, auction: AuctionId) -> Vec<BidTransition> {
        self.inner
            .read()
            .await
            .log
            .iter()
            .filter(|t| t.auction_id == auction)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn load_auction(&self, id: AuctionId) -> Result<Option<Auction>> {
        Ok(self.inner.read().await.auctions.get(&id).cloned())
    }

    async fn load_bids(&self, auction: AuctionId) -> Result<Vec<Bid>> {
        let inner = self.inner.read().await;
        let ids = inner.by_auction.get(&auction).cloned().unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| inner.bids.get(id).cloned())
            .collect())
    }

    async fn next_bid_id(&self) -> Result<BidId> {
        let mut inner = self.inner.write().await;
        inner.next_bid_id += 1;
        Ok(BidId(inner.next_bid_id))
    }

    async fn commit(&self, step: CommitStep) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.fail_commits > 0 {
            inner.fail_commits -= 1;
            bail!("injected transient store failure");
        }

        inner.auctions.insert(step.auction.id, step.auction.clone());
        for bid in step.bids {
            let auction_bids = inner.by_auction.entry(bid.auction_id).or_default();
            if !auction_bids.contains(&bid.id) {
                auction_bids.push(bid.id);
            }
            inner.bids.insert(bid.id, bid);
        }
        inner.log.extend(step.transitions);
        inner.commit_count += 1;
        Ok(())
    }
}
