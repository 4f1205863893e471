//! Mock bidder directory with preset snapshots.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::model::{BidderId, BidderSnapshot};
use crate::traits::BidderDirectory;

#[derive(Default)]
struct Inner {
    snapshots: HashMap<BidderId, BidderSnapshot>,
    fail_lookups: u32,
}

/// In-memory [`BidderDirectory`] with per-call failure injection.
#[derive(Clone, Default)]
pub struct MockDirectory {
    inner: Arc<RwLock<Inner>>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a snapshot for a bidder.
    pub async fn insert(&self, snapshot: BidderSnapshot) {
        let mut inner = self.inner.write().await;
        inner.snapshots.insert(snapshot.bidder_id, snapshot);
    }

    /// Register a clean, active-account snapshot for each given bidder.
    pub async fn insert_good_standing(&self, bidders: &[BidderId]) {
        let mut inner = self.inner.write().await;
        for &bidder in bidders {
            inner
                .snapshots
                .insert(bidder, BidderSnapshot::good_standing(bidder));
        }
    }

    /// Make the next `n` lookups fail with a transient error.
    pub async fn fail_next(&self, n: u32) {
        self.inner.write().await.fail_lookups = n;
    }
}

#[async_trait]
impl BidderDirectory for MockDirectory {
    async fn snapshot(&self, bidder: BidderId) -> Result<BidderSnapshot> {
        let mut inner = self.inner.write().await;
        if inner.fail_lookups > 0 {
            inner.fail_lookups -= 1;
            bail!("injected transient directory failure");
        }
        match inner.snapshots.get(&bidder) {
            Some(snapshot) => Ok(snapshot.clone()),
            None => bail!("unknown bidder {bidder}"),
        }
    }
}
