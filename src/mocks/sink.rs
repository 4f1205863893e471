//! Capturing event sink for asserting on published streams.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::events::EngineEvent;
use crate::model::AuctionId;
use crate::traits::EventSink;

#[derive(Default)]
struct Inner {
    events: Vec<EngineEvent>,
    fail_deliveries: u32,
}

/// [`EventSink`] that records every delivered event in order.
#[derive(Clone, Default)]
pub struct CapturingSink {
    inner: Arc<RwLock<Inner>>,
}

impl CapturingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All delivered events, in delivery order.
    pub async fn events(&self) -> Vec<EngineEvent> {
        self.inner.read().await.events.clone()
    }

    /// Delivered events for one auction, in delivery order.
    pub async fn events_for(&self, auction: AuctionId) -> Vec<EngineEvent> {
        self.inner
            .read()
            .await
            .events
            .iter()
            .filter(|e| e.auction_id == auction)
            .cloned()
            .collect()
    }

    /// Make the next `n` deliveries fail with a transient error.
    pub async fn fail_next(&self, n: u32) {
        self.inner.write().await.fail_deliveries = n;
    }

    pub async fn clear(&self) {
        self.inner.write().await.events.clear();
    }
}

#[async_trait]
impl EventSink for CapturingSink {
    async fn deliver(&self, event: &EngineEvent) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.fail_deliveries > 0 {
            inner.fail_deliveries -= 1;
            bail!("injected transient delivery failure");
        }
        inner.events.push(event.clone());
        Ok(())
    }
}
