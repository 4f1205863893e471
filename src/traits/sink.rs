//! Event fan-out abstraction.

use anyhow::Result;
use async_trait::async_trait;

use crate::events::EngineEvent;

/// Abstraction over the real-time broadcast / notification collaborator.
///
/// Delivery is at-least-once: the publisher may hand the same event to the
/// sink more than once, and consumers deduplicate on the event's
/// idempotency key `(auction_id, bid_id, event type)`.
#[async_trait]
pub trait EventSink: Send + Sync + Clone + 'static {
    /// Deliver one event downstream.
    async fn deliver(&self, event: &EngineEvent) -> Result<()>;
}
