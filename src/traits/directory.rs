//! Bidder directory abstraction: credit, account standing, fraud scores.

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{BidderId, BidderSnapshot};

/// Abstraction over the identity/fraud collaborator.
///
/// The lookup may be a remote call; the supervisor retries it with
/// bounded backoff and fails the single affected admission on exhaustion.
#[async_trait]
pub trait BidderDirectory: Send + Sync + Clone + 'static {
    /// Fetch the eligibility snapshot for a bidder, current as of now.
    async fn snapshot(&self, bidder: BidderId) -> Result<BidderSnapshot>;
}
