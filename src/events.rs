//! Engine event contract and the ordered per-auction publisher.
//!
//! Events for one auction are published in the order the supervisor
//! produced them; there is no ordering guarantee across auctions.
//! Delivery to the fan-out collaborator is at-least-once; consumers
//! deduplicate on [`EngineEvent::idempotency_key`]. Sealed proxy
//! ceilings never appear in any payload.

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::EVENT_DELIVERY_MAX_RETRIES;
use crate::error::{EngineError, EngineResult};
use crate::model::{AuctionId, BidId, BidderId};
use crate::traits::EventSink;
use crate::util::{self, MAX_EVENT_PAYLOAD_SIZE};

/// What happened, with the observable payload for the fan-out layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    /// A bid passed the gate and was resolved.
    BidAccepted {
        bidder: BidderId,
        /// The auction's price after resolution, never the sealed ceiling.
        price: u64,
        /// Whether the accepted bid ended up leading.
        winning: bool,
    },
    /// A previously leading (or just-admitted) bid was displaced.
    BidOutbid { bidder: BidderId, price: u64 },
    /// A late bid pushed the close time out.
    AuctionExtended {
        new_end_time: u64,
        extension_count: u32,
    },
    /// The auction closed; `winner` is absent for no-sale closes.
    AuctionEnded {
        winner: Option<BidderId>,
        final_price: Option<u64>,
    },
    /// The auction was withdrawn before completion.
    AuctionCancelled,
}

impl EventKind {
    /// Stable name used in the idempotency key.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::BidAccepted { .. } => "BidAccepted",
            Self::BidOutbid { .. } => "BidOutbid",
            Self::AuctionExtended { .. } => "AuctionExtended",
            Self::AuctionEnded { .. } => "AuctionEnded",
            Self::AuctionCancelled => "AuctionCancelled",
        }
    }
}

/// One ordered event as handed to the fan-out collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
    pub auction_id: AuctionId,
    /// The bid the event is about, when there is one.
    pub bid_id: Option<BidId>,
    /// Per-auction sequence number assigned at publish time.
    pub sequence: u64,
    pub at: u64,
    pub kind: EventKind,
}

impl EngineEvent {
    /// Key on which duplicate deliveries are harmless.
    pub fn idempotency_key(&self) -> (AuctionId, Option<BidId>, &'static str) {
        (self.auction_id, self.bid_id, self.kind.name())
    }

    /// Encode for the wire (CBOR, the fan-out transport format).
    pub fn to_cbor(&self) -> EngineResult<Vec<u8>> {
        let mut buffer = Vec::new();
        ciborium::into_writer(self, &mut buffer)
            .map_err(|e| EngineError::Validation(format!("failed to encode event: {e}")))?;
        Ok(buffer)
    }

    /// Decode from the wire with a size cap.
    pub fn from_cbor(data: &[u8]) -> EngineResult<Self> {
        util::cbor_from_limited_reader(data, MAX_EVENT_PAYLOAD_SIZE)
    }
}

/// Ordered publisher for a single auction's event stream.
///
/// Owned by that auction's supervisor task, so publishing inherits the
/// task's serialization: events go out in production order. Transient
/// sink failures are retried with backoff; after the budget the event is
/// dropped with an error log (the sink contract is at-least-once, and a
/// dead fan-out layer must not wedge bid processing).
pub struct EventPublisher<P: EventSink> {
    sink: P,
    auction_id: AuctionId,
    next_sequence: u64,
}

impl<P: EventSink> EventPublisher<P> {
    pub const fn new(sink: P, auction_id: AuctionId) -> Self {
        Self {
            sink,
            auction_id,
            next_sequence: 0,
        }
    }

    /// Publish one event, stamping the per-auction sequence.
    pub async fn publish(&mut self, bid_id: Option<BidId>, at: u64, kind: EventKind) {
        let event = EngineEvent {
            auction_id: self.auction_id,
            bid_id,
            sequence: self.next_sequence,
            at,
            kind,
        };
        self.next_sequence += 1;

        let delivery = util::with_backoff("event delivery", EVENT_DELIVERY_MAX_RETRIES, 10, || {
            let sink = self.sink.clone();
            let event = event.clone();
            async move { sink.deliver(&event).await }
        })
        .await;

        match delivery {
            Ok(()) => debug!(
                "published {} #{} for auction {}",
                event.kind.name(),
                event.sequence,
                event.auction_id
            ),
            Err(e) => error!(
                "dropping {} #{} for auction {} after retries: {}",
                event.kind.name(),
                event.sequence,
                event.auction_id,
                e
            ),
        }
    }
}
