//! The bidding engine facade.
//!
//! [`BiddingEngine`] owns one actor per tracked auction and routes
//! commands to them. Auctions are processed concurrently across actors;
//! within one auction everything is serialized by its actor's queue.
//! Two bids for different auctions never block each other.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Policy;
use crate::error::{EngineError, EngineResult};
use crate::model::{Auction, AuctionId, Bid, BidId, BidKind, BidderId};
use crate::supervisor::{
    AuctionActor, BidReceipt, Command, CounterKind, ModerationAction, SubmitBid,
};
use crate::traits::{BidderDirectory, EventSink, RecordStore, TimeProvider};

struct ActorHandle {
    tx: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

/// The auction bidding engine, generic over its collaborator seams so
/// the same code path tested with mocks runs in production.
///
/// # Lock ordering
///
/// `actors` before `clock_handle`; neither is held across an `.await`.
pub struct BiddingEngine<S, D, P, C>
where
    S: RecordStore,
    D: BidderDirectory,
    P: EventSink,
    C: TimeProvider + Clone + Send + Sync + 'static,
{
    policy: Arc<Policy>,
    store: S,
    directory: D,
    sink: P,
    time: C,
    /// One actor per tracked auction; the sole serialization unit for
    /// that auction's writes.
    actors: RwLock<HashMap<AuctionId, ActorHandle>>,
    /// Token used to signal graceful shutdown of background tasks.
    shutdown: CancellationToken,
    /// Handle for the background clock task.
    clock_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<S, D, P, C> BiddingEngine<S, D, P, C>
where
    S: RecordStore,
    D: BidderDirectory,
    P: EventSink,
    C: TimeProvider + Clone + Send + Sync + 'static,
{
    pub fn new(policy: Policy, store: S, directory: D, sink: P, time: C) -> Self {
        Self {
            policy: Arc::new(policy),
            store,
            directory,
            sink,
            time,
            actors: RwLock::new(HashMap::new()),
            shutdown: CancellationToken::new(),
            clock_handle: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Submit a bid. Returns the admission outcome, or an error from the
    /// taxonomy: `Validation` for malformed requests, `Timeout` when the
    /// deadline or retry budget is exceeded (the caller may retry;
    /// supplying `bid_id` makes the retry an idempotent replay).
    pub async fn submit_bid(&self, request: SubmitBid) -> EngineResult<BidReceipt> {
        validate_request(&request)?;
        let tx = self.ensure_actor(request.auction_id).await?;

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(Command::Submit {
            request,
            reply: reply_tx,
        })
        .await
        .map_err(|_| EngineError::Closed("auction processing has stopped".into()))?;

        let deadline = Duration::from_millis(self.policy.admission_deadline_ms);
        match tokio::time::timeout(deadline, reply_rx).await {
            Err(_) => Err(EngineError::Timeout),
            Ok(Err(_)) => Err(EngineError::Closed("auction processing has stopped".into())),
            Ok(Ok(outcome)) => outcome,
        }
    }

    /// Retract a bid. Allowed only for the bid's owner while the bid is
    /// Active or Winning and the auction has not ended; the remaining
    /// field is re-resolved as if the bid never existed.
    pub async fn retract_bid(
        &self,
        auction_id: AuctionId,
        bid_id: BidId,
        bidder: BidderId,
        reason: impl Into<String>,
    ) -> EngineResult<()> {
        let tx = self.ensure_actor(auction_id).await?;
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(Command::Retract {
            bid_id,
            bidder,
            reason: reason.into(),
            reply: reply_tx,
        })
        .await
        .map_err(|_| EngineError::Closed("auction processing has stopped".into()))?;
        reply_rx
            .await
            .map_err(|_| EngineError::Closed("auction processing has stopped".into()))?
    }

    pub async fn suspend_auction(&self, id: AuctionId) -> EngineResult<()> {
        self.moderate(id, ModerationAction::Suspend).await
    }

    pub async fn resume_auction(&self, id: AuctionId) -> EngineResult<()> {
        self.moderate(id, ModerationAction::Resume).await
    }

    pub async fn cancel_auction(&self, id: AuctionId) -> EngineResult<()> {
        self.moderate(id, ModerationAction::Cancel).await
    }

    /// Current auction snapshot. This is the display read path; it may
    /// be served stale relative to in-flight admissions.
    pub async fn get_auction(&self, id: AuctionId) -> EngineResult<Auction> {
        self.store
            .load_auction(id)
            .await
            .map_err(|e| EngineError::Store(format!("loading auction {id}: {e}")))?
            .ok_or_else(|| EngineError::NotFound(format!("auction {id}")))
    }

    /// Bid history for display. Sealed proxy ceilings are redacted while
    /// the bid is live: only the resulting price and leader are
    /// observable before a ceiling retires.
    pub async fn get_bids(&self, id: AuctionId) -> EngineResult<Vec<Bid>> {
        let mut bids = self
            .store
            .load_bids(id)
            .await
            .map_err(|e| EngineError::Store(format!("loading bids for {id}: {e}")))?;
        for bid in &mut bids {
            if !bid.status.is_terminal() {
                bid.max_amount = None;
            }
        }
        Ok(bids)
    }

    /// Bump the view counter (serialized with the auction's writes).
    pub async fn record_view(&self, id: AuctionId) -> EngineResult<()> {
        self.touch(id, CounterKind::View).await
    }

    /// Bump the watch counter.
    pub async fn record_watch(&self, id: AuctionId) -> EngineResult<()> {
        self.touch(id, CounterKind::Watch).await
    }

    /// Start tracking an auction: spawn its actor so the lifecycle clock
    /// drives activation, dutch descent, and natural close.
    pub async fn track_auction(&self, id: AuctionId) -> EngineResult<()> {
        self.ensure_actor(id).await.map(|_| ())
    }

    /// Drive one lifecycle tick for a single auction and wait for it to
    /// be processed. Deterministic alternative to the background clock.
    pub async fn tick_auction(&self, id: AuctionId) -> EngineResult<()> {
        let tx = self.ensure_actor(id).await?;
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(Command::Tick {
            now: self.time.now_unix(),
            reply: Some(reply_tx),
        })
        .await
        .map_err(|_| EngineError::Closed("auction processing has stopped".into()))?;
        reply_rx
            .await
            .map_err(|_| EngineError::Closed("auction processing has stopped".into()))
    }

    /// Start the background lifecycle clock.
    ///
    /// Every tick fans a `Tick` command out to all tracked actors. Ticks
    /// to a busy actor are dropped rather than queued up; the next tick
    /// covers for them.
    pub fn start_clock(self: Arc<Self>) {
        info!("starting auction lifecycle clock");
        let token = self.shutdown.clone();
        let engine = Arc::clone(&self);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = token.cancelled() => {
                        info!("lifecycle clock shutting down");
                        break;
                    }
                    () = tokio::time::sleep(Duration::from_secs(engine.policy.clock_tick_secs)) => {}
                }

                let now = engine.time.now_unix();
                let txs: Vec<_> = engine
                    .actors
                    .read()
                    .values()
                    .map(|h| h.tx.clone())
                    .collect();
                for tx in txs {
                    if tx.try_send(Command::Tick { now, reply: None }).is_err() {
                        debug!("tick skipped for a busy or stopped auction actor");
                    }
                }
            }
        });

        *self.clock_handle.lock() = Some(handle);
    }

    /// Stop the clock and every auction actor, draining in-flight
    /// commands first.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let clock = self.clock_handle.lock().take();
        if let Some(clock) = clock {
            let _ = clock.await;
        }

        let handles: Vec<ActorHandle> = {
            let mut actors = self.actors.write();
            actors.drain().map(|(_, h)| h).collect()
        };
        for handle in handles {
            drop(handle.tx);
            let _ = handle.task.await;
        }
        info!("bidding engine shut down");
    }

    async fn moderate(&self, id: AuctionId, action: ModerationAction) -> EngineResult<()> {
        let tx = self.ensure_actor(id).await?;
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(Command::Moderate {
            action,
            reply: reply_tx,
        })
        .await
        .map_err(|_| EngineError::Closed("auction processing has stopped".into()))?;
        reply_rx
            .await
            .map_err(|_| EngineError::Closed("auction processing has stopped".into()))?
    }

    async fn touch(&self, id: AuctionId, counter: CounterKind) -> EngineResult<()> {
        let tx = self.ensure_actor(id).await?;
        tx.send(Command::Touch { counter })
            .await
            .map_err(|_| EngineError::Closed("auction processing has stopped".into()))
    }

    /// Get (or lazily spawn) the actor owning `id`.
    ///
    /// A concurrent first touch can spawn twice; the loser is aborted
    /// before it has received any command, so exactly one writer
    /// survives per auction.
    async fn ensure_actor(&self, id: AuctionId) -> EngineResult<mpsc::Sender<Command>> {
        if let Some(handle) = self.actors.read().get(&id) {
            return Ok(handle.tx.clone());
        }

        let (tx, task) = AuctionActor::spawn(
            Arc::clone(&self.policy),
            self.store.clone(),
            self.directory.clone(),
            self.sink.clone(),
            self.time.clone(),
            id,
        )
        .await?;

        let mut actors = self.actors.write();
        match actors.entry(id) {
            Entry::Occupied(existing) => {
                task.abort();
                Ok(existing.get().tx.clone())
            }
            Entry::Vacant(slot) => {
                slot.insert(ActorHandle {
                    tx: tx.clone(),
                    task,
                });
                Ok(tx)
            }
        }
    }
}

/// Shape checks applied before a request reaches any auction state.
fn validate_request(request: &SubmitBid) -> EngineResult<()> {
    if request.amount == 0 {
        return Err(EngineError::Validation("bid amount must be positive".into()));
    }
    match request.kind {
        BidKind::Automatic => match request.max_amount {
            None => Err(EngineError::Validation(
                "automatic bids require a maximum amount".into(),
            )),
            Some(max) if max < request.amount => Err(EngineError::Validation(
                "maximum amount must not be below the bid amount".into(),
            )),
            Some(_) => Ok(()),
        },
        BidKind::Manual | BidKind::BuyNow => {
            if request.max_amount.is_some() {
                Err(EngineError::Validation(
                    "only automatic bids carry a maximum amount".into(),
                ))
            } else {
                Ok(())
            }
        }
    }
}
