//! The per-auction actor: serialized admission, resolution, and
//! lifecycle transitions for one auction.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{BidReceipt, Command, CounterKind, ModerationAction, SubmitBid};
use crate::config::{Policy, COMMAND_QUEUE_DEPTH};
use crate::error::{EngineError, EngineResult};
use crate::events::{EventKind, EventPublisher};
use crate::extender;
use crate::gate::{self, Admitted, RejectReason};
use crate::model::{
    Auction, AuctionId, AuctionKind, AuctionStatus, Bid, BidId, BidKind, BidStatus, BidTransition,
    BidderId, BidderSnapshot,
};
use crate::resolver;
use crate::traits::{BidderDirectory, CommitStep, EventSink, RecordStore, TimeProvider};
use crate::util::with_backoff;

/// Everything one serialized step wants to make durable and observable:
/// the auction row, the bid rows it touched, the audit-log entries, and
/// the events to publish once the commit lands.
struct PreparedStep {
    auction: Auction,
    bids: Vec<Bid>,
    transitions: Vec<BidTransition>,
    events: Vec<(Option<BidId>, EventKind)>,
}

impl PreparedStep {
    fn new(auction: Auction) -> Self {
        Self {
            auction,
            bids: Vec::new(),
            transitions: Vec::new(),
            events: Vec::new(),
        }
    }
}

/// Actor owning a single auction's working set.
///
/// The actor is the auction's only writer. Each command runs start to
/// finish before the next is taken: gate check, resolution, anti-snipe
/// extension, one atomic store commit, then event publication. If the
/// commit fails after retries, no state change or event is considered to
/// have happened.
pub(crate) struct AuctionActor<S, D, P, C>
where
    S: RecordStore,
    D: BidderDirectory,
    P: EventSink,
    C: TimeProvider,
{
    policy: Arc<Policy>,
    store: S,
    directory: D,
    publisher: EventPublisher<P>,
    time: C,

    auction: Auction,
    bids: Vec<Bid>,
    /// Arrival sequence for the next admitted bid.
    next_sequence: u64,
    /// Set after an invariant violation; all further commands are
    /// refused until moderation intervenes out of band.
    halted: bool,

    rx: mpsc::Receiver<Command>,
}

impl<S, D, P, C> AuctionActor<S, D, P, C>
where
    S: RecordStore,
    D: BidderDirectory,
    P: EventSink,
    C: TimeProvider + Clone + Send + 'static,
{
    /// Load the auction's durable state and start its actor task.
    pub(crate) async fn spawn(
        policy: Arc<Policy>,
        store: S,
        directory: D,
        sink: P,
        time: C,
        auction_id: AuctionId,
    ) -> EngineResult<(mpsc::Sender<Command>, JoinHandle<()>)> {
        let auction = with_backoff(
            "auction load",
            policy.store_max_retries,
            policy.store_retry_initial_delay_ms,
            || {
                let store = store.clone();
                async move { store.load_auction(auction_id).await }
            },
        )
        .await
        .map_err(|_| EngineError::Timeout)?
        .ok_or_else(|| EngineError::NotFound(format!("auction {auction_id}")))?;

        let bids = store
            .load_bids(auction_id)
            .await
            .map_err(|e| EngineError::Store(format!("loading bids for {auction_id}: {e}")))?;

        let next_sequence = bids.iter().map(|b| b.sequence + 1).max().unwrap_or(0);
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);

        let actor = Self {
            policy,
            store,
            directory,
            publisher: EventPublisher::new(sink, auction_id),
            time,
            auction,
            bids,
            next_sequence,
            halted: false,
            rx,
        };

        debug!("spawned actor for auction {}", auction_id);
        let handle = tokio::spawn(actor.run());
        Ok((tx, handle))
    }

    async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            match command {
                Command::Submit { request, reply } => {
                    let outcome = self.handle_submit(request).await;
                    let _ = reply.send(outcome);
                }
                Command::Retract {
                    bid_id,
                    bidder,
                    reason,
                    reply,
                } => {
                    let outcome = self.handle_retract(bid_id, bidder, reason).await;
                    let _ = reply.send(outcome);
                }
                Command::Moderate { action, reply } => {
                    let outcome = self.handle_moderate(action).await;
                    let _ = reply.send(outcome);
                }
                Command::Tick { now, reply } => {
                    if let Err(e) = self.handle_tick(now).await {
                        warn!("auction {}: tick failed: {}", self.auction.id, e);
                    }
                    if let Some(reply) = reply {
                        let _ = reply.send(());
                    }
                }
                Command::Touch { counter } => {
                    if let Err(e) = self.handle_touch(counter).await {
                        warn!("auction {}: counter update failed: {}", self.auction.id, e);
                    }
                }
            }
        }
        debug!("actor for auction {} stopped", self.auction.id);
    }

    // ------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------

    async fn handle_submit(&mut self, request: SubmitBid) -> EngineResult<BidReceipt> {
        self.check_not_halted()?;

        // Idempotent replay: a bid id we have already processed returns
        // the recorded outcome without new state changes or events.
        if let Some(id) = request.bid_id {
            if let Some(existing) = self.bids.iter().find(|b| b.id == id) {
                debug!("auction {}: replaying bid {}", self.auction.id, id);
                return Ok(self.receipt_for(existing));
            }
        }

        let now = self.time.now_unix();
        self.refresh_lifecycle(now).await?;

        // Corrupted durable state (e.g. two leaders) is quarantined, not
        // resolved over.
        let winning = self
            .bids
            .iter()
            .filter(|b| b.status == BidStatus::Winning)
            .count();
        if winning > 1 {
            let why = format!(
                "auction {}: {} winning bids found in stored state",
                self.auction.id, winning
            );
            error!("{}; suspending for moderation", why);
            self.halted = true;
            self.persist_quarantine(now).await;
            return Err(EngineError::Inconsistency(why));
        }

        let snapshot = self.lookup_snapshot(request.bidder).await?;

        match gate::admit(&self.policy, &self.auction, &snapshot, &request, now) {
            Err(reason) => self.reject(request, &snapshot, reason, now).await,
            Ok(admitted) => self.accept(request, &snapshot, admitted, now).await,
        }
    }

    /// Persist a gate rejection for audit; no counters move, no events.
    async fn reject(
        &mut self,
        request: SubmitBid,
        snapshot: &BidderSnapshot,
        reason: RejectReason,
        now: u64,
    ) -> EngineResult<BidReceipt> {
        let bid_id = self.allocate_bid_id(&request).await?;
        info!(
            "auction {}: rejecting bid {} from {}: {}",
            self.auction.id, bid_id, request.bidder, reason
        );

        let bid = Bid {
            id: bid_id,
            auction_id: self.auction.id,
            bidder: request.bidder,
            amount: request.amount,
            max_amount: request.max_amount,
            status: BidStatus::Rejected,
            kind: request.kind,
            is_suspicious: snapshot.fraud_score >= self.policy.fraud_flag_threshold,
            fraud_score: Some(snapshot.fraud_score),
            note: Some(reason.to_string()),
            created_at: now,
            sequence: self.next_sequence,
        };

        let mut step = PreparedStep::new(self.auction.clone());
        step.auction.updated_at = now;
        step.transitions.push(BidTransition {
            auction_id: self.auction.id,
            bid_id,
            from: None,
            to: BidStatus::Rejected,
            at: now,
            reason: Some(reason.to_string()),
        });
        step.bids.push(bid);

        self.commit_and_install(step, now).await?;
        self.next_sequence += 1;

        Ok(BidReceipt {
            accepted: false,
            bid_id,
            reason: Some(reason),
            current_price: self.auction.current_price,
            winning: false,
        })
    }

    async fn accept(
        &mut self,
        request: SubmitBid,
        snapshot: &BidderSnapshot,
        admitted: Admitted,
        now: u64,
    ) -> EngineResult<BidReceipt> {
        let bid_id = self.allocate_bid_id(&request).await?;
        let mut bid = Bid {
            id: bid_id,
            auction_id: self.auction.id,
            bidder: request.bidder,
            amount: request.amount,
            max_amount: request.max_amount,
            status: BidStatus::Active,
            kind: request.kind,
            is_suspicious: admitted.suspicious,
            fraud_score: Some(admitted.fraud_score),
            note: None,
            created_at: now,
            sequence: self.next_sequence,
        };

        let mut step = PreparedStep::new(self.auction.clone());
        step.auction.updated_at = now;
        step.transitions.push(BidTransition {
            auction_id: self.auction.id,
            bid_id,
            from: None,
            to: BidStatus::Active,
            at: now,
            reason: None,
        });

        let closes = if bid.kind == BidKind::BuyNow {
            let amount = bid.amount;
            self.settle_instant_win(&mut step, &mut bid, amount, now)?;
            true
        } else if self.auction.kind == AuctionKind::Dutch {
            // Dutch: the clock sets the ask; the first admissible bid
            // takes it at the current descending price.
            let price = self.auction.dutch_price_at(now);
            self.settle_instant_win(&mut step, &mut bid, price, now)?;
            true
        } else {
            self.settle_ascending(&mut step, &mut bid, now)?;
            false
        };

        if !closes {
            if let Some(new_end) = extender::maybe_extend(&self.policy, &step.auction, now) {
                step.auction.end_time = new_end;
                step.auction.extension_count += 1;
                step.events.push((
                    None,
                    EventKind::AuctionExtended {
                        new_end_time: new_end,
                        extension_count: step.auction.extension_count,
                    },
                ));
                info!(
                    "auction {}: extended to {} (extension #{})",
                    self.auction.id, new_end, step.auction.extension_count
                );
            }
        }

        let winning = bid.status == BidStatus::Winning || bid.status == BidStatus::Won;
        step.bids.push(bid);
        if let Err(e) = self.verify_single_winner(&step) {
            self.persist_quarantine(now).await;
            return Err(e);
        }

        self.commit_and_install(step, now).await?;
        self.next_sequence += 1;

        Ok(BidReceipt {
            accepted: true,
            bid_id,
            reason: None,
            current_price: self.auction.current_price,
            winning,
        })
    }

    /// Buy-now and dutch wins bypass proxy resolution: the incoming bid
    /// takes the lead at `price` and the auction closes in its favour.
    fn settle_instant_win(
        &self,
        step: &mut PreparedStep,
        bid: &mut Bid,
        price: u64,
        now: u64,
    ) -> EngineResult<()> {
        self.transition_bid(step, bid, BidStatus::Winning, now, None)?;

        // Buy-now sells at the bid's amount (gate-checked to be at or
        // above the standing price); dutch sells at the descending ask,
        // even when the bid offered more.
        step.auction.current_price = price;
        step.auction.bid_count += 1;
        step.events.push((
            Some(bid.id),
            EventKind::BidAccepted {
                bidder: bid.bidder,
                price: step.auction.current_price,
                winning: true,
            },
        ));

        self.close_into_step(step, Some(bid), now)
    }

    /// Standard/reserve/penny resolution of an incoming bid.
    fn settle_ascending(
        &self,
        step: &mut PreparedStep,
        bid: &mut Bid,
        now: u64,
    ) -> EngineResult<()> {
        let resolution = if self.auction.kind == AuctionKind::Penny {
            // Penny auctions are plain fixed-step races; the gate already
            // enforced the exact raise.
            resolver::Resolution {
                new_price: bid.amount,
                leader: Some(bid.id),
                changes: self
                    .bids
                    .iter()
                    .filter(|b| b.status == BidStatus::Winning)
                    .map(|b| resolver::StatusChange {
                        bid_id: b.id,
                        from: b.status,
                        to: BidStatus::Outbid,
                    })
                    .chain(std::iter::once(resolver::StatusChange {
                        bid_id: bid.id,
                        from: bid.status,
                        to: BidStatus::Winning,
                    }))
                    .collect(),
            }
        } else {
            resolver::resolve(&self.policy, &self.auction, &self.bids, bid)
        };

        step.auction.current_price = resolution.new_price;
        step.auction.bid_count += 1;

        step.events.push((
            Some(bid.id),
            EventKind::BidAccepted {
                bidder: bid.bidder,
                price: resolution.new_price,
                winning: resolution.leader == Some(bid.id),
            },
        ));

        self.apply_changes(step, bid, &resolution.changes, now)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Retraction
    // ------------------------------------------------------------------

    async fn handle_retract(
        &mut self,
        bid_id: BidId,
        bidder: BidderId,
        reason: String,
    ) -> EngineResult<()> {
        self.check_not_halted()?;
        let now = self.time.now_unix();
        self.refresh_lifecycle(now).await?;

        let bid = self
            .bids
            .iter()
            .find(|b| b.id == bid_id)
            .ok_or_else(|| EngineError::NotFound(format!("bid {bid_id}")))?
            .clone();

        if bid.bidder != bidder {
            return Err(EngineError::Validation(
                "only the bid's owner can retract it".into(),
            ));
        }
        if self.auction.status.is_terminal() {
            return Err(EngineError::Validation(
                "bids on a closed auction cannot be retracted".into(),
            ));
        }
        if !matches!(bid.status, BidStatus::Active | BidStatus::Winning) {
            return Err(EngineError::Validation(format!(
                "bid {bid_id} is not retractable in status {:?}",
                bid.status
            )));
        }

        // Retraction is logged with its reason for fraud review, never
        // silently deleted.
        info!(
            "auction {}: bid {} retracted by {}: {}",
            self.auction.id, bid_id, bidder, reason
        );

        let mut step = PreparedStep::new(self.auction.clone());
        step.auction.updated_at = now;

        let mut retracted = bid;
        self.transition_bid(
            &mut step,
            &mut retracted,
            BidStatus::Retracted,
            now,
            Some(reason.as_str()),
        )?;
        retracted.note = Some(reason);

        // Re-resolve the remaining field exactly as if the retracted bid
        // had never existed. The price may drop.
        let remaining: Vec<Bid> = self
            .bids
            .iter()
            .filter(|b| b.id != retracted.id)
            .cloned()
            .collect();
        let resolution = resolver::resolve_after_removal(&self.policy, &self.auction, &remaining);

        step.auction.current_price = resolution.new_price;
        step.bids.push(retracted);
        self.apply_field_changes(&mut step, &remaining, &resolution.changes, now)?;

        if let Err(e) = self.verify_single_winner(&step) {
            self.persist_quarantine(now).await;
            return Err(e);
        }
        self.commit_and_install(step, now).await
    }

    // ------------------------------------------------------------------
    // Lifecycle: clock, closing, moderation
    // ------------------------------------------------------------------

    async fn handle_tick(&mut self, now: u64) -> EngineResult<()> {
        if self.halted {
            return Ok(());
        }
        self.refresh_lifecycle(now).await?;

        // Persist the dutch descent so the read path sees the live ask.
        if self.auction.status == AuctionStatus::Active && self.auction.kind == AuctionKind::Dutch {
            let price = self.auction.dutch_price_at(now);
            if price != self.auction.current_price {
                let mut step = PreparedStep::new(self.auction.clone());
                step.auction.current_price = price;
                step.auction.updated_at = now;
                self.commit_and_install(step, now).await?;
            }
        }
        Ok(())
    }

    async fn handle_touch(&mut self, counter: CounterKind) -> EngineResult<()> {
        let now = self.time.now_unix();
        let mut step = PreparedStep::new(self.auction.clone());
        match counter {
            CounterKind::View => step.auction.view_count += 1,
            CounterKind::Watch => step.auction.watch_count += 1,
        }
        step.auction.updated_at = now;
        self.commit_and_install(step, now).await
    }

    /// Bring the auction's state up to `now`: activate a due Upcoming
    /// auction, close an Active one whose deadline has passed.
    async fn refresh_lifecycle(&mut self, now: u64) -> EngineResult<()> {
        if self.auction.status == AuctionStatus::Upcoming && now >= self.auction.start_time {
            let mut step = PreparedStep::new(self.auction.clone());
            step.auction.status = AuctionStatus::Active;
            step.auction.updated_at = now;
            info!("auction {}: now active", self.auction.id);
            self.commit_and_install(step, now).await?;
        }

        if self.auction.status == AuctionStatus::Active && self.auction.has_ended_at(now) {
            let mut step = PreparedStep::new(self.auction.clone());
            step.auction.updated_at = now;
            self.close_into_step(&mut step, None, now)?;
            self.commit_and_install(step, now).await?;
        }
        Ok(())
    }

    /// Fold the close-out into `step`: decide the winner, retire every
    /// live bid, set the winner fields exactly once, emit `AuctionEnded`.
    ///
    /// `instant_winner` is the buy-now/dutch bid that forced the close;
    /// it is already `Winning` inside the step. Re-entry on an already
    /// ended auction is a no-op.
    fn close_into_step(
        &self,
        step: &mut PreparedStep,
        instant_winner: Option<&mut Bid>,
        now: u64,
    ) -> EngineResult<()> {
        if step.auction.status.is_terminal() {
            return Ok(());
        }
        if !step.auction.status.can_transition(AuctionStatus::Ended) {
            return Err(EngineError::Inconsistency(format!(
                "auction {} cannot end from {:?}",
                step.auction.id, step.auction.status
            )));
        }

        let reserve_met = step.auction.reserve_met();

        match instant_winner {
            Some(bid) => {
                self.transition_bid(step, bid, BidStatus::Won, now, None)?;
                self.retire_live_bids(step, Some(bid.id), now)?;
                if step.auction.winner_id.is_none() {
                    step.auction.winner_id = Some(bid.bidder);
                    step.auction.final_price = Some(step.auction.current_price);
                }
            }
            None => {
                let leader = self.bids.iter().find(|b| b.status == BidStatus::Winning);
                match leader {
                    Some(leader) if reserve_met => {
                        let mut won = leader.clone();
                        self.transition_bid(step, &mut won, BidStatus::Won, now, None)?;
                        let winner_id = won.id;
                        step.bids.push(won);
                        self.retire_live_bids(step, Some(winner_id), now)?;
                        if step.auction.winner_id.is_none() {
                            step.auction.winner_id = Some(leader.bidder);
                            step.auction.final_price = Some(step.auction.current_price);
                        }
                    }
                    Some(leader) => {
                        // Reserve not met: the auction ends unsold and
                        // the leader loses with everyone else.
                        info!(
                            "auction {}: reserve not met (price {} < {:?}), closing unsold",
                            step.auction.id, step.auction.current_price, step.auction.reserve_price
                        );
                        let mut lost = leader.clone();
                        self.transition_bid(
                            step,
                            &mut lost,
                            BidStatus::Lost,
                            now,
                            Some("reserve not met"),
                        )?;
                        step.bids.push(lost);
                        self.retire_live_bids(step, None, now)?;
                    }
                    None => {
                        self.retire_live_bids(step, None, now)?;
                    }
                }
            }
        }

        step.auction.status = AuctionStatus::Ended;
        step.events.push((
            None,
            EventKind::AuctionEnded {
                winner: step.auction.winner_id,
                final_price: step.auction.final_price,
            },
        ));
        info!(
            "auction {}: ended (winner: {:?}, final price: {:?})",
            step.auction.id, step.auction.winner_id, step.auction.final_price
        );
        Ok(())
    }

    /// Move every still-live bid (except `keep`) to Lost.
    fn retire_live_bids(
        &self,
        step: &mut PreparedStep,
        keep: Option<BidId>,
        now: u64,
    ) -> EngineResult<()> {
        for bid in &self.bids {
            if Some(bid.id) == keep || !bid.is_live() {
                continue;
            }
            if step.bids.iter().any(|b| b.id == bid.id) {
                continue;
            }
            let mut lost = bid.clone();
            self.transition_bid(step, &mut lost, BidStatus::Lost, now, None)?;
            step.bids.push(lost);
        }
        Ok(())
    }

    async fn handle_moderate(&mut self, action: ModerationAction) -> EngineResult<()> {
        let now = self.time.now_unix();
        let mut step = PreparedStep::new(self.auction.clone());
        step.auction.updated_at = now;

        match action {
            ModerationAction::Suspend => {
                if !self.auction.status.can_transition(AuctionStatus::Suspended) {
                    return Err(EngineError::Validation(format!(
                        "cannot suspend auction in status {:?}",
                        self.auction.status
                    )));
                }
                step.auction.status = AuctionStatus::Suspended;
                warn!("auction {}: suspended by moderation", self.auction.id);
            }
            ModerationAction::Resume => {
                if self.auction.status != AuctionStatus::Suspended {
                    return Err(EngineError::Validation(format!(
                        "cannot resume auction in status {:?}",
                        self.auction.status
                    )));
                }
                step.auction.status = AuctionStatus::Active;
                // Moderation clearance also lifts a quarantine.
                self.halted = false;
                info!("auction {}: resumed by moderation", self.auction.id);
            }
            ModerationAction::Cancel => {
                if !self.auction.status.can_transition(AuctionStatus::Cancelled) {
                    return Err(EngineError::Validation(format!(
                        "cannot cancel auction in status {:?}",
                        self.auction.status
                    )));
                }
                step.auction.status = AuctionStatus::Cancelled;
                self.retire_live_bids(&mut step, None, now)?;
                step.events.push((None, EventKind::AuctionCancelled));
                info!("auction {}: cancelled", self.auction.id);
            }
        }

        self.commit_and_install(step, now).await
    }

    // ------------------------------------------------------------------
    // Shared plumbing
    // ------------------------------------------------------------------

    /// Apply resolver changes when the incoming bid is part of the field.
    fn apply_changes(
        &self,
        step: &mut PreparedStep,
        incoming: &mut Bid,
        changes: &[resolver::StatusChange],
        now: u64,
    ) -> EngineResult<()> {
        for change in changes {
            if change.bid_id == incoming.id {
                self.transition_bid(step, incoming, change.to, now, None)?;
            } else {
                let existing = self
                    .bids
                    .iter()
                    .find(|b| b.id == change.bid_id)
                    .ok_or_else(|| {
                        EngineError::Inconsistency(format!(
                            "resolution referenced unknown bid {}",
                            change.bid_id
                        ))
                    })?;
                let mut updated = existing.clone();
                self.transition_bid(step, &mut updated, change.to, now, None)?;
                if change.to == BidStatus::Outbid {
                    step.events.push((
                        Some(updated.id),
                        EventKind::BidOutbid {
                            bidder: updated.bidder,
                            price: step.auction.current_price,
                        },
                    ));
                }
                step.bids.push(updated);
            }
        }
        // The incoming bid can itself be immediately outbid by a proxy.
        if incoming.status == BidStatus::Outbid {
            step.events.push((
                Some(incoming.id),
                EventKind::BidOutbid {
                    bidder: incoming.bidder,
                    price: step.auction.current_price,
                },
            ));
        }
        Ok(())
    }

    /// Apply resolver changes over a field that excludes the incoming bid
    /// (the retraction path). Re-promotions are logged, not published;
    /// the event contract has no kind for regaining the lead.
    fn apply_field_changes(
        &self,
        step: &mut PreparedStep,
        field: &[Bid],
        changes: &[resolver::StatusChange],
        now: u64,
    ) -> EngineResult<()> {
        for change in changes {
            let existing = field
                .iter()
                .find(|b| b.id == change.bid_id)
                .ok_or_else(|| {
                    EngineError::Inconsistency(format!(
                        "resolution referenced unknown bid {}",
                        change.bid_id
                    ))
                })?;
            let mut updated = existing.clone();
            self.transition_bid(step, &mut updated, change.to, now, None)?;
            if change.to == BidStatus::Winning {
                info!(
                    "auction {}: bid {} re-promoted to the lead",
                    self.auction.id, updated.id
                );
            }
            step.bids.push(updated);
        }
        Ok(())
    }

    /// Validated, logged status transition of one working-copy bid.
    fn transition_bid(
        &self,
        step: &mut PreparedStep,
        bid: &mut Bid,
        to: BidStatus,
        now: u64,
        reason: Option<&str>,
    ) -> EngineResult<()> {
        if !bid.status.can_transition(to) {
            return Err(EngineError::Inconsistency(format!(
                "bid {}: illegal transition {:?} -> {:?}",
                bid.id, bid.status, to
            )));
        }
        step.transitions.push(BidTransition {
            auction_id: self.auction.id,
            bid_id: bid.id,
            from: Some(bid.status),
            to,
            at: now,
            reason: reason.map(str::to_owned),
        });
        bid.status = to;
        Ok(())
    }

    /// Exactly one bid may lead. Called on the prepared working set
    /// before commit; a violation quarantines the auction.
    fn verify_single_winner(&mut self, step: &PreparedStep) -> EngineResult<()> {
        let mut winners = 0usize;
        for bid in &self.bids {
            let current = step
                .bids
                .iter()
                .find(|b| b.id == bid.id)
                .map_or(bid.status, |b| b.status);
            if current == BidStatus::Winning {
                winners += 1;
            }
        }
        for bid in &step.bids {
            if bid.status == BidStatus::Winning && !self.bids.iter().any(|b| b.id == bid.id) {
                winners += 1;
            }
        }

        if winners > 1 {
            let why = format!(
                "auction {}: {} winning bids after resolution",
                self.auction.id, winners
            );
            error!("{}; suspending for moderation", why);
            self.halted = true;
            Err(EngineError::Inconsistency(why))
        } else {
            Ok(())
        }
    }

    /// Persist the automatic suspension after an invariant violation.
    /// The bad step itself is never committed; only the status flip is.
    async fn persist_quarantine(&mut self, now: u64) {
        if !self.auction.status.can_transition(AuctionStatus::Suspended) {
            return;
        }
        let mut auction = self.auction.clone();
        auction.status = AuctionStatus::Suspended;
        auction.updated_at = now;
        let commit = CommitStep {
            auction: auction.clone(),
            bids: Vec::new(),
            transitions: Vec::new(),
        };
        match self.store.commit(commit).await {
            Ok(()) => self.auction = auction,
            Err(e) => error!(
                "auction {}: failed to persist quarantine suspension: {}",
                self.auction.id, e
            ),
        }
    }

    fn check_not_halted(&self) -> EngineResult<()> {
        if self.halted {
            Err(EngineError::Inconsistency(format!(
                "auction {} is quarantined pending moderation",
                self.auction.id
            )))
        } else {
            Ok(())
        }
    }

    /// Commit the step with bounded retries, then install it into the
    /// working set and publish its events. Retry exhaustion surfaces as
    /// `Timeout`: the caller may resubmit, and replay is idempotent.
    async fn commit_and_install(&mut self, step: PreparedStep, now: u64) -> EngineResult<()> {
        let commit = CommitStep {
            auction: step.auction.clone(),
            bids: step.bids.clone(),
            transitions: step.transitions.clone(),
        };

        with_backoff(
            "store commit",
            self.policy.store_max_retries,
            self.policy.store_retry_initial_delay_ms,
            || {
                let store = self.store.clone();
                let commit = commit.clone();
                async move { store.commit(commit).await }
            },
        )
        .await
        .map_err(|_| EngineError::Timeout)?;

        self.auction = step.auction;
        for bid in step.bids {
            match self.bids.iter_mut().find(|b| b.id == bid.id) {
                Some(slot) => *slot = bid,
                None => self.bids.push(bid),
            }
        }

        for (bid_id, kind) in step.events {
            self.publisher.publish(bid_id, now, kind).await;
        }
        Ok(())
    }

    async fn lookup_snapshot(&self, bidder: BidderId) -> EngineResult<BidderSnapshot> {
        with_backoff(
            "bidder snapshot",
            self.policy.store_max_retries,
            self.policy.store_retry_initial_delay_ms,
            || {
                let directory = self.directory.clone();
                async move { directory.snapshot(bidder).await }
            },
        )
        .await
        .map_err(|_| EngineError::Timeout)
    }

    async fn allocate_bid_id(&self, request: &SubmitBid) -> EngineResult<BidId> {
        if let Some(id) = request.bid_id {
            return Ok(id);
        }
        with_backoff(
            "bid id allocation",
            self.policy.store_max_retries,
            self.policy.store_retry_initial_delay_ms,
            || {
                let store = self.store.clone();
                async move { store.next_bid_id().await }
            },
        )
        .await
        .map_err(|_| EngineError::Timeout)
    }

    fn receipt_for(&self, bid: &Bid) -> BidReceipt {
        BidReceipt {
            accepted: bid.status != BidStatus::Rejected,
            bid_id: bid.id,
            // The original reject reason lives in the audit log.
            reason: None,
            current_price: self.auction.current_price,
            winning: matches!(bid.status, BidStatus::Winning | BidStatus::Won),
        }
    }
}
