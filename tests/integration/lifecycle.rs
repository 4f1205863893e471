//! Lifecycle state machine: activation, closing, moderation, dutch and
//! penny behaviour.

use crate::common::harness::{EngineHarness, ALICE, BOB, CAROL};
use smartbid_engine::{
    AuctionKind, AuctionStatus, BidStatus, DutchSchedule, EventKind, RejectReason,
};

#[tokio::test]
async fn test_natural_close_promotes_leader_to_won() {
    let h = EngineHarness::new().await;
    let auction = h.standard_auction().await;

    let alice = h.proxy(auction, ALICE, 5_000, 10_000).await.unwrap();
    let bob = h.manual(auction, BOB, 6_000).await.unwrap();

    h.close_now(auction).await;

    let record = h.engine.get_auction(auction).await.unwrap();
    assert_eq!(record.status, AuctionStatus::Ended);
    assert_eq!(record.winner_id, Some(ALICE));
    assert_eq!(record.final_price, Some(record.current_price));

    assert_eq!(h.bid_status(auction, alice.bid_id).await, BidStatus::Won);
    assert_eq!(h.bid_status(auction, bob.bid_id).await, BidStatus::Lost);

    let events = h.sink.events_for(auction).await;
    match &events.last().unwrap().kind {
        EventKind::AuctionEnded {
            winner,
            final_price,
        } => {
            assert_eq!(*winner, Some(ALICE));
            assert_eq!(*final_price, record.final_price);
        }
        other => panic!("expected AuctionEnded, got {other:?}"),
    }
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let h = EngineHarness::new().await;
    let auction = h.standard_auction().await;
    h.manual(auction, ALICE, 5_000).await.unwrap();

    h.close_now(auction).await;
    let ended_events = h.sink.events_for(auction).await.len();
    let first = h.engine.get_auction(auction).await.unwrap();

    // Further ticks after ENDED change nothing and emit nothing.
    h.engine.tick_auction(auction).await.unwrap();
    h.engine.tick_auction(auction).await.unwrap();

    let second = h.engine.get_auction(auction).await.unwrap();
    assert_eq!(second.status, AuctionStatus::Ended);
    assert_eq!(second.winner_id, first.winner_id);
    assert_eq!(second.final_price, first.final_price);
    assert_eq!(h.sink.events_for(auction).await.len(), ended_events);
}

// Reserve $500 with bidding ending at $400: ENDED with no winner.
#[tokio::test]
async fn test_reserve_not_met_closes_unsold() {
    let h = EngineHarness::new().await;
    let auction = h
        .seed_auction(|b| b.kind(AuctionKind::Reserve).reserve_price(50_000))
        .await;

    let alice = h.manual(auction, ALICE, 40_000).await.unwrap();
    assert!(alice.winning);

    h.close_now(auction).await;

    let record = h.engine.get_auction(auction).await.unwrap();
    assert_eq!(record.status, AuctionStatus::Ended);
    assert_eq!(record.winner_id, None);
    assert_eq!(record.final_price, None);
    assert_eq!(h.bid_status(auction, alice.bid_id).await, BidStatus::Lost);
}

#[tokio::test]
async fn test_reserve_met_sells_normally() {
    let h = EngineHarness::new().await;
    let auction = h
        .seed_auction(|b| b.kind(AuctionKind::Reserve).reserve_price(50_000))
        .await;

    let alice = h.manual(auction, ALICE, 50_000).await.unwrap();
    h.close_now(auction).await;

    let record = h.engine.get_auction(auction).await.unwrap();
    assert_eq!(record.winner_id, Some(ALICE));
    assert_eq!(record.final_price, Some(50_000));
    assert_eq!(h.bid_status(auction, alice.bid_id).await, BidStatus::Won);
}

// A buy-now bid at exactly the buy-now price ends the auction at once,
// regardless of live proxies.
#[tokio::test]
async fn test_buy_now_ends_immediately() {
    let h = EngineHarness::new().await;
    let auction = h
        .seed_auction(|b| b.kind(AuctionKind::BuyNow).buy_now_price(20_000))
        .await;

    let alice = h.proxy(auction, ALICE, 5_000, 15_000).await.unwrap();
    assert!(alice.winning);

    let bob = h.buy_now(auction, BOB, 20_000).await.unwrap();
    assert!(bob.accepted);
    assert!(bob.winning);

    let record = h.engine.get_auction(auction).await.unwrap();
    assert_eq!(record.status, AuctionStatus::Ended);
    assert_eq!(record.winner_id, Some(BOB));
    assert_eq!(record.final_price, Some(20_000));
    assert_eq!(h.bid_status(auction, bob.bid_id).await, BidStatus::Won);
    assert_eq!(h.bid_status(auction, alice.bid_id).await, BidStatus::Lost);

    // Bids after the buy-now close are turned away.
    let late = h.manual(auction, CAROL, 21_000).await.unwrap();
    assert_eq!(late.reason, Some(RejectReason::AuctionNotOpen));
}

#[tokio::test]
async fn test_buy_now_below_price_rejected() {
    let h = EngineHarness::new().await;
    let auction = h
        .seed_auction(|b| b.kind(AuctionKind::BuyNow).buy_now_price(20_000))
        .await;

    let receipt = h.buy_now(auction, ALICE, 19_999).await.unwrap();
    assert_eq!(receipt.reason, Some(RejectReason::BidTooLow));
}

#[tokio::test]
async fn test_dutch_descends_on_clock_and_first_bid_wins() {
    let h = EngineHarness::new().await;
    let auction = h
        .seed_auction(|b| {
            b.kind(AuctionKind::Dutch)
                .starting_price(10_000)
                .duration(7_200)
                .dutch(DutchSchedule {
                    decrement: 1_000,
                    interval_secs: 600,
                    floor_price: 4_000,
                })
        })
        .await;

    // Below the current ask: rejected.
    let receipt = h.manual(auction, ALICE, 9_000).await.unwrap();
    assert_eq!(receipt.reason, Some(RejectReason::BidTooLow));

    // Two intervals later the ask has dropped to 8_000; the tick
    // persists the descent for the read path.
    h.clock.set(2_300);
    h.engine.tick_auction(auction).await.unwrap();
    assert_eq!(
        h.engine.get_auction(auction).await.unwrap().current_price,
        8_000
    );

    // First admissible bid wins instantly at the clock price, even when
    // it offered more.
    let receipt = h.manual(auction, ALICE, 9_000).await.unwrap();
    assert!(receipt.winning);
    assert_eq!(receipt.current_price, 8_000);

    let record = h.engine.get_auction(auction).await.unwrap();
    assert_eq!(record.status, AuctionStatus::Ended);
    assert_eq!(record.winner_id, Some(ALICE));
    assert_eq!(record.final_price, Some(8_000));
}

#[tokio::test]
async fn test_penny_fixed_increment_race() {
    let h = EngineHarness::new().await;
    let auction = h.seed_auction(|b| b.kind(AuctionKind::Penny)).await;

    // Exactly one penny above the current price, nothing else.
    let wrong = h.manual(auction, ALICE, 5_010).await.unwrap();
    assert_eq!(wrong.reason, Some(RejectReason::BidTooLow));

    let alice = h.manual(auction, ALICE, 5_001).await.unwrap();
    assert!(alice.winning);
    assert_eq!(alice.current_price, 5_001);

    let bob = h.manual(auction, BOB, 5_002).await.unwrap();
    assert!(bob.winning);
    assert_eq!(bob.current_price, 5_002);
    assert_eq!(h.bid_status(auction, alice.bid_id).await, BidStatus::Outbid);

    // Proxy bids have no place in a penny race.
    let proxy = h.proxy(auction, CAROL, 5_003, 6_000).await.unwrap();
    assert_eq!(proxy.reason, Some(RejectReason::BidTooLow));
}

#[tokio::test]
async fn test_upcoming_auction_activates_at_start_time() {
    let h = EngineHarness::new().await;
    let auction = h.seed_auction(|b| b.start_time(2_000)).await;

    let early = h.manual(auction, ALICE, 5_000).await.unwrap();
    assert_eq!(early.reason, Some(RejectReason::AuctionNotOpen));
    assert_eq!(
        h.engine.get_auction(auction).await.unwrap().status,
        AuctionStatus::Upcoming
    );

    h.clock.set(2_000);
    h.engine.tick_auction(auction).await.unwrap();
    assert_eq!(
        h.engine.get_auction(auction).await.unwrap().status,
        AuctionStatus::Active
    );

    let receipt = h.manual(auction, ALICE, 5_000).await.unwrap();
    assert!(receipt.accepted);
}

#[tokio::test]
async fn test_bid_after_deadline_closes_then_rejects() {
    let h = EngineHarness::new().await;
    let auction = h.standard_auction().await;
    h.manual(auction, ALICE, 5_000).await.unwrap();

    // No tick has run; the submission itself discovers the deadline.
    h.clock.set(10_000);
    let receipt = h.manual(auction, BOB, 6_000).await.unwrap();
    assert_eq!(receipt.reason, Some(RejectReason::AuctionNotOpen));

    let record = h.engine.get_auction(auction).await.unwrap();
    assert_eq!(record.status, AuctionStatus::Ended);
    assert_eq!(record.winner_id, Some(ALICE));
}

#[tokio::test]
async fn test_suspension_blocks_and_resume_restores() {
    let h = EngineHarness::new().await;
    let auction = h.standard_auction().await;

    h.engine.suspend_auction(auction).await.unwrap();
    assert_eq!(
        h.engine.get_auction(auction).await.unwrap().status,
        AuctionStatus::Suspended
    );

    let receipt = h.manual(auction, ALICE, 5_000).await.unwrap();
    assert_eq!(receipt.reason, Some(RejectReason::AuctionNotOpen));

    h.engine.resume_auction(auction).await.unwrap();
    let receipt = h.manual(auction, ALICE, 5_000).await.unwrap();
    assert!(receipt.accepted);
}

#[tokio::test]
async fn test_cancellation_marks_bids_lost_and_publishes() {
    let h = EngineHarness::new().await;
    let auction = h.standard_auction().await;

    let alice = h.manual(auction, ALICE, 5_000).await.unwrap();
    h.engine.cancel_auction(auction).await.unwrap();

    let record = h.engine.get_auction(auction).await.unwrap();
    assert_eq!(record.status, AuctionStatus::Cancelled);
    assert_eq!(record.winner_id, None);
    assert_eq!(h.bid_status(auction, alice.bid_id).await, BidStatus::Lost);

    let events = h.sink.events_for(auction).await;
    assert_eq!(events.last().unwrap().kind, EventKind::AuctionCancelled);

    // Cancelled is terminal: no resume, no more bids.
    assert!(h.engine.resume_auction(auction).await.is_err());
    let late = h.manual(auction, BOB, 6_000).await.unwrap();
    assert_eq!(late.reason, Some(RejectReason::AuctionNotOpen));
}

#[tokio::test]
async fn test_view_and_watch_counters_are_monotone() {
    let h = EngineHarness::new().await;
    let auction = h.standard_auction().await;

    h.engine.record_view(auction).await.unwrap();
    h.engine.record_view(auction).await.unwrap();
    h.engine.record_watch(auction).await.unwrap();
    // Counter bumps are fire-and-forget; a tick flushes the queue.
    h.engine.tick_auction(auction).await.unwrap();

    let record = h.engine.get_auction(auction).await.unwrap();
    assert_eq!(record.view_count, 2);
    assert_eq!(record.watch_count, 1);
}
