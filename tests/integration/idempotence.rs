//! Crash-recovery semantics: commit retries, replay by bid id, and
//! invariant-violation quarantine.

use crate::common::harness::{EngineHarness, ALICE, BOB};
use smartbid_engine::{
    Auction, AuctionStatus, Bid, BidId, BidKind, BidStatus, CommitStep, EngineError, RecordStore,
    SubmitBid,
};

#[tokio::test]
async fn test_replaying_a_bid_id_changes_nothing() {
    let h = EngineHarness::new().await;
    let auction = h.standard_auction().await;

    let first = h.manual(auction, ALICE, 5_000).await.unwrap();
    let events_before = h.sink.events().await.len();
    let commits_before = h.store.commit_count().await;

    // Same submission again, carrying the bid id from the receipt: the
    // recorded outcome comes back without any new state change or event.
    let replay = h
        .engine
        .submit_bid(SubmitBid {
            auction_id: auction,
            bidder: ALICE,
            amount: 5_000,
            max_amount: None,
            kind: BidKind::Manual,
            bid_id: Some(first.bid_id),
        })
        .await
        .unwrap();

    assert_eq!(replay.bid_id, first.bid_id);
    assert!(replay.accepted);
    assert!(replay.winning);
    assert_eq!(h.sink.events().await.len(), events_before);
    assert_eq!(h.store.commit_count().await, commits_before);
    assert_eq!(h.engine.get_auction(auction).await.unwrap().bid_count, 1);
    assert_eq!(h.engine.get_bids(auction).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_transient_commit_failures_are_retried() {
    let h = EngineHarness::new().await;
    let auction = h.standard_auction().await;

    h.store.fail_next_commits(2).await;
    let receipt = h.manual(auction, ALICE, 5_000).await.unwrap();
    assert!(receipt.accepted);

    // Exactly one bid landed despite the retries.
    assert_eq!(h.engine.get_bids(auction).await.unwrap().len(), 1);
    assert_eq!(h.engine.get_auction(auction).await.unwrap().bid_count, 1);
}

#[tokio::test]
async fn test_commit_exhaustion_surfaces_timeout_and_applies_nothing() {
    let h = EngineHarness::new().await;
    let auction = h.standard_auction().await;
    // Ensure the actor exists before the store goes down.
    h.engine.track_auction(auction).await.unwrap();

    h.store.fail_next_commits(1_000).await;
    let outcome = h.manual(auction, ALICE, 5_000).await;
    assert!(matches!(outcome, Err(EngineError::Timeout)));

    // The step never became observable.
    h.store.fail_next_commits(0).await;
    assert!(h.sink.events().await.is_empty());

    // A fresh submission after the store recovers goes through.
    let receipt = h.manual(auction, BOB, 5_000).await.unwrap();
    assert!(receipt.accepted);
}

#[tokio::test]
async fn test_double_winner_state_is_quarantined() {
    let h = EngineHarness::new().await;
    let auction_id = h.standard_auction().await;

    // Corrupt the durable state behind the engine's back: two bids both
    // marked Winning.
    let auction: Auction = h.store.load_auction(auction_id).await.unwrap().unwrap();
    let corrupt = |id: u64, bidder, seq| Bid {
        id: BidId(id),
        auction_id,
        bidder,
        amount: 6_000 + seq * 500,
        max_amount: None,
        status: BidStatus::Winning,
        kind: BidKind::Manual,
        is_suspicious: false,
        fraud_score: None,
        note: None,
        created_at: 1_000 + seq,
        sequence: seq,
    };
    h.store
        .commit(CommitStep {
            auction: auction.clone(),
            bids: vec![corrupt(901, ALICE, 0), corrupt(902, BOB, 1)],
            transitions: Vec::new(),
        })
        .await
        .unwrap();

    // The next admission detects the violation, suspends the auction,
    // and refuses the bid; nothing is auto-corrected.
    let outcome = h.manual(auction_id, ALICE, 10_000).await;
    assert!(matches!(outcome, Err(EngineError::Inconsistency(_))));
    assert_eq!(
        h.engine.get_auction(auction_id).await.unwrap().status,
        AuctionStatus::Suspended
    );

    // The quarantine holds for subsequent traffic on this auction only.
    let outcome = h.manual(auction_id, BOB, 11_000).await;
    assert!(matches!(outcome, Err(EngineError::Inconsistency(_))));

    let other = h.standard_auction().await;
    let receipt = h.manual(other, ALICE, 5_000).await.unwrap();
    assert!(receipt.accepted);

    let statuses: Vec<BidStatus> = h
        .engine
        .get_bids(auction_id)
        .await
        .unwrap()
        .iter()
        .map(|b| b.status)
        .collect();
    assert_eq!(statuses, vec![BidStatus::Winning, BidStatus::Winning]);
}

#[tokio::test]
async fn test_transition_log_records_admission_chain() {
    let h = EngineHarness::new().await;
    let auction = h.standard_auction().await;

    let alice = h.manual(auction, ALICE, 5_000).await.unwrap();
    let bob = h.manual(auction, BOB, 5_500).await.unwrap();
    h.close_now(auction).await;

    let log = h.store.transition_log(auction).await;

    // Alice: admitted -> Winning -> Outbid -> Lost.
    let alice_chain: Vec<BidStatus> = log
        .iter()
        .filter(|t| t.bid_id == alice.bid_id)
        .map(|t| t.to)
        .collect();
    assert_eq!(
        alice_chain,
        vec![
            BidStatus::Active,
            BidStatus::Winning,
            BidStatus::Outbid,
            BidStatus::Lost
        ]
    );

    // Bob: admitted -> Winning -> Won.
    let bob_chain: Vec<BidStatus> = log
        .iter()
        .filter(|t| t.bid_id == bob.bid_id)
        .map(|t| t.to)
        .collect();
    assert_eq!(
        bob_chain,
        vec![BidStatus::Active, BidStatus::Winning, BidStatus::Won]
    );

    // The first entry of each chain is the creating one.
    assert!(log
        .iter()
        .filter(|t| t.from.is_none())
        .all(|t| t.to == BidStatus::Active || t.to == BidStatus::Rejected));
}

#[tokio::test]
async fn test_seller_snapshot_not_required_for_moderation() {
    // Moderation paths must not depend on the bidder directory at all.
    let h = EngineHarness::new().await;
    let auction = h.standard_auction().await;

    h.directory.fail_next(1_000).await;
    h.engine.suspend_auction(auction).await.unwrap();
    h.engine.resume_auction(auction).await.unwrap();
    h.engine.cancel_auction(auction).await.unwrap();
}
