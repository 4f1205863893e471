//! Bid retraction and re-resolution of the remaining field.

use crate::common::harness::{EngineHarness, ALICE, BOB, CAROL};
use smartbid_engine::{BidStatus, EngineError};

// Retracting the leader re-promotes the previous leader under the same
// second-price rule, as if the retracted bid never existed.
#[tokio::test]
async fn test_retracting_leader_re_promotes_previous() {
    let h = EngineHarness::new().await;
    let auction = h.standard_auction().await;

    let alice = h.proxy(auction, ALICE, 5_000, 10_000).await.unwrap();
    let bob = h.proxy(auction, BOB, 5_500, 12_000).await.unwrap();
    assert_eq!(bob.current_price, 10_500);

    h.engine
        .retract_bid(auction, bob.bid_id, BOB, "entered wrong ceiling")
        .await
        .unwrap();

    // Without bob, alice's proxy is unopposed: back in the lead at the
    // starting price.
    assert_eq!(h.bid_status(auction, bob.bid_id).await, BidStatus::Retracted);
    assert_eq!(h.bid_status(auction, alice.bid_id).await, BidStatus::Winning);
    assert_eq!(
        h.engine.get_auction(auction).await.unwrap().current_price,
        5_000
    );
}

#[tokio::test]
async fn test_retraction_re_settles_remaining_field() {
    let h = EngineHarness::new().await;
    let auction = h.standard_auction().await;

    let alice = h.proxy(auction, ALICE, 5_000, 10_000).await.unwrap();
    let bob = h.proxy(auction, BOB, 5_500, 12_000).await.unwrap();
    let carol = h.manual(auction, CAROL, 11_000).await.unwrap();
    assert_eq!(carol.current_price, 11_500);

    h.engine
        .retract_bid(auction, bob.bid_id, BOB, "buyer remorse")
        .await
        .unwrap();

    // Remaining ceilings 10_000 (proxy) and 11_000 (manual): the manual
    // bid wins at its stated amount.
    assert_eq!(h.bid_status(auction, carol.bid_id).await, BidStatus::Winning);
    assert_eq!(h.bid_status(auction, alice.bid_id).await, BidStatus::Outbid);
    assert_eq!(
        h.engine.get_auction(auction).await.unwrap().current_price,
        11_000
    );
}

#[tokio::test]
async fn test_only_owner_can_retract() {
    let h = EngineHarness::new().await;
    let auction = h.standard_auction().await;
    let alice = h.manual(auction, ALICE, 5_000).await.unwrap();

    let outcome = h
        .engine
        .retract_bid(auction, alice.bid_id, BOB, "not mine")
        .await;
    assert!(matches!(outcome, Err(EngineError::Validation(_))));
    assert_eq!(h.bid_status(auction, alice.bid_id).await, BidStatus::Winning);
}

#[tokio::test]
async fn test_outbid_bids_cannot_be_retracted() {
    let h = EngineHarness::new().await;
    let auction = h.standard_auction().await;

    let alice = h.manual(auction, ALICE, 5_000).await.unwrap();
    h.manual(auction, BOB, 5_500).await.unwrap();
    assert_eq!(h.bid_status(auction, alice.bid_id).await, BidStatus::Outbid);

    let outcome = h
        .engine
        .retract_bid(auction, alice.bid_id, ALICE, "changed my mind")
        .await;
    assert!(matches!(outcome, Err(EngineError::Validation(_))));
}

#[tokio::test]
async fn test_no_retraction_after_close() {
    let h = EngineHarness::new().await;
    let auction = h.standard_auction().await;
    let alice = h.manual(auction, ALICE, 5_000).await.unwrap();

    h.close_now(auction).await;

    let outcome = h
        .engine
        .retract_bid(auction, alice.bid_id, ALICE, "too late")
        .await;
    assert!(matches!(outcome, Err(EngineError::Validation(_))));
    assert_eq!(h.bid_status(auction, alice.bid_id).await, BidStatus::Won);
}

#[tokio::test]
async fn test_retraction_is_logged_with_reason() {
    let h = EngineHarness::new().await;
    let auction = h.standard_auction().await;
    let alice = h.manual(auction, ALICE, 5_000).await.unwrap();

    h.engine
        .retract_bid(auction, alice.bid_id, ALICE, "listed in error")
        .await
        .unwrap();

    // The audit log keeps the retraction and its reason; nothing is
    // silently deleted.
    let log = h.store.transition_log(auction).await;
    let entry = log
        .iter()
        .find(|t| t.bid_id == alice.bid_id && t.to == BidStatus::Retracted)
        .expect("retraction logged");
    assert_eq!(entry.reason.as_deref(), Some("listed in error"));
    assert_eq!(entry.from, Some(BidStatus::Winning));

    let bids = h.engine.get_bids(auction).await.unwrap();
    assert_eq!(bids.len(), 1);
}
