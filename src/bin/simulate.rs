//! Headless engine simulation.
//!
//! Runs a scripted auction against the in-memory collaborators and
//! prints the event stream. Useful for eyeballing engine behaviour
//! without a database or fan-out layer.
//!
//! Usage:
//!   cargo run --bin simulate --features test-support

use std::sync::Arc;

use smartbid_engine::mocks::{CapturingSink, MemoryStore, MockClock, MockDirectory};
use smartbid_engine::{
    Auction, AuctionId, BidKind, BidderId, BiddingEngine, Policy, SubmitBid,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let clock = MockClock::new(1_000);
    let store = MemoryStore::new();
    let directory = MockDirectory::new();
    let sink = CapturingSink::new();

    let seller = BidderId(1);
    let alice = BidderId(2);
    let bob = BidderId(3);
    let carol = BidderId(4);
    directory.insert_good_standing(&[alice, bob, carol]).await;

    let auction = Auction::builder(clock.clone())
        .id(AuctionId(1))
        .seller(seller)
        .title("Vintage film camera")
        .starting_price(5_000)
        .duration(3_600)
        .build()
        .map_err(|e| anyhow::anyhow!(e))?;
    store.seed_auction(auction).await;

    let engine = Arc::new(BiddingEngine::new(
        Policy::default(),
        store,
        directory,
        sink.clone(),
        clock.clone(),
    ));
    engine.track_auction(AuctionId(1)).await?;

    info!("--- proxy bid from alice, ceiling $100 ---");
    let receipt = engine
        .submit_bid(SubmitBid {
            auction_id: AuctionId(1),
            bidder: alice,
            amount: 5_000,
            max_amount: Some(10_000),
            kind: BidKind::Automatic,
            bid_id: None,
        })
        .await?;
    info!("alice: {:?}", receipt);

    info!("--- proxy bid from bob, ceiling $120 ---");
    let receipt = engine
        .submit_bid(SubmitBid {
            auction_id: AuctionId(1),
            bidder: bob,
            amount: 5_500,
            max_amount: Some(12_000),
            kind: BidKind::Automatic,
            bid_id: None,
        })
        .await?;
    info!("bob: {:?}", receipt);

    info!("--- manual bid from carol at $110 ---");
    let receipt = engine
        .submit_bid(SubmitBid {
            auction_id: AuctionId(1),
            bidder: carol,
            amount: 11_000,
            max_amount: None,
            kind: BidKind::Manual,
            bid_id: None,
        })
        .await?;
    info!("carol: {:?}", receipt);

    // Jump to two minutes before close: the next bid extends the clock.
    clock.set(4_480);
    info!("--- late manual bid from carol at $125 ---");
    let receipt = engine
        .submit_bid(SubmitBid {
            auction_id: AuctionId(1),
            bidder: carol,
            amount: 12_500,
            max_amount: None,
            kind: BidKind::Manual,
            bid_id: None,
        })
        .await?;
    info!("carol: {:?}", receipt);

    // Past the extended deadline: the tick closes the auction.
    let end = engine.get_auction(AuctionId(1)).await?.end_time;
    clock.set(end + 1);
    engine.tick_auction(AuctionId(1)).await?;

    let auction = engine.get_auction(AuctionId(1)).await?;
    info!(
        "final: status {:?}, winner {:?}, price {:?}",
        auction.status, auction.winner_id, auction.final_price
    );

    println!("event stream:");
    for event in sink.events().await {
        println!(
            "  #{} {:?} bid={:?} {:?}",
            event.sequence, event.auction_id, event.bid_id, event.kind
        );
    }

    engine.shutdown().await;
    Ok(())
}
