//! Auction bidding engine.
//!
//! Concurrent bid admission, proxy (automatic) bid resolution with
//! second-price semantics, a per-auction lifecycle state machine,
//! anti-sniping close-time extension, credit/fraud gating, and ordered
//! event emission. Authentication, payments, search, and transport are
//! external collaborators behind the seams in [`traits`].

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod extender;
pub mod gate;
pub mod model;
pub mod resolver;
pub mod supervisor;
pub mod traits;
pub mod util;

#[cfg(any(test, feature = "test-support"))]
pub mod mocks;

pub use config::{Extensions, Policy};
pub use engine::BiddingEngine;
pub use error::{EngineError, EngineResult};
pub use events::{EngineEvent, EventKind, EventPublisher};
pub use gate::RejectReason;
pub use model::{
    AccountStatus, Auction, AuctionId, AuctionKind, AuctionStatus, Bid, BidId, BidKind, BidStatus,
    BidTransition, BidderId, BidderSnapshot, DutchSchedule,
};
pub use supervisor::{BidReceipt, ModerationAction, SubmitBid};
pub use traits::{BidderDirectory, CommitStep, EventSink, RecordStore, SystemClock, TimeProvider};
