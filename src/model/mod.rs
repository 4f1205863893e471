//! Domain records: auctions, bids, bidder snapshots, and the audit log.

pub mod auction;
pub mod bid;
pub mod bidder;
mod ids;

pub use auction::{Auction, AuctionBuilder, AuctionKind, AuctionStatus, DutchSchedule};
pub use bid::{Bid, BidKind, BidStatus, BidTransition};
pub use bidder::{AccountStatus, BidderSnapshot};
pub use ids::{AuctionId, BidId, BidderId};
