use serde::{Deserialize, Serialize};

use crate::model::BidderId;

/// Account standing as reported by the identity collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    Active,
    Inactive,
    Suspended,
    Banned,
}

/// Point-in-time eligibility data for one bidder, read from the identity
/// and fraud collaborators at admission time.
///
/// The engine treats the snapshot as an immutable input per evaluation;
/// there is no staleness guarantee beyond "current at admission time".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidderSnapshot {
    pub bidder_id: BidderId,
    /// Platform credit score, 300-850.
    pub credit_score: u32,
    pub account_status: AccountStatus,
    pub successful_transactions: u32,
    pub failed_transactions: u32,
    /// Externally computed fraud score, 0.0-10.0.
    pub fraud_score: f64,
}

impl BidderSnapshot {
    /// A clean snapshot for an active account, used by tests and the
    /// simulation binary.
    pub fn good_standing(bidder_id: BidderId) -> Self {
        Self {
            bidder_id,
            credit_score: 700,
            account_status: AccountStatus::Active,
            successful_transactions: 25,
            failed_transactions: 0,
            fraud_score: 0.5,
        }
    }
}
