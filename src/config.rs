//! Engine policy and configuration constants.
//!
//! Thresholds live here rather than in business logic so deployments can
//! tune them without touching the admission or resolution code.

use serde::{Deserialize, Serialize};

/// Minimum credit score required to place any bid.
pub const DEFAULT_MIN_CREDIT_SCORE: u32 = 300;

/// Fraud scores at or above this value are admitted but flagged suspicious.
pub const DEFAULT_FRAUD_FLAG_THRESHOLD: f64 = 5.0;

/// Fraud scores at or above this value are rejected outright.
/// Scores run 0.0 to 10.0 and are computed by the external fraud service.
pub const DEFAULT_FRAUD_REJECT_THRESHOLD: f64 = 8.0;

/// Trailing window (seconds) in which a late bid extends the close time.
pub const DEFAULT_EXTENSION_WINDOW_SECS: u64 = 300;

/// Price raise applied by each admitted bid on a penny auction, in minor
/// currency units.
pub const DEFAULT_PENNY_INCREMENT: u64 = 1;

/// Deadline for a single bid admission before the caller gets a timeout.
pub const DEFAULT_ADMISSION_DEADLINE_MS: u64 = 5_000;

/// Maximum retries for record-store and directory calls within one step.
pub const STORE_MAX_RETRIES: u32 = 10;

/// Initial delay for store/directory retry (doubles on each retry).
pub const STORE_RETRY_INITIAL_DELAY_MS: u64 = 50;

/// Interval in seconds between lifecycle clock ticks.
pub const CLOCK_TICK_INTERVAL_SECS: u64 = 1;

/// Delivery retries for a single event before it is dropped with an error.
pub const EVENT_DELIVERY_MAX_RETRIES: u32 = 5;

/// Depth of each auction actor's command queue.
pub const COMMAND_QUEUE_DEPTH: usize = 64;

/// Cap on extension count per auction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Extensions {
    Unbounded,
    Limit(u32),
}

impl Extensions {
    /// Whether another extension is allowed given the count so far.
    pub fn allows(&self, used: u32) -> bool {
        match self {
            Self::Unbounded => true,
            Self::Limit(max) => used < *max,
        }
    }
}

/// Externally supplied engine policy.
///
/// All admission thresholds, the minimum-increment table, and timing
/// budgets come from here. `Policy::default()` is the production default
/// set; tests construct variants field by field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Bidders below this credit score cannot bid.
    pub min_credit_score: u32,
    /// Fraud score at which a bid is persisted with `is_suspicious`.
    pub fraud_flag_threshold: f64,
    /// Fraud score at which a bid is rejected.
    pub fraud_reject_threshold: f64,
    /// Minimum-increment table: `(bracket_floor, increment)` pairs sorted
    /// by ascending floor. The increment for a price is the entry with the
    /// largest floor not exceeding it.
    pub increment_table: Vec<(u64, u64)>,
    /// Anti-sniping window in seconds.
    pub extension_window_secs: u64,
    /// Cap on anti-sniping extensions per auction.
    pub max_extensions: Extensions,
    /// Fixed raise per admitted bid on penny auctions.
    pub penny_increment: u64,
    /// Per-submission deadline before the caller receives a timeout.
    pub admission_deadline_ms: u64,
    /// Retry budget for store/directory calls within a serialized step.
    pub store_max_retries: u32,
    /// Initial backoff delay for those retries (doubles each attempt).
    pub store_retry_initial_delay_ms: u64,
    /// Lifecycle clock tick interval.
    pub clock_tick_secs: u64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            min_credit_score: DEFAULT_MIN_CREDIT_SCORE,
            fraud_flag_threshold: DEFAULT_FRAUD_FLAG_THRESHOLD,
            fraud_reject_threshold: DEFAULT_FRAUD_REJECT_THRESHOLD,
            // $0-50 -> $1, $50-500 -> $5, above -> $25 (minor units)
            increment_table: vec![(0, 100), (5_000, 500), (50_000, 2_500)],
            extension_window_secs: DEFAULT_EXTENSION_WINDOW_SECS,
            max_extensions: Extensions::Unbounded,
            penny_increment: DEFAULT_PENNY_INCREMENT,
            admission_deadline_ms: DEFAULT_ADMISSION_DEADLINE_MS,
            store_max_retries: STORE_MAX_RETRIES,
            store_retry_initial_delay_ms: STORE_RETRY_INITIAL_DELAY_MS,
            clock_tick_secs: CLOCK_TICK_INTERVAL_SECS,
        }
    }
}

impl Policy {
    /// Minimum increment for the bracket containing `price`.
    ///
    /// Falls back to the smallest bracket's increment if the table has no
    /// entry at or below `price` (a misconfigured table, not a panic).
    pub fn increment_for(&self, price: u64) -> u64 {
        self.increment_table
            .iter()
            .rev()
            .find(|(floor, _)| *floor <= price)
            .or_else(|| self.increment_table.first())
            .map_or(1, |(_, step)| *step)
    }
}

/// Return the current Unix timestamp in seconds.
///
/// Convenience wrapper for production paths; testable code should accept
/// a `TimeProvider` instead.
pub fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
