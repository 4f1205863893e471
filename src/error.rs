use crate::gate::RejectReason;

/// Domain-specific error types for the bidding engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed input, rejected before it reaches the eligibility gate.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The eligibility gate or pricing rule turned the bid away.
    /// User-visible; the engine never retries these.
    #[error("bid rejected: {0}")]
    Rejected(RejectReason),

    #[error("not found: {0}")]
    NotFound(String),

    /// Persistence fault that is not recoverable by retrying the step.
    #[error("record store failure: {0}")]
    Store(String),

    /// The admission deadline or the internal retry budget was exceeded.
    /// The submission never partially applied; the caller may retry.
    #[error("admission timed out")]
    Timeout,

    /// An engine invariant was violated at resolution time. The affected
    /// auction is suspended and quarantined; manual moderation required.
    #[error("invariant violation: {0}")]
    Inconsistency(String),

    /// The engine or the auction's processing task has shut down.
    #[error("engine unavailable: {0}")]
    Closed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience type alias.
pub type EngineResult<T> = Result<T, EngineError>;
