// =============================================================================
// Error taxonomy for venue, feed, and bracket failures
// =============================================================================
//
// Every variant is fatal to the bracket monitor. Nothing in this crate retries
// on these errors; the operator decides what to do next.
// =============================================================================

use thiserror::Error;

use crate::bracket::state::BracketStatus;

/// Failures reported by an execution venue, price feed, or authenticator.
#[derive(Debug, Error)]
pub enum VenueError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("order rejected: {0}")]
    OrderRejected(String),

    #[error("order {0} not found")]
    OrderNotFound(String),

    #[error("order {0} already filled")]
    AlreadyFilled(String),

    #[error("quote unavailable for {symbol}: {reason}")]
    QuoteUnavailable { symbol: String, reason: String },
}

impl VenueError {
    pub fn quote_unavailable(symbol: &str, reason: impl std::fmt::Display) -> Self {
        Self::QuoteUnavailable {
            symbol: symbol.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Failures surfaced by the bracket monitor.
#[derive(Debug, Error)]
pub enum BracketError {
    #[error("invalid bracket configuration: {0}")]
    InvalidConfig(String),

    /// A venue or feed call failed; `status` is where the bracket stood when
    /// it happened.
    #[error("bracket failed while {status}: {source}")]
    Venue {
        status: BracketStatus,
        #[source]
        source: VenueError,
    },
}
