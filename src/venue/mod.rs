// =============================================================================
// External collaborators — execution venues, price feeds, candle sources
// =============================================================================
//
// The trading loops only ever talk to these traits. Concrete clients:
//   - `robinhood::RobinhoodClient`      equities brokerage (login + orders)
//   - `alpha_vantage::AlphaVantageFeed` live equity quotes
//   - `kraken::KrakenClient`            crypto OHLC + market orders
//   - `paper::PaperVenue`               in-process simulated venue

pub mod alpha_vantage;
pub mod kraken;
pub mod paper;
pub mod robinhood;

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::VenueError;
use crate::types::{Credentials, OrderHandle, OrderRequest, Session};

/// Places and cancels orders.
#[async_trait]
pub trait ExecutionVenue: Send + Sync {
    /// Fails with `OrderRejected` when the venue refuses the order.
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderHandle, VenueError>;

    /// Fails with `OrderNotFound` or `AlreadyFilled`.
    async fn cancel_order(&self, handle: &OrderHandle) -> Result<(), VenueError>;
}

/// Latest traded price for a symbol.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn get_quote(&self, symbol: &str) -> Result<f64, VenueError>;
}

/// One-time login against a brokerage.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<Session, VenueError>;
}

/// Closing prices of recent candles, oldest first.
#[async_trait]
pub trait CandleSource: Send + Sync {
    async fn closes(&self, pair: &str, timeframe_minutes: u32) -> anyhow::Result<Vec<f64>>;
}

/// Shared reqwest client builder. `timeout = None` keeps reqwest's default of
/// waiting indefinitely.
pub(crate) fn http_client(
    timeout: Option<Duration>,
    default_headers: reqwest::header::HeaderMap,
) -> anyhow::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().default_headers(default_headers);
    match timeout {
        Some(t) => builder = builder.timeout(t),
        None => warn!("no HTTP request timeout configured, remote calls may block indefinitely"),
    }
    Ok(builder.build()?)
}
