// =============================================================================
// Alpha Vantage — live equity quotes via the GLOBAL_QUOTE endpoint
// =============================================================================
//
// The free tier answers throttled requests with HTTP 200 and a "Note" or
// "Information" field instead of a quote, so the body is always inspected.
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use tracing::{debug, instrument};

use crate::error::VenueError;
use crate::venue::{http_client, PriceFeed};

const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co";

/// Price feed backed by the Alpha Vantage REST API.
#[derive(Clone)]
pub struct AlphaVantageFeed {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl AlphaVantageFeed {
    pub fn new(api_key: impl Into<String>, timeout: Option<Duration>) -> anyhow::Result<Self> {
        Ok(Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: http_client(timeout, HeaderMap::new())?,
        })
    }

    /// Extract `"Global Quote"."05. price"` from a GLOBAL_QUOTE response.
    pub fn parse_global_quote(symbol: &str, body: &serde_json::Value) -> Result<f64, VenueError> {
        for key in ["Error Message", "Note", "Information"] {
            if let Some(msg) = body.get(key).and_then(|v| v.as_str()) {
                return Err(VenueError::quote_unavailable(symbol, msg));
            }
        }

        let quote = body
            .get("Global Quote")
            .and_then(|q| q.as_object())
            .filter(|q| !q.is_empty())
            .ok_or_else(|| VenueError::quote_unavailable(symbol, "symbol not found"))?;

        let raw = quote
            .get("05. price")
            .and_then(|p| p.as_str())
            .ok_or_else(|| VenueError::quote_unavailable(symbol, "quote has no price"))?;

        let price: f64 = raw
            .parse()
            .map_err(|_| VenueError::quote_unavailable(symbol, format!("unparseable price '{raw}'")))?;

        if !(price.is_finite() && price > 0.0) {
            return Err(VenueError::quote_unavailable(symbol, format!("invalid price {price}")));
        }
        Ok(price)
    }
}

#[async_trait]
impl PriceFeed for AlphaVantageFeed {
    #[instrument(skip(self), name = "alpha_vantage::get_quote")]
    async fn get_quote(&self, symbol: &str) -> Result<f64, VenueError> {
        let url = format!("{}/query", self.base_url);

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("function", "GLOBAL_QUOTE"),
                ("symbol", symbol),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| VenueError::quote_unavailable(symbol, format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(VenueError::quote_unavailable(symbol, format!("HTTP {status}")));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| VenueError::quote_unavailable(symbol, format!("bad response body: {e}")))?;

        let price = Self::parse_global_quote(symbol, &body)?;
        debug!(symbol, price, "quote received");
        Ok(price)
    }
}

impl std::fmt::Debug for AlphaVantageFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlphaVantageFeed")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}
