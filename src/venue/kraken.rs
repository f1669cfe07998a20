// =============================================================================
// Kraken REST Client — public OHLC data and signed spot orders
// =============================================================================
//
// Private endpoints are authenticated with two headers:
//   API-Key   the public key
//   API-Sign  base64(HMAC-SHA512(base64decode(secret),
//                                 uri_path || SHA256(nonce || postdata)))
//
// SECURITY: the secret is never logged or serialised. Nonces are millisecond
// timestamps and must increase between private calls on the same key.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use sha2::{Digest, Sha256, Sha512};
use tracing::{debug, instrument, warn};
use url::form_urlencoded;

use crate::error::VenueError;
use crate::types::{OrderHandle, OrderKind, OrderRequest};
use crate::venue::{http_client, CandleSource, ExecutionVenue};

type HmacSha512 = Hmac<Sha512>;

const DEFAULT_BASE_URL: &str = "https://api.kraken.com";

/// Kraken spot client.
#[derive(Clone)]
pub struct KrakenClient {
    api_key: String,
    secret: String,
    base_url: String,
    client: reqwest::Client,
}

impl KrakenClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// `secret` is the base64 private key exactly as Kraken issues it.
    pub fn new(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        Ok(Self {
            api_key: api_key.into(),
            secret: secret.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: http_client(timeout, HeaderMap::new())?,
        })
    }

    // -------------------------------------------------------------------------
    // Signing helpers
    // -------------------------------------------------------------------------

    /// Compute the `API-Sign` header for a private request.
    pub fn sign(secret_b64: &str, uri_path: &str, nonce: u64, postdata: &str) -> Result<String> {
        let secret = STANDARD
            .decode(secret_b64)
            .context("Kraken private key is not valid base64")?;

        let mut sha = Sha256::new();
        sha.update(nonce.to_string().as_bytes());
        sha.update(postdata.as_bytes());
        let digest = sha.finalize();

        let mut mac =
            HmacSha512::new_from_slice(&secret).context("HMAC rejected the private key")?;
        mac.update(uri_path.as_bytes());
        mac.update(&digest);
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Form-encode `nonce` followed by `params`. The signature covers exactly
    /// this string, so it is also the request body.
    pub fn encode_postdata(nonce: u64, params: &[(&str, String)]) -> String {
        let mut form = form_urlencoded::Serializer::new(String::new());
        form.append_pair("nonce", &nonce.to_string());
        for (k, v) in params {
            form.append_pair(k, v);
        }
        form.finish()
    }

    fn nonce() -> u64 {
        Utc::now().timestamp_millis() as u64
    }

    /// POST a signed, form-encoded request and return the raw JSON body.
    /// API-level errors are left in the body for the caller to classify.
    async fn private_post(&self, uri_path: &str, params: &[(&str, String)]) -> Result<serde_json::Value> {
        let nonce = Self::nonce();
        let postdata = Self::encode_postdata(nonce, params);
        let signature = Self::sign(&self.secret, uri_path, nonce, &postdata)?;

        let url = format!("{}{}", self.base_url, uri_path);
        let resp = self
            .client
            .post(&url)
            .header("API-Key", &self.api_key)
            .header("API-Sign", signature)
            .header(
                CONTENT_TYPE,
                HeaderValue::from_static("application/x-www-form-urlencoded; charset=utf-8"),
            )
            .body(postdata)
            .send()
            .await
            .with_context(|| format!("POST {uri_path} request failed"))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .with_context(|| format!("failed to parse {uri_path} response"))?;

        if !status.is_success() {
            anyhow::bail!("Kraken POST {} returned {}: {}", uri_path, status, body);
        }
        Ok(body)
    }

    // -------------------------------------------------------------------------
    // Response parsing
    // -------------------------------------------------------------------------

    /// Joined contents of the `error` array, if it is non-empty.
    pub fn api_errors(body: &serde_json::Value) -> Option<String> {
        let errors: Vec<&str> = body
            .get("error")?
            .as_array()?
            .iter()
            .filter_map(|e| e.as_str())
            .collect();
        if errors.is_empty() {
            None
        } else {
            Some(errors.join("; "))
        }
    }

    /// `AddOrder` form fields for `order`, without the nonce.
    pub fn add_order_params(order: &OrderRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("pair", order.symbol.clone()),
            ("type", order.side.as_str().to_string()),
            ("volume", order.quantity.to_string()),
        ];
        match order.kind {
            OrderKind::Market => params.push(("ordertype", "market".into())),
            OrderKind::Limit { price } => {
                params.push(("ordertype", "limit".into()));
                params.push(("price", price.to_string()));
            }
            OrderKind::Stop { stop_price } => {
                params.push(("ordertype", "stop-loss".into()));
                params.push(("price", stop_price.to_string()));
            }
        }
        params
    }

    /// Map a `CancelOrder` response body onto the error taxonomy.
    pub fn classify_cancel_response(
        handle: &OrderHandle,
        body: &serde_json::Value,
    ) -> Result<(), VenueError> {
        if let Some(errors) = Self::api_errors(body) {
            return Err(VenueError::OrderNotFound(format!("{handle} ({errors})")));
        }
        if body["result"]["count"].as_u64() == Some(0) {
            return Err(VenueError::OrderNotFound(handle.to_string()));
        }
        Ok(())
    }

    /// Closing prices from an OHLC response, oldest first.
    ///
    /// Each row is `[time, open, high, low, close, vwap, volume, count]` with
    /// prices encoded as strings. The result is keyed by Kraken's canonical
    /// pair name, which may differ from the requested one.
    pub fn parse_ohlc_closes(body: &serde_json::Value) -> Result<Vec<f64>> {
        if let Some(errors) = Self::api_errors(body) {
            anyhow::bail!("Kraken OHLC error: {errors}");
        }

        let result = body
            .get("result")
            .and_then(|r| r.as_object())
            .context("OHLC response missing 'result'")?;

        let rows = result
            .iter()
            .find(|(k, _)| k.as_str() != "last")
            .and_then(|(_, v)| v.as_array())
            .context("OHLC response has no candle series")?;

        let mut closes = Vec::with_capacity(rows.len());
        for row in rows {
            let close = row
                .get(4)
                .and_then(|c| c.as_str())
                .context("OHLC row missing close")?;
            closes.push(
                close
                    .parse::<f64>()
                    .with_context(|| format!("failed to parse close '{close}'"))?,
            );
        }
        Ok(closes)
    }
}

#[async_trait]
impl CandleSource for KrakenClient {
    #[instrument(skip(self), name = "kraken::ohlc")]
    async fn closes(&self, pair: &str, timeframe_minutes: u32) -> Result<Vec<f64>> {
        let url = format!("{}/0/public/OHLC", self.base_url);

        let resp = self
            .client
            .get(&url)
            .query(&[("pair", pair.to_string()), ("interval", timeframe_minutes.to_string())])
            .send()
            .await
            .context("GET /0/public/OHLC request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse OHLC response")?;

        if !status.is_success() {
            anyhow::bail!("Kraken GET /0/public/OHLC returned {}: {}", status, body);
        }

        let closes = Self::parse_ohlc_closes(&body)?;
        debug!(pair, count = closes.len(), "candles fetched");
        Ok(closes)
    }
}

#[async_trait]
impl ExecutionVenue for KrakenClient {
    #[instrument(skip(self, order), fields(order = %order), name = "kraken::add_order")]
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderHandle, VenueError> {
        let params = Self::add_order_params(order);

        let body = self
            .private_post("/0/private/AddOrder", &params)
            .await
            .map_err(|e| VenueError::OrderRejected(format!("{e:#}")))?;

        if let Some(errors) = Self::api_errors(&body) {
            warn!(errors = %errors, "Kraken rejected order");
            return Err(VenueError::OrderRejected(errors));
        }

        let txid = body["result"]["txid"]
            .as_array()
            .and_then(|ids| ids.first())
            .and_then(|id| id.as_str())
            .ok_or_else(|| VenueError::OrderRejected("AddOrder response has no txid".into()))?;

        debug!(txid, descr = ?body["result"]["descr"]["order"], "order placed");
        Ok(OrderHandle::new(txid))
    }

    #[instrument(skip(self), name = "kraken::cancel_order")]
    async fn cancel_order(&self, handle: &OrderHandle) -> Result<(), VenueError> {
        let body = self
            .private_post("/0/private/CancelOrder", &[("txid", handle.id().to_string())])
            .await
            .map_err(|e| VenueError::OrderNotFound(format!("{handle} ({e:#})")))?;

        Self::classify_cancel_response(handle, &body)?;

        debug!(txid = %handle, "order cancelled");
        Ok(())
    }
}

impl std::fmt::Debug for KrakenClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KrakenClient")
            .field("api_key", &"<redacted>")
            .field("secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}
