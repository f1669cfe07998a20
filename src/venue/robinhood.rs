// =============================================================================
// Robinhood REST Client — OAuth password login, equity orders, cancellation
// =============================================================================
//
// SECURITY: the password, MFA code and bearer token are never logged or
// serialised. The token lives only in the in-memory session slot.
//
// Order placement needs two URLs the API hands out: the account URL (fetched
// once right after login) and the instrument URL for the symbol (fetched per
// order).
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::StatusCode;
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::VenueError;
use crate::types::{Credentials, OrderHandle, OrderKind, OrderRequest, Session};
use crate::venue::{http_client, Authenticator, ExecutionVenue};

const DEFAULT_BASE_URL: &str = "https://api.robinhood.com";

/// Public OAuth client id used by Robinhood's own web app.
const OAUTH_CLIENT_ID: &str = "c82SH0WZOsabOXGP2sxqcj34FxkvfnWRZBKlBjFS";

/// Requested session lifetime in seconds.
const SESSION_EXPIRES_IN: u64 = 86_400;

#[derive(Clone)]
struct AuthState {
    bearer: String,
    account_url: String,
}

/// Robinhood brokerage client.
pub struct RobinhoodClient {
    base_url: String,
    client: reqwest::Client,
    session: RwLock<Option<AuthState>>,
}

impl RobinhoodClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    pub fn new(timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = http_client(timeout, headers)?;
        debug!(base_url = DEFAULT_BASE_URL, "RobinhoodClient initialised");

        Ok(Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
            session: RwLock::new(None),
        })
    }

    // -------------------------------------------------------------------------
    // Payload & response helpers
    // -------------------------------------------------------------------------

    /// Build the JSON body for `POST /orders/`.
    pub fn build_order_payload(
        order: &OrderRequest,
        account_url: &str,
        instrument_url: &str,
        ref_id: &str,
    ) -> serde_json::Value {
        let (order_type, trigger, price, stop_price) = match order.kind {
            OrderKind::Market => ("market", "immediate", None, None),
            OrderKind::Limit { price } => ("limit", "immediate", Some(price), None),
            OrderKind::Stop { stop_price } => ("market", "stop", None, Some(stop_price)),
        };

        let mut body = json!({
            "account": account_url,
            "instrument": instrument_url,
            "symbol": order.symbol.to_uppercase(),
            "quantity": order.quantity,
            "side": order.side.as_str(),
            "type": order_type,
            "trigger": trigger,
            "time_in_force": "gtc",
            "ref_id": ref_id,
            "extended_hours": false,
        });

        if let Some(p) = price {
            body["price"] = json!(round_cents(p));
        }
        if let Some(sp) = stop_price {
            body["stop_price"] = json!(round_cents(sp));
        }
        body
    }

    /// Map a failed `POST /orders/{id}/cancel/` onto the error taxonomy.
    pub fn classify_cancel_failure(
        order_id: &str,
        status: StatusCode,
        body: &serde_json::Value,
    ) -> VenueError {
        let detail = error_detail(body);
        if status == StatusCode::NOT_FOUND {
            return VenueError::OrderNotFound(order_id.to_string());
        }
        if detail.to_lowercase().contains("filled") {
            return VenueError::AlreadyFilled(order_id.to_string());
        }
        VenueError::OrderNotFound(format!("{order_id} (HTTP {status}: {detail})"))
    }

    /// Turn a `POST /oauth2/token/` response into a session or an
    /// `AuthenticationFailed`.
    pub fn classify_login_response(
        status: StatusCode,
        body: serde_json::Value,
    ) -> Result<Session, VenueError> {
        if body.get("mfa_required").and_then(|v| v.as_bool()) == Some(true) {
            return Err(VenueError::AuthenticationFailed("MFA code required".into()));
        }
        if !status.is_success() {
            return Err(VenueError::AuthenticationFailed(format!(
                "HTTP {}: {}",
                status,
                error_detail(&body)
            )));
        }
        serde_json::from_value(body)
            .map_err(|e| VenueError::AuthenticationFailed(format!("unexpected token response: {e}")))
    }

    fn auth_state(&self) -> Option<AuthState> {
        self.session.read().clone()
    }

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------

    #[instrument(skip(self, bearer), name = "robinhood::account_url")]
    async fn fetch_account_url(&self, bearer: &str) -> anyhow::Result<String> {
        let url = format!("{}/accounts/", self.base_url);
        let body = self.get_json(&url, bearer).await?;
        first_result_url(&body).ok_or_else(|| anyhow::anyhow!("no brokerage account on this login"))
    }

    #[instrument(skip(self, bearer), name = "robinhood::instrument_url")]
    async fn fetch_instrument_url(&self, symbol: &str, bearer: &str) -> anyhow::Result<String> {
        let url = format!("{}/instruments/", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("symbol", symbol.to_uppercase())])
            .bearer_auth(bearer)
            .send()
            .await?;
        let status = resp.status();
        let body: serde_json::Value = resp.json().await?;
        if !status.is_success() {
            anyhow::bail!("GET /instruments/ returned {}: {}", status, error_detail(&body));
        }
        first_result_url(&body).ok_or_else(|| anyhow::anyhow!("unknown symbol {symbol}"))
    }

    async fn get_json(&self, url: &str, bearer: &str) -> anyhow::Result<serde_json::Value> {
        let resp = self.client.get(url).bearer_auth(bearer).send().await?;
        let status = resp.status();
        let body: serde_json::Value = resp.json().await?;
        if !status.is_success() {
            anyhow::bail!("GET {} returned {}: {}", url, status, error_detail(&body));
        }
        Ok(body)
    }
}

#[async_trait]
impl Authenticator for RobinhoodClient {
    #[instrument(skip(self, credentials), name = "robinhood::login")]
    async fn login(&self, credentials: &Credentials) -> Result<Session, VenueError> {
        let mut payload = json!({
            "client_id": OAUTH_CLIENT_ID,
            "expires_in": SESSION_EXPIRES_IN,
            "grant_type": "password",
            "scope": "internal",
            "username": credentials.username,
            "password": credentials.password,
            "device_token": Uuid::new_v4().to_string(),
        });
        if let Some(mfa) = &credentials.mfa_code {
            payload["mfa_code"] = json!(mfa);
        }

        let url = format!("{}/oauth2/token/", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| VenueError::AuthenticationFailed(format!("request failed: {e}")))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| VenueError::AuthenticationFailed(format!("bad response body: {e}")))?;

        let session = Self::classify_login_response(status, body)?;

        let account_url = self
            .fetch_account_url(&session.access_token)
            .await
            .map_err(|e| VenueError::AuthenticationFailed(format!("account lookup failed: {e}")))?;

        *self.session.write() = Some(AuthState {
            bearer: session.access_token.clone(),
            account_url,
        });

        info!(username = %credentials.username, expires_in = session.expires_in, "logged in");
        Ok(session)
    }
}

#[async_trait]
impl ExecutionVenue for RobinhoodClient {
    #[instrument(skip(self, order), fields(order = %order), name = "robinhood::submit_order")]
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderHandle, VenueError> {
        let auth = self
            .auth_state()
            .ok_or_else(|| VenueError::OrderRejected("not logged in".into()))?;

        let instrument_url = self
            .fetch_instrument_url(&order.symbol, &auth.bearer)
            .await
            .map_err(|e| VenueError::OrderRejected(format!("instrument lookup failed: {e}")))?;

        let ref_id = Uuid::new_v4().to_string();
        let payload = Self::build_order_payload(order, &auth.account_url, &instrument_url, &ref_id);

        let url = format!("{}/orders/", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&auth.bearer)
            .json(&payload)
            .send()
            .await
            .map_err(|e| VenueError::OrderRejected(format!("POST /orders/ failed: {e}")))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| VenueError::OrderRejected(format!("bad order response: {e}")))?;

        if !status.is_success() {
            warn!(%status, detail = %error_detail(&body), "order rejected");
            return Err(VenueError::OrderRejected(format!(
                "HTTP {}: {}",
                status,
                error_detail(&body)
            )));
        }

        let id = body
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| VenueError::OrderRejected("order response has no id".into()))?;

        debug!(order_id = id, state = ?body.get("state"), "order placed");
        Ok(OrderHandle::new(id))
    }

    #[instrument(skip(self), name = "robinhood::cancel_order")]
    async fn cancel_order(&self, handle: &OrderHandle) -> Result<(), VenueError> {
        let auth = self
            .auth_state()
            .ok_or_else(|| VenueError::OrderNotFound(format!("{handle} (not logged in)")))?;

        let url = format!("{}/orders/{}/cancel/", self.base_url, handle.id());
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&auth.bearer)
            .send()
            .await
            .map_err(|e| VenueError::OrderNotFound(format!("{handle} (request failed: {e})")))?;

        let status = resp.status();
        if status.is_success() {
            debug!(order_id = %handle, "order cancelled");
            return Ok(());
        }

        // Error bodies are JSON, but a missing or malformed body must not hide
        // the status code.
        let body: serde_json::Value = resp.json().await.unwrap_or(serde_json::Value::Null);
        Err(Self::classify_cancel_failure(handle.id(), status, &body))
    }
}

impl std::fmt::Debug for RobinhoodClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RobinhoodClient")
            .field("base_url", &self.base_url)
            .field("logged_in", &self.session.read().is_some())
            .finish()
    }
}

// -----------------------------------------------------------------------------
// Free helpers
// -----------------------------------------------------------------------------

fn round_cents(price: f64) -> f64 {
    (price * 100.0).round() / 100.0
}

fn first_result_url(body: &serde_json::Value) -> Option<String> {
    body.get("results")?
        .as_array()?
        .first()?
        .get("url")?
        .as_str()
        .map(str::to_string)
}

fn error_detail(body: &serde_json::Value) -> String {
    match body.get("detail").and_then(|v| v.as_str()) {
        Some(d) => d.to_string(),
        None => body.to_string(),
    }
}
