// =============================================================================
// Shared types used across the bracket monitor and the crossover trader
// =============================================================================

use serde::Deserialize;

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Lowercase wire name used by both brokerages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// How an order is priced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderKind {
    /// Fill at whatever the venue quotes.
    Market,
    /// Rest at `price` until filled or cancelled.
    Limit { price: f64 },
    /// Becomes a market order once the market trades through `stop_price`.
    Stop { stop_price: f64 },
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Market => write!(f, "MARKET"),
            Self::Limit { price } => write!(f, "LIMIT@{price:.2}"),
            Self::Stop { stop_price } => write!(f, "STOP@{stop_price:.2}"),
        }
    }
}

/// A fully specified order, built by the caller and never modified after
/// submission.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub kind: OrderKind,
}

impl OrderRequest {
    /// Entry buy: market when `limit_price` is `None`, limit otherwise.
    pub fn entry(symbol: &str, quantity: f64, limit_price: Option<f64>) -> Self {
        let kind = match limit_price {
            Some(price) => OrderKind::Limit { price },
            None => OrderKind::Market,
        };
        Self {
            symbol: symbol.to_string(),
            side: Side::Buy,
            quantity,
            kind,
        }
    }

    /// Protective sell-limit at the take-profit price.
    pub fn take_profit(symbol: &str, quantity: f64, price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side: Side::Sell,
            quantity,
            kind: OrderKind::Limit { price },
        }
    }

    /// Protective sell-stop at the stop-loss price.
    pub fn stop_loss(symbol: &str, quantity: f64, stop_price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side: Side::Sell,
            quantity,
            kind: OrderKind::Stop { stop_price },
        }
    }

    pub fn market(symbol: &str, side: Side, quantity: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            quantity,
            kind: OrderKind::Market,
        }
    }
}

impl std::fmt::Display for OrderRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {} {}", self.side, self.quantity, self.symbol, self.kind)
    }
}

/// Opaque order identifier handed back by a venue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderHandle(pub String);

impl OrderHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Login material for a brokerage account. Never logged.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub mfa_code: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("mfa_code", &self.mfa_code.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Authenticated session returned by a successful login.
#[derive(Clone, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}
