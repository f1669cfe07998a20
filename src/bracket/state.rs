// =============================================================================
// Bracket State — lifecycle of one OCO bracket
// =============================================================================
//
//   Initiated ──entry──▶ EntryPlaced ──TP+SL──▶ ExitsPlaced ──cross──▶ Resolved
//
// Resolution is decided by `evaluate`, a pure function of the sampled price:
//
//   price >= take_profit  → TakeProfitHit   (checked first, wins ties)
//   price <= stop_loss    → StopLossHit
//   otherwise             → keep polling
//
// Once resolved, the protective order that was cancelled is removed from the
// state, so at most one exit handle is ever left behind.
// =============================================================================

use crate::runtime_config::BracketConfig;
use crate::types::OrderHandle;

/// Which threshold resolved the bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    TakeProfitHit,
    StopLossHit,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TakeProfitHit => write!(f, "TP"),
            Self::StopLossHit => write!(f, "SL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BracketStatus {
    Initiated,
    EntryPlaced,
    ExitsPlaced,
    Resolved(Outcome),
}

impl std::fmt::Display for BracketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initiated => write!(f, "Initiated"),
            Self::EntryPlaced => write!(f, "EntryPlaced"),
            Self::ExitsPlaced => write!(f, "ExitsPlaced"),
            Self::Resolved(o) => write!(f, "Resolved({o})"),
        }
    }
}

/// Threshold check for a single price sample.
pub fn evaluate(price: f64, take_profit: f64, stop_loss: f64) -> Option<Outcome> {
    if price >= take_profit {
        Some(Outcome::TakeProfitHit)
    } else if price <= stop_loss {
        Some(Outcome::StopLossHit)
    } else {
        None
    }
}

/// Mutable state of a bracket, owned exclusively by its monitor.
#[derive(Debug, Clone)]
pub struct BracketState {
    pub symbol: String,
    pub quantity: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
    pub entry_handle: Option<OrderHandle>,
    pub tp_handle: Option<OrderHandle>,
    pub sl_handle: Option<OrderHandle>,
    /// Market sell that closed the position, once submitted.
    pub close_handle: Option<OrderHandle>,
    pub status: BracketStatus,
}

impl BracketState {
    pub fn new(config: &BracketConfig) -> Self {
        Self {
            symbol: config.symbol.clone(),
            quantity: config.quantity,
            take_profit: config.take_profit,
            stop_loss: config.stop_loss,
            entry_handle: None,
            tp_handle: None,
            sl_handle: None,
            close_handle: None,
            status: BracketStatus::Initiated,
        }
    }

    pub fn evaluate(&self, price: f64) -> Option<Outcome> {
        evaluate(price, self.take_profit, self.stop_loss)
    }

    pub fn record_entry(&mut self, handle: OrderHandle) {
        self.entry_handle = Some(handle);
        self.status = BracketStatus::EntryPlaced;
    }

    pub fn record_exits(&mut self, tp: OrderHandle, sl: OrderHandle) {
        self.tp_handle = Some(tp);
        self.sl_handle = Some(sl);
        self.status = BracketStatus::ExitsPlaced;
    }

    /// Status is left alone: the bracket only resolves once the opposite
    /// exit is cancelled.
    pub fn record_close(&mut self, handle: OrderHandle) {
        self.close_handle = Some(handle);
    }

    /// The protective order that must be cancelled for `outcome`.
    pub fn opposite_handle(&self, outcome: Outcome) -> Option<&OrderHandle> {
        match outcome {
            Outcome::TakeProfitHit => self.sl_handle.as_ref(),
            Outcome::StopLossHit => self.tp_handle.as_ref(),
        }
    }

    /// Mark the bracket resolved and drop the cancelled handle.
    pub fn resolve(&mut self, outcome: Outcome) -> Option<OrderHandle> {
        let cancelled = match outcome {
            Outcome::TakeProfitHit => self.sl_handle.take(),
            Outcome::StopLossHit => self.tp_handle.take(),
        };
        self.status = BracketStatus::Resolved(outcome);
        cancelled
    }
}
