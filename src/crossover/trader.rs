// =============================================================================
// Crossover Trader — SMA crossover loop with market orders
// =============================================================================
//
// Every tick: fetch closes → compute signal → on BUY/SELL place a market order
// for the configured volume → sleep. Unlike the bracket monitor this loop is
// forgiving: a failed fetch or a rejected order is logged and the next tick
// proceeds as usual. Only the stop signal ends it.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::clock::{Sleeper, StopSignal};
use crate::crossover::sma::{crossover_signal, Signal};
use crate::runtime_config::CrossoverConfig;
use crate::types::{OrderRequest, Side};
use crate::venue::{CandleSource, ExecutionVenue};

/// Counters accumulated over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrossoverStats {
    pub ticks: u64,
    pub buys: u64,
    pub sells: u64,
    pub holds: u64,
    pub errors: u64,
}

pub struct CrossoverTrader {
    config: CrossoverConfig,
    candles: Arc<dyn CandleSource>,
    venue: Arc<dyn ExecutionVenue>,
    sleeper: Arc<dyn Sleeper>,
    stop: StopSignal,
    stats: CrossoverStats,
}

impl CrossoverTrader {
    pub fn new(
        config: CrossoverConfig,
        candles: Arc<dyn CandleSource>,
        venue: Arc<dyn ExecutionVenue>,
        sleeper: Arc<dyn Sleeper>,
        stop: StopSignal,
    ) -> Result<Self> {
        config.validate().context("invalid crossover configuration")?;
        Ok(Self {
            config,
            candles,
            venue,
            sleeper,
            stop,
            stats: CrossoverStats::default(),
        })
    }

    /// One fetch → signal → order cycle.
    pub async fn step(&self) -> Result<Signal> {
        let closes = self
            .candles
            .closes(&self.config.pair, self.config.timeframe_minutes)
            .await
            .context("failed to fetch OHLC data")?;

        let signal = crossover_signal(&closes, self.config.short_period, self.config.long_period);
        info!(pair = %self.config.pair, candles = closes.len(), signal = %signal, "signal computed");

        let side = match signal {
            Signal::Buy => Side::Buy,
            Signal::Sell => Side::Sell,
            Signal::Hold => return Ok(signal),
        };

        let order = OrderRequest::market(&self.config.pair, side, self.config.volume);
        let handle = self
            .venue
            .submit_order(&order)
            .await
            .with_context(|| format!("failed to place {order}"))?;
        info!(order_id = %handle, order = %order, "order placed");

        Ok(signal)
    }

    /// Tick until the stop signal is raised.
    pub async fn run(mut self) -> CrossoverStats {
        info!(
            pair = %self.config.pair,
            volume = self.config.volume,
            short = self.config.short_period,
            long = self.config.long_period,
            sleep_secs = self.config.sleep_interval_secs,
            "crossover trader starting"
        );
        let interval = Duration::from_secs(self.config.sleep_interval_secs);

        while !self.stop.is_stopped() {
            self.stats.ticks += 1;
            match self.step().await {
                Ok(Signal::Buy) => self.stats.buys += 1,
                Ok(Signal::Sell) => self.stats.sells += 1,
                Ok(Signal::Hold) => self.stats.holds += 1,
                Err(e) => {
                    self.stats.errors += 1;
                    error!(error = %format!("{e:#}"), "tick failed, continuing");
                }
            }

            tokio::select! {
                biased;
                _ = self.stop.stopped() => break,
                _ = self.sleeper.sleep(interval) => {}
            }
        }

        info!(stats = ?self.stats, "crossover trader stopped");
        self.stats
    }
}
