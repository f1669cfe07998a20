// =============================================================================
// Bracket Monitor — entry, protective exits, then poll until one side crosses
// =============================================================================
//
// Sequence for one bracket:
//   1. Submit the entry buy (market, or limit when an entry price is set).
//   2. Wait the settle delay, then submit the take-profit sell-limit and the
//      stop-loss sell-stop, both for the full quantity.
//   3. Loop: sleep a jittered interval, sample the price, and on a crossing
//      sell the full quantity at market and cancel the opposite exit.
//
// Every venue or feed failure ends the run immediately as a `BracketError`.
// Nothing is retried. The stop signal is honoured only while sleeping (the
// settle delay and the waits between samples); orders already resting on the
// venue are left in place.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tracing::{debug, info, warn};

use crate::bracket::pacing::PollPacing;
use crate::bracket::state::{BracketState, Outcome};
use crate::clock::{Sleeper, StopSignal};
use crate::error::{BracketError, VenueError};
use crate::runtime_config::BracketConfig;
use crate::types::{OrderHandle, OrderRequest, Side};
use crate::venue::{ExecutionVenue, PriceFeed};

/// Summary of a resolved bracket.
#[derive(Debug, Clone)]
pub struct BracketReport {
    pub outcome: Outcome,
    /// Price sample that crossed the threshold.
    pub trigger_price: f64,
    /// Number of price samples taken, including the trigger.
    pub samples: u64,
    /// Market sell that closed the position.
    pub close_handle: OrderHandle,
    /// Protective order cancelled at resolution.
    pub cancelled_handle: Option<OrderHandle>,
}

pub struct BracketMonitor {
    config: BracketConfig,
    state: BracketState,
    venue: Arc<dyn ExecutionVenue>,
    feed: Arc<dyn PriceFeed>,
    sleeper: Arc<dyn Sleeper>,
    pacing: PollPacing,
    stop: StopSignal,
}

impl BracketMonitor {
    /// Validates `config`; an invalid bracket never reaches the venue.
    pub fn new(
        config: BracketConfig,
        venue: Arc<dyn ExecutionVenue>,
        feed: Arc<dyn PriceFeed>,
        sleeper: Arc<dyn Sleeper>,
        stop: StopSignal,
    ) -> Result<Self, BracketError> {
        config.validate()?;
        let pacing = PollPacing::new(config.poll_interval_secs, config.jitter_secs, config.jitter_seed);
        Ok(Self {
            state: BracketState::new(&config),
            config,
            venue,
            feed,
            sleeper,
            pacing,
            stop,
        })
    }

    pub fn state(&self) -> &BracketState {
        &self.state
    }

    /// Drive the bracket to resolution.
    ///
    /// Returns `Ok(None)` when the stop signal ended the polling loop before
    /// either threshold was crossed.
    pub async fn run(&mut self) -> Result<Option<BracketReport>, BracketError> {
        info!(
            symbol = %self.config.symbol,
            quantity = self.config.quantity,
            entry_price = ?self.config.entry_price,
            take_profit = self.config.take_profit,
            stop_loss = self.config.stop_loss,
            interval_secs = self.config.poll_interval_secs,
            jitter_secs = self.config.jitter_secs,
            "bracket monitor starting"
        );

        self.place_entry().await?;

        if self.config.settle_delay_secs > 0.0 {
            let settle = Duration::from_secs_f64(self.config.settle_delay_secs);
            tokio::select! {
                biased;
                _ = self.stop.stopped() => {
                    warn!(
                        symbol = %self.state.symbol,
                        entry_order = ?self.state.entry_handle,
                        "stop requested before exits were placed; entry position is unprotected"
                    );
                    return Ok(None);
                }
                _ = self.sleeper.sleep(settle) => {}
            }
        }

        self.place_exits().await?;
        self.poll_until_resolved().await
    }

    // -------------------------------------------------------------------------
    // Order placement
    // -------------------------------------------------------------------------

    async fn place_entry(&mut self) -> Result<(), BracketError> {
        let order = OrderRequest::entry(&self.config.symbol, self.config.quantity, self.config.entry_price);
        let handle = self.submit(&order).await?;
        info!(order_id = %handle, order = %order, "entry order placed");
        self.state.record_entry(handle);
        Ok(())
    }

    async fn place_exits(&mut self) -> Result<(), BracketError> {
        let tp = OrderRequest::take_profit(&self.config.symbol, self.config.quantity, self.config.take_profit);
        let tp_handle = self.submit(&tp).await?;
        info!(order_id = %tp_handle, order = %tp, "take-profit order placed");

        let sl = OrderRequest::stop_loss(&self.config.symbol, self.config.quantity, self.config.stop_loss);
        let sl_handle = self.submit(&sl).await?;
        info!(order_id = %sl_handle, order = %sl, "stop-loss order placed");

        self.state.record_exits(tp_handle, sl_handle);
        Ok(())
    }

    async fn submit(&self, order: &OrderRequest) -> Result<OrderHandle, BracketError> {
        self.venue.submit_order(order).await.map_err(|e| self.fail(e))
    }

    // -------------------------------------------------------------------------
    // Polling
    // -------------------------------------------------------------------------

    async fn poll_until_resolved(&mut self) -> Result<Option<BracketReport>, BracketError> {
        let mut samples: u64 = 0;

        loop {
            let wait = self.pacing.next_wait();
            debug!(wait_secs = format!("{:.2}", wait.as_secs_f64()), "waiting for next price check");

            tokio::select! {
                biased;
                _ = self.stop.stopped() => {
                    warn!(
                        symbol = %self.state.symbol,
                        samples,
                        tp_order = ?self.state.tp_handle,
                        sl_order = ?self.state.sl_handle,
                        "stop requested, leaving protective orders in place"
                    );
                    return Ok(None);
                }
                _ = self.sleeper.sleep(wait) => {}
            }

            let price = self
                .feed
                .get_quote(&self.state.symbol)
                .await
                .map_err(|e| self.fail(e))?;
            samples += 1;

            info!(
                symbol = %self.state.symbol,
                price = format!("{price:.2}"),
                at = %Local::now().format("%H:%M:%S"),
                "price sample"
            );

            if let Some(outcome) = self.state.evaluate(price) {
                return self.resolve(outcome, price, samples).await.map(Some);
            }
        }
    }

    async fn resolve(
        &mut self,
        outcome: Outcome,
        price: f64,
        samples: u64,
    ) -> Result<BracketReport, BracketError> {
        info!(
            symbol = %self.state.symbol,
            outcome = %outcome,
            price,
            take_profit = self.state.take_profit,
            stop_loss = self.state.stop_loss,
            "threshold crossed, closing position at market"
        );

        let close = OrderRequest::market(&self.state.symbol, Side::Sell, self.state.quantity);
        let close_handle = self.submit(&close).await?;
        info!(order_id = %close_handle, order = %close, "closing order placed");
        self.state.record_close(close_handle.clone());

        if let Some(opposite) = self.state.opposite_handle(outcome).cloned() {
            if let Err(e) = self.venue.cancel_order(&opposite).await {
                warn!(
                    order_id = %opposite,
                    close_order = %close_handle,
                    error = %e,
                    "position already closed at market but the opposite order could not be cancelled"
                );
                return Err(self.fail(e));
            }
            info!(order_id = %opposite, "opposite protective order cancelled");
        }

        let cancelled_handle = self.state.resolve(outcome);
        info!(status = %self.state.status, samples, "OCO sequence completed");

        Ok(BracketReport {
            outcome,
            trigger_price: price,
            samples,
            close_handle,
            cancelled_handle,
        })
    }

    fn fail(&self, source: VenueError) -> BracketError {
        BracketError::Venue {
            status: self.state.status,
            source,
        }
    }
}

impl std::fmt::Debug for BracketMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BracketMonitor")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::bracket::state::BracketStatus;
    use crate::clock::StopSignal;
    use crate::types::OrderKind;
    use crate::venue::paper::PaperVenue;

    enum Tick {
        Price(f64),
        Fail,
    }

    struct ScriptedFeed {
        ticks: Mutex<VecDeque<Tick>>,
    }

    impl ScriptedFeed {
        fn prices(prices: &[f64]) -> Arc<Self> {
            Self::ticks(prices.iter().map(|&p| Tick::Price(p)).collect())
        }

        fn ticks(ticks: Vec<Tick>) -> Arc<Self> {
            Arc::new(Self {
                ticks: Mutex::new(ticks.into()),
            })
        }
    }

    #[async_trait]
    impl PriceFeed for ScriptedFeed {
        async fn get_quote(&self, symbol: &str) -> Result<f64, VenueError> {
            match self.ticks.lock().pop_front() {
                Some(Tick::Price(p)) => Ok(p),
                Some(Tick::Fail) => Err(VenueError::quote_unavailable(symbol, "provider error")),
                None => Err(VenueError::quote_unavailable(symbol, "script exhausted")),
            }
        }
    }

    #[derive(Default)]
    struct RecordingSleeper {
        waits: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.waits.lock().push(duration);
        }
    }

    struct RejectingVenue;

    #[async_trait]
    impl ExecutionVenue for RejectingVenue {
        async fn submit_order(&self, _order: &OrderRequest) -> Result<OrderHandle, VenueError> {
            Err(VenueError::OrderRejected("account restricted".into()))
        }

        async fn cancel_order(&self, handle: &OrderHandle) -> Result<(), VenueError> {
            Err(VenueError::OrderNotFound(handle.to_string()))
        }
    }

    /// Paper venue whose cancellations always fail.
    struct StuckCancelVenue {
        inner: PaperVenue,
    }

    #[async_trait]
    impl ExecutionVenue for StuckCancelVenue {
        async fn submit_order(&self, order: &OrderRequest) -> Result<OrderHandle, VenueError> {
            self.inner.submit_order(order).await
        }

        async fn cancel_order(&self, handle: &OrderHandle) -> Result<(), VenueError> {
            Err(VenueError::OrderNotFound(handle.to_string()))
        }
    }

    fn config() -> BracketConfig {
        BracketConfig {
            symbol: "AAPL".into(),
            quantity: 10.0,
            entry_price: None,
            take_profit: 110.0,
            stop_loss: 90.0,
            poll_interval_secs: 20.0,
            jitter_secs: 5.0,
            settle_delay_secs: 0.0,
            jitter_seed: Some(1),
        }
    }

    fn monitor(
        config: BracketConfig,
        venue: Arc<PaperVenue>,
        feed: Arc<ScriptedFeed>,
        sleeper: Arc<RecordingSleeper>,
    ) -> BracketMonitor {
        BracketMonitor::new(config, venue, feed, sleeper, StopSignal::never()).unwrap()
    }

    #[tokio::test]
    async fn take_profit_scenario() {
        let venue = Arc::new(PaperVenue::new());
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut m = monitor(config(), venue.clone(), ScriptedFeed::prices(&[100.0, 105.0, 111.0]), sleeper);

        let report = m.run().await.unwrap().expect("bracket should resolve");
        assert_eq!(report.outcome, Outcome::TakeProfitHit);
        assert_eq!(report.samples, 3);
        assert_eq!(report.trigger_price, 111.0);

        let orders = venue.orders();
        assert_eq!(orders.len(), 4);
        assert_eq!(orders[0].request, OrderRequest::entry("AAPL", 10.0, None));
        assert_eq!(orders[1].request.kind, OrderKind::Limit { price: 110.0 });
        assert_eq!(orders[2].request.kind, OrderKind::Stop { stop_price: 90.0 });
        assert_eq!(orders[3].request, OrderRequest::market("AAPL", Side::Sell, 10.0));

        let sl_handle = orders[2].handle.clone();
        assert_eq!(venue.cancellations(), vec![sl_handle.clone()]);
        assert_eq!(report.cancelled_handle, Some(sl_handle));
        assert_eq!(report.close_handle, orders[3].handle);
        assert_eq!(m.state().close_handle.as_ref(), Some(&orders[3].handle));

        let state = m.state();
        assert_eq!(state.status, BracketStatus::Resolved(Outcome::TakeProfitHit));
        assert!(state.sl_handle.is_none());
        assert_eq!(state.tp_handle.as_ref(), Some(&orders[1].handle));
    }

    #[tokio::test]
    async fn stop_loss_scenario() {
        let venue = Arc::new(PaperVenue::new());
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut m = monitor(config(), venue.clone(), ScriptedFeed::prices(&[100.0, 95.0, 89.0]), sleeper);

        let report = m.run().await.unwrap().unwrap();
        assert_eq!(report.outcome, Outcome::StopLossHit);
        assert_eq!(report.samples, 3);

        let orders = venue.orders();
        assert_eq!(orders.len(), 4);
        assert_eq!(venue.cancellations(), vec![orders[1].handle.clone()]);
        assert!(m.state().tp_handle.is_none());
        assert!(m.state().sl_handle.is_some());
    }

    #[tokio::test]
    async fn feed_failure_terminates_before_resolution() {
        let venue = Arc::new(PaperVenue::new());
        let sleeper = Arc::new(RecordingSleeper::default());
        let feed = ScriptedFeed::ticks(vec![Tick::Price(100.0), Tick::Fail, Tick::Price(120.0)]);
        let mut m = monitor(config(), venue.clone(), feed, sleeper);

        let err = m.run().await.unwrap_err();
        assert!(matches!(
            err,
            BracketError::Venue {
                status: BracketStatus::ExitsPlaced,
                source: VenueError::QuoteUnavailable { .. },
            }
        ));
        assert_eq!(venue.orders().len(), 3);
        assert!(venue.cancellations().is_empty());
        assert_eq!(m.state().status, BracketStatus::ExitsPlaced);
    }

    #[tokio::test]
    async fn rejected_entry_is_fatal() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut m = BracketMonitor::new(
            config(),
            Arc::new(RejectingVenue),
            ScriptedFeed::prices(&[111.0]),
            sleeper.clone(),
            StopSignal::never(),
        )
        .unwrap();

        let err = m.run().await.unwrap_err();
        assert!(matches!(
            err,
            BracketError::Venue {
                status: BracketStatus::Initiated,
                source: VenueError::OrderRejected(_),
            }
        ));
        assert!(sleeper.waits.lock().is_empty());
    }

    #[tokio::test]
    async fn limit_entry_and_settle_delay() {
        let venue = Arc::new(PaperVenue::new());
        let sleeper = Arc::new(RecordingSleeper::default());
        let cfg = BracketConfig {
            entry_price: Some(100.0),
            settle_delay_secs: 1.0,
            ..config()
        };
        let mut m = monitor(cfg, venue.clone(), ScriptedFeed::prices(&[112.0]), sleeper.clone());

        m.run().await.unwrap();
        assert_eq!(venue.orders()[0].request.kind, OrderKind::Limit { price: 100.0 });

        let waits = sleeper.waits.lock().clone();
        assert_eq!(waits.len(), 2);
        assert_eq!(waits[0], Duration::from_secs(1));
    }

    #[tokio::test]
    async fn every_poll_wait_is_bounded() {
        let venue = Arc::new(PaperVenue::new());
        let sleeper = Arc::new(RecordingSleeper::default());
        let cfg = BracketConfig {
            poll_interval_secs: 2.0,
            jitter_secs: 4.0,
            ..config()
        };
        let mut prices = vec![100.0; 200];
        prices.push(111.0);
        let mut m = monitor(cfg, venue, ScriptedFeed::prices(&prices), sleeper.clone());

        let report = m.run().await.unwrap().unwrap();
        let waits = sleeper.waits.lock().clone();
        assert_eq!(waits.len() as u64, report.samples);
        for w in waits {
            let secs = w.as_secs_f64();
            assert!((1.0..=6.0 + 1e-9).contains(&secs), "wait {secs} out of bounds");
        }
    }

    #[tokio::test]
    async fn stop_signal_ends_polling_without_closing() {
        let venue = Arc::new(PaperVenue::new());
        let sleeper = Arc::new(RecordingSleeper::default());
        let (handle, signal) = StopSignal::channel();
        let mut m = BracketMonitor::new(
            config(),
            venue.clone(),
            ScriptedFeed::prices(&[100.0, 111.0]),
            sleeper,
            signal,
        )
        .unwrap();

        handle.stop();
        let result = m.run().await.unwrap();
        assert!(result.is_none());
        assert_eq!(venue.orders().len(), 3);
        assert!(venue.cancellations().is_empty());
        assert_eq!(m.state().status, BracketStatus::ExitsPlaced);
    }

    #[tokio::test]
    async fn stop_during_settle_delay_skips_exits() {
        let venue = Arc::new(PaperVenue::new());
        let sleeper = Arc::new(RecordingSleeper::default());
        let (handle, signal) = StopSignal::channel();
        let cfg = BracketConfig {
            settle_delay_secs: 1.0,
            ..config()
        };
        let mut m = BracketMonitor::new(
            cfg,
            venue.clone(),
            ScriptedFeed::prices(&[111.0]),
            sleeper.clone(),
            signal,
        )
        .unwrap();

        handle.stop();
        assert!(m.run().await.unwrap().is_none());
        assert_eq!(venue.orders().len(), 1);
        assert_eq!(m.state().status, BracketStatus::EntryPlaced);
        assert!(sleeper.waits.lock().is_empty());
    }

    #[tokio::test]
    async fn failed_cancel_keeps_close_handle() {
        let venue = Arc::new(StuckCancelVenue {
            inner: PaperVenue::new(),
        });
        let mut m = BracketMonitor::new(
            config(),
            venue.clone(),
            ScriptedFeed::prices(&[111.0]),
            Arc::new(RecordingSleeper::default()),
            StopSignal::never(),
        )
        .unwrap();

        let err = m.run().await.unwrap_err();
        assert!(matches!(
            err,
            BracketError::Venue {
                status: BracketStatus::ExitsPlaced,
                source: VenueError::OrderNotFound(_),
            }
        ));

        let orders = venue.inner.orders();
        assert_eq!(orders.len(), 4);
        assert_eq!(m.state().close_handle.as_ref(), Some(&orders[3].handle));
        assert!(m.state().sl_handle.is_some());
    }

    #[test]
    fn oversized_interval_rejected_before_any_order() {
        let venue = Arc::new(PaperVenue::new());
        let cfg = BracketConfig {
            poll_interval_secs: 1e20,
            jitter_secs: 0.0,
            ..config()
        };
        let result = BracketMonitor::new(
            cfg,
            venue.clone(),
            ScriptedFeed::prices(&[100.0]),
            Arc::new(RecordingSleeper::default()),
            StopSignal::never(),
        );
        assert!(matches!(result, Err(BracketError::InvalidConfig(_))));
        assert!(venue.orders().is_empty());
    }

    #[test]
    fn invalid_bracket_rejected_at_construction() {
        let cfg = BracketConfig {
            take_profit: 90.0,
            stop_loss: 110.0,
            ..config()
        };
        let result = BracketMonitor::new(
            cfg,
            Arc::new(PaperVenue::new()),
            ScriptedFeed::prices(&[]),
            Arc::new(RecordingSleeper::default()),
            StopSignal::never(),
        );
        assert!(matches!(result, Err(BracketError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn first_crossing_decides_outcome() {
        let mut rng = StdRng::seed_from_u64(2024);

        for _ in 0..200 {
            let len = rng.gen_range(1..40);
            let prices: Vec<f64> = (0..len).map(|_| rng.gen_range(80.0..120.0)).collect();

            let expected = prices.iter().find_map(|&p| {
                if p >= 110.0 {
                    Some(Outcome::TakeProfitHit)
                } else if p <= 90.0 {
                    Some(Outcome::StopLossHit)
                } else {
                    None
                }
            });

            let venue = Arc::new(PaperVenue::new());
            let mut m = monitor(
                config(),
                venue.clone(),
                ScriptedFeed::prices(&prices),
                Arc::new(RecordingSleeper::default()),
            );

            match (m.run().await, expected) {
                (Ok(Some(report)), Some(outcome)) => {
                    assert_eq!(report.outcome, outcome);
                    assert_eq!(venue.orders().len(), 4);
                    let orders = venue.orders();
                    let expected_cancel = match outcome {
                        Outcome::TakeProfitHit => orders[2].handle.clone(),
                        Outcome::StopLossHit => orders[1].handle.clone(),
                    };
                    assert_eq!(venue.cancellations(), vec![expected_cancel]);
                }
                // No crossing: the script runs dry and the feed reports it.
                (Err(BracketError::Venue { source: VenueError::QuoteUnavailable { .. }, .. }), None) => {
                    assert_eq!(venue.orders().len(), 3);
                }
                (other, expected) => panic!("unexpected result {other:?} for expected {expected:?}"),
            }
        }
    }
}
