// =============================================================================
// OCO Bracket — Main Entry Point
// =============================================================================
//
// Two independent loops share this binary:
//   oco        entry + take-profit/stop-loss bracket on a brokerage account
//   crossover  SMA crossover trading on a crypto exchange
//
// `--paper` routes orders to the in-process simulated venue. Ctrl-C raises the
// stop signal and each loop ends at its next sleep; a second Ctrl-C exits the
// process at once, even while a request is in flight.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod bracket;
mod clock;
mod crossover;
mod error;
mod runtime_config;
mod types;
mod venue;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::bracket::monitor::BracketMonitor;
use crate::clock::{StopSignal, TokioSleeper};
use crate::crossover::trader::CrossoverTrader;
use crate::runtime_config::{BracketConfig, CrossoverConfig, RuntimeConfig};
use crate::types::Credentials;
use crate::venue::alpha_vantage::AlphaVantageFeed;
use crate::venue::kraken::KrakenClient;
use crate::venue::paper::PaperVenue;
use crate::venue::robinhood::RobinhoodClient;
use crate::venue::{Authenticator, ExecutionVenue};

#[derive(Parser)]
#[command(
    name = "oco-bracket",
    about = "OCO bracket monitor and SMA crossover trader"
)]
struct Cli {
    /// JSON runtime config. Command-line flags take precedence over it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Per-request HTTP timeout in seconds. Unset waits indefinitely.
    #[arg(long, global = true)]
    request_timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Place an entry with take-profit and stop-loss exits, then monitor until
    /// one side is hit.
    Oco(OcoArgs),
    /// Trade a short/long SMA crossover on Kraken.
    Crossover(CrossoverArgs),
}

#[derive(Args)]
struct OcoArgs {
    #[arg(long, env = "ROBINHOOD_USERNAME")]
    username: String,

    #[arg(long, env = "ROBINHOOD_PASSWORD", hide_env_values = true)]
    password: String,

    /// MFA code if enabled on the account.
    #[arg(long, env = "ROBINHOOD_MFA", hide_env_values = true)]
    mfa: Option<String>,

    #[arg(long)]
    symbol: Option<String>,

    #[arg(long)]
    quantity: Option<f64>,

    /// Limit price for the entry; omit for a market entry.
    #[arg(long)]
    entry_price: Option<f64>,

    #[arg(long)]
    take_profit: Option<f64>,

    #[arg(long)]
    stop_loss: Option<f64>,

    /// Polling interval in seconds (default 20).
    #[arg(long)]
    interval: Option<f64>,

    /// Random jitter ± seconds (default 5).
    #[arg(long)]
    jitter: Option<f64>,

    /// Alpha Vantage API key for live pricing.
    #[arg(long, env = "ALPHA_VANTAGE_KEY", hide_env_values = true)]
    av_key: String,

    /// Simulate orders instead of sending them to the brokerage.
    #[arg(long, default_value_t = false)]
    paper: bool,
}

impl OcoArgs {
    fn apply(&self, cfg: &mut BracketConfig) {
        if let Some(symbol) = &self.symbol {
            cfg.symbol = symbol.trim().to_uppercase();
        }
        if let Some(q) = self.quantity {
            cfg.quantity = q;
        }
        if self.entry_price.is_some() {
            cfg.entry_price = self.entry_price;
        }
        if let Some(tp) = self.take_profit {
            cfg.take_profit = tp;
        }
        if let Some(sl) = self.stop_loss {
            cfg.stop_loss = sl;
        }
        if let Some(i) = self.interval {
            cfg.poll_interval_secs = i;
        }
        if let Some(j) = self.jitter {
            cfg.jitter_secs = j;
        }
    }

    fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
            mfa_code: self.mfa.clone(),
        }
    }
}

#[derive(Args)]
struct CrossoverArgs {
    /// Kraken pair, e.g. XETHZUSD.
    #[arg(long)]
    pair: Option<String>,

    /// Order volume in the base asset.
    #[arg(long)]
    volume: Option<f64>,

    /// Candle width in minutes.
    #[arg(long)]
    timeframe: Option<u32>,

    #[arg(long)]
    short_period: Option<usize>,

    #[arg(long)]
    long_period: Option<usize>,

    /// Seconds between ticks.
    #[arg(long)]
    sleep: Option<u64>,

    #[arg(long, env = "KRAKEN_API_KEY", default_value = "", hide_env_values = true)]
    api_key: String,

    #[arg(long, env = "KRAKEN_PRIVATE_KEY", default_value = "", hide_env_values = true)]
    private_key: String,

    /// Simulate orders instead of sending them to Kraken.
    #[arg(long, default_value_t = false)]
    paper: bool,
}

impl CrossoverArgs {
    fn apply(&self, cfg: &mut CrossoverConfig) {
        if let Some(pair) = &self.pair {
            cfg.pair = pair.trim().to_uppercase();
        }
        if let Some(v) = self.volume {
            cfg.volume = v;
        }
        if let Some(t) = self.timeframe {
            cfg.timeframe_minutes = t;
        }
        if let Some(s) = self.short_period {
            cfg.short_period = s;
        }
        if let Some(l) = self.long_period {
            cfg.long_period = l;
        }
        if let Some(s) = self.sleep {
            cfg.sleep_interval_secs = s;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Environment, logging & config ─────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RuntimeConfig::load(path)?,
        None => RuntimeConfig::default(),
    };
    if cli.request_timeout.is_some() {
        config.request_timeout_secs = cli.request_timeout;
    }
    let timeout = config.request_timeout_secs.map(Duration::from_secs);

    // ── 2. Stop signal on Ctrl-C ─────────────────────────────────────────
    let (stop_handle, stop_signal) = StopSignal::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Shutdown signal received, stopping at next sleep (Ctrl-C again to exit now)");
        stop_handle.stop();

        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Second shutdown signal received, exiting immediately");
            std::process::exit(130);
        }
    });

    // ── 3. Run the selected loop ─────────────────────────────────────────
    match cli.command {
        Commands::Oco(args) => run_oco(args, config, timeout, stop_signal).await,
        Commands::Crossover(args) => run_crossover(args, config, timeout, stop_signal).await,
    }
}

async fn run_oco(
    args: OcoArgs,
    mut config: RuntimeConfig,
    timeout: Option<Duration>,
    stop: StopSignal,
) -> Result<()> {
    args.apply(&mut config.bracket);
    config.bracket.validate()?;

    let feed = Arc::new(AlphaVantageFeed::new(args.av_key.clone(), timeout)?);

    let auth: Arc<dyn Authenticator>;
    let venue: Arc<dyn ExecutionVenue>;
    let mut paper_book = None;
    if args.paper {
        let paper = Arc::new(PaperVenue::new());
        auth = paper.clone();
        venue = paper.clone();
        paper_book = Some(paper);
    } else {
        let client = Arc::new(RobinhoodClient::new(timeout)?);
        auth = client.clone();
        venue = client;
    }

    auth.login(&args.credentials())
        .await
        .context("login failed")?;
    info!(paper = args.paper, "Logged in successfully");

    let mut monitor = BracketMonitor::new(
        config.bracket,
        venue,
        feed,
        Arc::new(TokioSleeper),
        stop,
    )?;

    match monitor.run().await? {
        Some(report) => info!(
            outcome = %report.outcome,
            trigger_price = report.trigger_price,
            samples = report.samples,
            close_order = %report.close_handle,
            cancelled_order = ?report.cancelled_handle,
            "bracket resolved"
        ),
        None => warn!(state = ?monitor.state(), "bracket stopped before resolution"),
    }

    if let Some(paper) = paper_book {
        let orders = paper.orders();
        for order in &orders {
            info!(order_id = %order.handle, order = %order.request, status = ?order.status, "paper order");
        }
        info!(
            orders = orders.len(),
            cancellations = paper.cancellations().len(),
            "paper session summary"
        );
    }
    Ok(())
}

async fn run_crossover(
    args: CrossoverArgs,
    mut config: RuntimeConfig,
    timeout: Option<Duration>,
    stop: StopSignal,
) -> Result<()> {
    args.apply(&mut config.crossover);

    if !args.paper && (args.api_key.is_empty() || args.private_key.is_empty()) {
        anyhow::bail!("KRAKEN_API_KEY and KRAKEN_PRIVATE_KEY are required without --paper");
    }

    let kraken = Arc::new(KrakenClient::new(
        args.api_key.clone(),
        args.private_key.clone(),
        timeout,
    )?);
    let venue: Arc<dyn ExecutionVenue> = if args.paper {
        Arc::new(PaperVenue::new())
    } else {
        kraken.clone()
    };

    info!(paper = args.paper, "Starting trading bot...");
    let trader = CrossoverTrader::new(
        config.crossover,
        kraken,
        venue,
        Arc::new(TokioSleeper),
        stop,
    )?;
    let stats = trader.run().await;
    info!(?stats, "Bot stopped by user");
    Ok(())
}
