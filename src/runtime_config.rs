// =============================================================================
// Runtime Configuration — bracket and crossover parameters
// =============================================================================
//
// Every tunable parameter of both trading loops lives here and is handed to
// the loop at construction. Nothing reads configuration from globals.
//
// The file format is JSON. All fields carry `#[serde(default)]` so that a
// partial file (or none at all) still deserialises; CLI flags are applied on
// top by `main`.
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::BracketError;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_poll_interval_secs() -> f64 {
    20.0
}

fn default_jitter_secs() -> f64 {
    5.0
}

fn default_settle_delay_secs() -> f64 {
    1.0
}

fn default_pair() -> String {
    "XETHZUSD".to_string()
}

fn default_volume() -> f64 {
    0.001
}

fn default_timeframe_minutes() -> u32 {
    1
}

fn default_short_period() -> usize {
    5
}

fn default_long_period() -> usize {
    20
}

fn default_sleep_interval_secs() -> u64 {
    60
}

// =============================================================================
// BracketConfig
// =============================================================================

/// Parameters of a single OCO bracket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BracketConfig {
    /// Ticker to trade, e.g. "AAPL".
    #[serde(default)]
    pub symbol: String,

    /// Shares bought on entry and sold on exit.
    #[serde(default)]
    pub quantity: f64,

    /// Limit price for the entry. `None` means market entry.
    #[serde(default)]
    pub entry_price: Option<f64>,

    /// Sell threshold above entry.
    #[serde(default)]
    pub take_profit: f64,

    /// Sell threshold below entry.
    #[serde(default)]
    pub stop_loss: f64,

    /// Nominal seconds between price checks.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: f64,

    /// Uniform ± jitter applied to every poll interval.
    #[serde(default = "default_jitter_secs")]
    pub jitter_secs: f64,

    /// Pause between the entry fill and placing the protective exits.
    #[serde(default = "default_settle_delay_secs")]
    pub settle_delay_secs: f64,

    /// Fixed RNG seed for the jitter. Unset in production.
    #[serde(default)]
    pub jitter_seed: Option<u64>,
}

impl Default for BracketConfig {
    fn default() -> Self {
        Self {
            symbol: String::new(),
            quantity: 0.0,
            entry_price: None,
            take_profit: 0.0,
            stop_loss: 0.0,
            poll_interval_secs: default_poll_interval_secs(),
            jitter_secs: default_jitter_secs(),
            settle_delay_secs: default_settle_delay_secs(),
            jitter_seed: None,
        }
    }
}

impl BracketConfig {
    /// Reject brackets that cannot be traded sensibly.
    ///
    /// Requires `stop_loss < take_profit`, and when an entry limit is given,
    /// `stop_loss < entry < take_profit`.
    pub fn validate(&self) -> Result<(), BracketError> {
        let invalid = |msg: String| Err(BracketError::InvalidConfig(msg));

        if self.symbol.trim().is_empty() {
            return invalid("symbol must not be empty".into());
        }
        if !(self.quantity.is_finite() && self.quantity > 0.0) {
            return invalid(format!("quantity must be positive, got {}", self.quantity));
        }
        for (name, value) in [("take_profit", self.take_profit), ("stop_loss", self.stop_loss)] {
            if !(value.is_finite() && value > 0.0) {
                return invalid(format!("{name} must be a positive price, got {value}"));
            }
        }
        if self.stop_loss >= self.take_profit {
            return invalid(format!(
                "stop_loss {} must be below take_profit {}",
                self.stop_loss, self.take_profit
            ));
        }
        if let Some(entry) = self.entry_price {
            if !(entry > self.stop_loss && entry < self.take_profit) {
                return invalid(format!(
                    "entry_price {} must lie between stop_loss {} and take_profit {}",
                    entry, self.stop_loss, self.take_profit
                ));
            }
        }
        if !(self.poll_interval_secs.is_finite() && self.poll_interval_secs > 0.0) {
            return invalid(format!(
                "poll_interval_secs must be positive, got {}",
                self.poll_interval_secs
            ));
        }
        if !(self.jitter_secs.is_finite() && self.jitter_secs >= 0.0) {
            return invalid(format!("jitter_secs must be >= 0, got {}", self.jitter_secs));
        }
        if !(self.settle_delay_secs.is_finite() && self.settle_delay_secs >= 0.0) {
            return invalid(format!(
                "settle_delay_secs must be >= 0, got {}",
                self.settle_delay_secs
            ));
        }
        // Longest possible poll wait and the settle delay must fit a Duration.
        if Duration::try_from_secs_f64(self.poll_interval_secs + self.jitter_secs).is_err() {
            return invalid(format!(
                "poll_interval_secs + jitter_secs is too large: {}",
                self.poll_interval_secs + self.jitter_secs
            ));
        }
        if Duration::try_from_secs_f64(self.settle_delay_secs).is_err() {
            return invalid(format!(
                "settle_delay_secs is too large: {}",
                self.settle_delay_secs
            ));
        }
        Ok(())
    }
}

// =============================================================================
// CrossoverConfig
// =============================================================================

/// Parameters of the moving-average crossover trader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossoverConfig {
    /// Kraken pair name.
    #[serde(default = "default_pair")]
    pub pair: String,

    /// Base-asset volume of every market order.
    #[serde(default = "default_volume")]
    pub volume: f64,

    /// OHLC candle width in minutes.
    #[serde(default = "default_timeframe_minutes")]
    pub timeframe_minutes: u32,

    #[serde(default = "default_short_period")]
    pub short_period: usize,

    #[serde(default = "default_long_period")]
    pub long_period: usize,

    /// Seconds between ticks.
    #[serde(default = "default_sleep_interval_secs")]
    pub sleep_interval_secs: u64,
}

impl Default for CrossoverConfig {
    fn default() -> Self {
        Self {
            pair: default_pair(),
            volume: default_volume(),
            timeframe_minutes: default_timeframe_minutes(),
            short_period: default_short_period(),
            long_period: default_long_period(),
            sleep_interval_secs: default_sleep_interval_secs(),
        }
    }
}

impl CrossoverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.pair.trim().is_empty() {
            anyhow::bail!("pair must not be empty");
        }
        if !(self.volume.is_finite() && self.volume > 0.0) {
            anyhow::bail!("volume must be positive, got {}", self.volume);
        }
        if self.short_period == 0 || self.short_period >= self.long_period {
            anyhow::bail!(
                "periods must satisfy 0 < short ({}) < long ({})",
                self.short_period,
                self.long_period
            );
        }
        if self.sleep_interval_secs == 0 {
            anyhow::bail!("sleep_interval_secs must be positive");
        }
        Ok(())
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub bracket: BracketConfig,

    #[serde(default)]
    pub crossover: CrossoverConfig,

    /// Per-request HTTP timeout. `None` waits for the remote side forever.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbol = %config.bracket.symbol,
            pair = %config.crossover.pair,
            "runtime config loaded"
        );

        Ok(config)
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn valid_bracket() -> BracketConfig {
        BracketConfig {
            symbol: "AAPL".into(),
            quantity: 1.0,
            take_profit: 110.0,
            stop_loss: 90.0,
            ..BracketConfig::default()
        }
    }

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert!((cfg.bracket.poll_interval_secs - 20.0).abs() < f64::EPSILON);
        assert!((cfg.bracket.jitter_secs - 5.0).abs() < f64::EPSILON);
        assert!(cfg.bracket.entry_price.is_none());
        assert_eq!(cfg.crossover.pair, "XETHZUSD");
        assert_eq!(cfg.crossover.short_period, 5);
        assert_eq!(cfg.crossover.long_period, 20);
        assert_eq!(cfg.crossover.sleep_interval_secs, 60);
        assert!(cfg.request_timeout_secs.is_none());
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "bracket": { "symbol": "MSFT", "quantity": 2, "take_profit": 420, "stop_loss": 380 } }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.bracket.symbol, "MSFT");
        assert!((cfg.bracket.poll_interval_secs - 20.0).abs() < f64::EPSILON);
        assert_eq!(cfg.crossover.volume, 0.001);
        assert!(cfg.bracket.validate().is_ok());
    }

    #[test]
    fn load_reads_file_from_disk() {
        let path = std::env::temp_dir().join(format!("oco-cfg-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{ "request_timeout_secs": 15 }"#).unwrap();
        let cfg = RuntimeConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(cfg.request_timeout_secs, Some(15));
    }

    #[test]
    fn load_missing_file_errors() {
        assert!(RuntimeConfig::load("/nonexistent/oco.json").is_err());
    }

    #[test]
    fn valid_bracket_passes() {
        assert!(valid_bracket().validate().is_ok());
        let with_entry = BracketConfig {
            entry_price: Some(100.0),
            ..valid_bracket()
        };
        assert!(with_entry.validate().is_ok());
    }

    #[test]
    fn inverted_bracket_rejected() {
        let cfg = BracketConfig {
            take_profit: 90.0,
            stop_loss: 110.0,
            ..valid_bracket()
        };
        assert!(matches!(cfg.validate(), Err(BracketError::InvalidConfig(_))));
    }

    #[test]
    fn entry_outside_bracket_rejected() {
        let cfg = BracketConfig {
            entry_price: Some(115.0),
            ..valid_bracket()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn negative_jitter_and_zero_quantity_rejected() {
        let cfg = BracketConfig {
            jitter_secs: -1.0,
            ..valid_bracket()
        };
        assert!(cfg.validate().is_err());
        let cfg = BracketConfig {
            quantity: 0.0,
            ..valid_bracket()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn waits_beyond_duration_range_rejected() {
        let cfg = BracketConfig {
            poll_interval_secs: 1e20,
            jitter_secs: 0.0,
            ..valid_bracket()
        };
        assert!(matches!(cfg.validate(), Err(BracketError::InvalidConfig(_))));

        let cfg = BracketConfig {
            poll_interval_secs: 1.8e19,
            jitter_secs: 1e19,
            ..valid_bracket()
        };
        assert!(cfg.validate().is_err());

        let cfg = BracketConfig {
            settle_delay_secs: 1e20,
            ..valid_bracket()
        };
        assert!(cfg.validate().is_err());

        let cfg = BracketConfig {
            poll_interval_secs: 86_400.0 * 365.0,
            ..valid_bracket()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn crossover_periods_validated() {
        let cfg = CrossoverConfig {
            short_period: 20,
            long_period: 5,
            ..CrossoverConfig::default()
        };
        assert!(cfg.validate().is_err());
        assert!(CrossoverConfig::default().validate().is_ok());
    }
}
