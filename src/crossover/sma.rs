// =============================================================================
// Simple Moving Average (SMA) and the crossover rule
// =============================================================================
//
//   SMA_t = (close_{t-period+1} + ... + close_t) / period
//
// Signal from the latest values of a short and a long SMA:
//   short > long  → Buy
//   short < long  → Sell
//   equal, or not enough closes for the long SMA → Hold
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Hold => write!(f, "HOLD"),
        }
    }
}

/// Compute the rolling SMA series for `values` and look-back `period`.
///
/// Returns an empty `Vec` when `period == 0` or the input is shorter than
/// `period`. Output element `i` corresponds to input index `i + period - 1`.
pub fn calculate_sma(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(values.len() - period + 1);
    let mut window_sum: f64 = values[..period].iter().sum();
    result.push(window_sum / period as f64);

    for i in period..values.len() {
        window_sum += values[i] - values[i - period];
        result.push(window_sum / period as f64);
    }

    result
}

/// Latest SMA value, if there is one and it is finite.
pub fn last_sma(values: &[f64], period: usize) -> Option<f64> {
    calculate_sma(values, period)
        .last()
        .copied()
        .filter(|v| v.is_finite())
}

/// Crossover rule on the latest short and long SMA.
pub fn crossover_signal(closes: &[f64], short_period: usize, long_period: usize) -> Signal {
    let (Some(short), Some(long)) = (last_sma(closes, short_period), last_sma(closes, long_period)) else {
        return Signal::Hold;
    };

    if short > long {
        Signal::Buy
    } else if short < long {
        Signal::Sell
    } else {
        Signal::Hold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ascending(n: usize) -> Vec<f64> {
        (1..=n).map(|i| i as f64).collect()
    }

    #[test]
    fn sma_empty_and_degenerate() {
        assert!(calculate_sma(&[], 3).is_empty());
        assert!(calculate_sma(&[1.0, 2.0], 0).is_empty());
        assert!(calculate_sma(&[1.0, 2.0], 3).is_empty());
    }

    #[test]
    fn sma_rolling_values() {
        let sma = calculate_sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_eq!(sma, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn last_sma_matches_series_tail() {
        let closes = ascending(30);
        let series = calculate_sma(&closes, 7);
        let last = last_sma(&closes, 7).unwrap();
        assert!((series.last().unwrap() - last).abs() < 1e-9);
    }

    #[test]
    fn rising_prices_buy() {
        assert_eq!(crossover_signal(&ascending(25), 5, 20), Signal::Buy);
    }

    #[test]
    fn falling_prices_sell() {
        let mut closes = ascending(25);
        closes.reverse();
        assert_eq!(crossover_signal(&closes, 5, 20), Signal::Sell);
    }

    #[test]
    fn flat_prices_hold() {
        assert_eq!(crossover_signal(&[50.0; 25], 5, 20), Signal::Hold);
    }

    #[test]
    fn insufficient_data_holds() {
        assert_eq!(crossover_signal(&ascending(10), 5, 20), Signal::Hold);
    }
}
