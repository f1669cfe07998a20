// =============================================================================
// Moving-Average Crossover Module
// =============================================================================
//
// Polls exchange candles and trades a short/long SMA crossover at market.

pub mod sma;
pub mod trader;
