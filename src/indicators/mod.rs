// Technical indicators module
// EMA pair, Bollinger bands, Wilder RSI and volume average over a candle series

pub mod bollinger;
pub mod moving_average;
pub mod rsi;
pub mod snapshot;
pub mod volume;

pub use bollinger::{bollinger_series, calculate_bollinger, BollingerBands};
pub use moving_average::{calculate_ema, calculate_sma, ema_series, sma_series};
pub use rsi::{calculate_rsi, rsi_series};
pub use snapshot::{compute_snapshot, IndicatorConfig, IndicatorPoint, IndicatorSnapshot};
pub use volume::{average_volume_series, is_volume_spike};
