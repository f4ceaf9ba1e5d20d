use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::bollinger::bollinger_series;
use super::moving_average::ema_series;
use super::rsi::rsi_series;
use super::volume::average_volume_series;
use crate::models::CandleSeries;

/// Indicator windows
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndicatorConfig {
    pub fast_ema: usize,
    pub slow_ema: usize,
    pub rsi_period: usize,
    pub band_period: usize,
    /// Band width in standard deviations
    pub band_k: f64,
    pub volume_period: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            fast_ema: 9,
            slow_ema: 21,
            rsi_period: 14,
            band_period: 20,
            band_k: 2.0,
            volume_period: 20,
        }
    }
}

impl IndicatorConfig {
    /// Largest window any indicator needs before it produces a value
    ///
    /// RSI needs one extra price because it works on changes.
    pub fn warmup(&self) -> usize {
        self.fast_ema
            .max(self.slow_ema)
            .max(self.rsi_period + 1)
            .max(self.band_period)
            .max(self.volume_period)
    }

    /// Candles needed for both the current and the previous point to be defined
    pub fn min_candles(&self) -> usize {
        self.warmup() + 1
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.fast_ema == 0
            || self.slow_ema == 0
            || self.rsi_period == 0
            || self.band_period == 0
            || self.volume_period == 0
        {
            return Err("indicator periods must be positive".to_string());
        }
        if self.fast_ema >= self.slow_ema {
            return Err(format!(
                "fast_ema ({}) must be shorter than slow_ema ({})",
                self.fast_ema, self.slow_ema
            ));
        }
        if self.band_k.is_nan() || self.band_k <= 0.0 {
            return Err(format!("band_k must be positive, got {}", self.band_k));
        }
        Ok(())
    }
}

/// Indicator values at one candle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorPoint {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub close: f64,
    pub fast_ema: f64,
    pub slow_ema: f64,
    pub rsi: f64,
    pub band_upper: f64,
    pub band_middle: f64,
    pub band_lower: f64,
    pub volume: f64,
    pub volume_avg: f64,
}

/// Indicator state for the last two candles
///
/// Both points are `None` until the series is longer than the warm-up window.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IndicatorSnapshot {
    pub current: Option<IndicatorPoint>,
    pub previous: Option<IndicatorPoint>,
}

impl IndicatorSnapshot {
    pub fn undefined() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.current.is_some() && self.previous.is_some()
    }

    /// Both points, or `None` while warming up
    pub fn points(&self) -> Option<(&IndicatorPoint, &IndicatorPoint)> {
        Some((self.previous.as_ref()?, self.current.as_ref()?))
    }

    /// Latest close, if any candle has been seen
    pub fn last_close(&self) -> Option<f64> {
        self.current.map(|p| p.close)
    }
}

/// Compute the indicator snapshot for the last two candles of a series
pub fn compute_snapshot(series: &CandleSeries, config: &IndicatorConfig) -> IndicatorSnapshot {
    let len = series.len();
    if len <= config.warmup() {
        tracing::debug!(
            "Indicator warm-up not met for {}: {} candles, need more than {}",
            series.symbol(),
            len,
            config.warmup()
        );
        return IndicatorSnapshot::undefined();
    }

    let candles: Vec<_> = series.iter().collect();
    let closes = series.closes();
    let volumes = series.volumes();

    let fast = ema_series(&closes, config.fast_ema);
    let slow = ema_series(&closes, config.slow_ema);
    let rsi = rsi_series(&closes, config.rsi_period);
    let bands = bollinger_series(&closes, config.band_period, config.band_k);
    let volume_avg = average_volume_series(&volumes, config.volume_period);

    let point_at = |i: usize| -> Option<IndicatorPoint> {
        let candle = candles[i];
        let band = bands[i]?;
        Some(IndicatorPoint {
            timestamp: candle.timestamp,
            open: candle.open,
            close: candle.close,
            fast_ema: fast[i]?,
            slow_ema: slow[i]?,
            rsi: rsi[i]?,
            band_upper: band.upper,
            band_middle: band.middle,
            band_lower: band.lower,
            volume: candle.volume,
            volume_avg: volume_avg[i]?,
        })
    };

    let current = point_at(len - 1);
    let previous = point_at(len - 2);

    match (previous, current) {
        (Some(previous), Some(current)) => IndicatorSnapshot {
            current: Some(current),
            previous: Some(previous),
        },
        _ => IndicatorSnapshot::undefined(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Candle;
    use chrono::{Duration, TimeZone};

    fn series_from_closes(closes: &[f64]) -> CandleSeries {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                timestamp: start + Duration::minutes(15 * i as i64),
                open: close,
                high: close * 1.001,
                low: close * 0.999,
                close,
                volume: 1000.0 + i as f64,
            })
            .collect();
        CandleSeries::from_candles("BTC_USDT", candles, 200).unwrap()
    }

    #[test]
    fn test_warmup_is_largest_window() {
        let config = IndicatorConfig::default();
        assert_eq!(config.warmup(), 21);
        assert_eq!(config.min_candles(), 22);

        let config = IndicatorConfig {
            rsi_period: 30,
            ..Default::default()
        };
        assert_eq!(config.warmup(), 31);
    }

    #[test]
    fn test_short_series_is_undefined() {
        let config = IndicatorConfig::default();

        for len in [0, 1, 10, 21] {
            let closes: Vec<f64> = (0..len).map(|i| 100.0 + i as f64).collect();
            let snapshot = compute_snapshot(&series_from_closes(&closes), &config);
            assert!(!snapshot.is_ready(), "len {} should be undefined", len);
            assert!(snapshot.current.is_none());
            assert!(snapshot.previous.is_none());
        }
    }

    #[test]
    fn test_snapshot_defined_after_warmup() {
        let config = IndicatorConfig::default();
        let closes: Vec<f64> = (0..22).map(|i| 100.0 + (i % 5) as f64).collect();
        let snapshot = compute_snapshot(&series_from_closes(&closes), &config);

        assert!(snapshot.is_ready());
        let (previous, current) = snapshot.points().unwrap();
        assert_eq!(current.close, closes[21]);
        assert_eq!(previous.close, closes[20]);
        assert!(current.band_upper >= current.band_middle);
        assert!(current.band_lower <= current.band_middle);
        assert!((0.0..=100.0).contains(&current.rsi));
    }

    #[test]
    fn test_uptrend_orders_averages() {
        let config = IndicatorConfig::default();
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let snapshot = compute_snapshot(&series_from_closes(&closes), &config);

        let current = snapshot.current.unwrap();
        assert!(current.fast_ema > current.slow_ema);
        assert_eq!(current.rsi, 100.0);
    }

    #[test]
    fn test_validate_rejects_inverted_spans() {
        let config = IndicatorConfig {
            fast_ema: 30,
            slow_ema: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(IndicatorConfig::default().validate().is_ok());
    }
}
