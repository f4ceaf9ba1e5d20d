use super::signals::SignalConfig;
use crate::indicators::{is_volume_spike, IndicatorPoint};

/// Signed contribution of each sub-condition to the entry score
///
/// Positive values favour a long, negative values a short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScoreBreakdown {
    pub trend: i32,
    pub oscillator: i32,
    pub band: i32,
    pub confirmation: i32,
}

impl ScoreBreakdown {
    pub fn total(&self) -> i32 {
        self.trend + self.oscillator + self.band + self.confirmation
    }
}

/// Score one indicator point
///
/// - trend: fast above slow +1, below -1
/// - oscillator: deep oversold +2, oversold +1, overbought -1, deep overbought -2
/// - band breach: close under the lower band +2, over the upper band -2
/// - confirmation: volume spike in the direction of the candle body ±1
pub fn score_point(point: &IndicatorPoint, config: &SignalConfig) -> ScoreBreakdown {
    let trend = if point.fast_ema > point.slow_ema {
        1
    } else if point.fast_ema < point.slow_ema {
        -1
    } else {
        0
    };

    let oscillator = if point.rsi < config.rsi_deep_oversold {
        2
    } else if point.rsi < config.rsi_oversold {
        1
    } else if point.rsi > config.rsi_deep_overbought {
        -2
    } else if point.rsi > config.rsi_overbought {
        -1
    } else {
        0
    };

    let band = if point.close < point.band_lower {
        2
    } else if point.close > point.band_upper {
        -2
    } else {
        0
    };

    let confirmation = if is_volume_spike(point.volume, point.volume_avg, config.volume_multiplier) {
        if point.close >= point.open {
            1
        } else {
            -1
        }
    } else {
        0
    };

    ScoreBreakdown {
        trend,
        oscillator,
        band,
        confirmation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn neutral_point() -> IndicatorPoint {
        IndicatorPoint {
            timestamp: Utc::now(),
            open: 100.0,
            close: 100.0,
            fast_ema: 100.0,
            slow_ema: 100.0,
            rsi: 50.0,
            band_upper: 105.0,
            band_middle: 100.0,
            band_lower: 95.0,
            volume: 1000.0,
            volume_avg: 1000.0,
        }
    }

    #[test]
    fn test_neutral_point_scores_zero() {
        let score = score_point(&neutral_point(), &SignalConfig::default());
        assert_eq!(score, ScoreBreakdown::default());
        assert_eq!(score.total(), 0);
    }

    #[test]
    fn test_bullish_components() {
        let point = IndicatorPoint {
            open: 92.0,
            close: 94.0,
            fast_ema: 101.0,
            rsi: 18.0,
            volume: 5000.0,
            ..neutral_point()
        };
        let score = score_point(&point, &SignalConfig::default());

        assert_eq!(score.trend, 1);
        assert_eq!(score.oscillator, 2);
        assert_eq!(score.band, 2);
        assert_eq!(score.confirmation, 1);
        assert_eq!(score.total(), 6);
    }

    #[test]
    fn test_bearish_components() {
        let point = IndicatorPoint {
            open: 107.0,
            close: 106.0,
            fast_ema: 99.0,
            rsi: 75.0,
            volume: 5000.0,
            ..neutral_point()
        };
        let score = score_point(&point, &SignalConfig::default());

        assert_eq!(score.trend, -1);
        assert_eq!(score.oscillator, -1);
        assert_eq!(score.band, -2);
        assert_eq!(score.confirmation, -1);
        assert_eq!(score.total(), -5);
    }
}
