use serde::Deserialize;

use super::scored::score_point;
use super::Strategy;
use crate::indicators::{IndicatorPoint, IndicatorSnapshot};
use crate::models::{PositionState, Side, Signal, SignalKind};

/// How entry signals are derived from indicators
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DecisionMode {
    /// Trend filter AND oscillator extreme AND band breach, no partial credit
    #[default]
    Threshold,
    /// Weighted sub-conditions summed against `score_threshold`
    Scored,
    /// Previous candle closed outside the band, current RSI not exhausted
    Breakout,
}

/// Configuration for signal generation
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SignalConfig {
    pub mode: DecisionMode,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub rsi_deep_oversold: f64,
    pub rsi_deep_overbought: f64,
    /// Absolute score needed to enter in scored mode
    pub score_threshold: i32,
    /// Multiple of average volume that counts as confirmation
    pub volume_multiplier: f64,
    /// RSI above which an open long is closed
    pub exit_rsi_long: f64,
    /// RSI below which an open short is closed
    pub exit_rsi_short: f64,
    /// Close a long when price crosses under the fast EMA (short: crosses above)
    pub exit_on_fast_ema: bool,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            mode: DecisionMode::Threshold,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            rsi_deep_oversold: 20.0,
            rsi_deep_overbought: 80.0,
            score_threshold: 3,
            volume_multiplier: 1.5,
            exit_rsi_long: 80.0,
            exit_rsi_short: 20.0,
            exit_on_fast_ema: true,
        }
    }
}

impl SignalConfig {
    pub fn validate(&self) -> Result<(), String> {
        let ordered = 0.0 <= self.rsi_deep_oversold
            && self.rsi_deep_oversold <= self.rsi_oversold
            && self.rsi_oversold < self.rsi_overbought
            && self.rsi_overbought <= self.rsi_deep_overbought
            && self.rsi_deep_overbought <= 100.0;
        if !ordered {
            return Err(format!(
                "RSI levels must satisfy 0 <= deep_oversold ({}) <= oversold ({}) < overbought ({}) <= deep_overbought ({}) <= 100",
                self.rsi_deep_oversold,
                self.rsi_oversold,
                self.rsi_overbought,
                self.rsi_deep_overbought
            ));
        }
        if self.score_threshold <= 0 {
            return Err(format!(
                "score_threshold must be positive, got {}",
                self.score_threshold
            ));
        }
        Ok(())
    }
}

/// Pure signal evaluator over an indicator snapshot
#[derive(Debug, Clone, Default)]
pub struct SignalEvaluator {
    config: SignalConfig,
}

impl SignalEvaluator {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    /// Entry decision for a flat book
    pub fn evaluate_entry(&self, previous: &IndicatorPoint, current: &IndicatorPoint) -> Signal {
        let price = current.close;
        match self.config.mode {
            DecisionMode::Threshold => self.threshold_entry(current),
            DecisionMode::Breakout => self.breakout_entry(previous, current),
            DecisionMode::Scored => {
                let score = score_point(current, &self.config);
                let total = score.total();

                tracing::debug!(
                    "Score: trend={} osc={} band={} confirm={} total={} (threshold ±{})",
                    score.trend,
                    score.oscillator,
                    score.band,
                    score.confirmation,
                    total,
                    self.config.score_threshold
                );

                let kind = if total >= self.config.score_threshold {
                    SignalKind::EnterLong
                } else if total <= -self.config.score_threshold {
                    SignalKind::EnterShort
                } else {
                    SignalKind::Hold
                };
                Signal::new(kind, price).with_score(total)
            }
        }
    }

    /// Exit decision for an open position
    ///
    /// Oscillator exhaustion and fast-EMA reversal apply in every mode; scored mode
    /// also exits when the score returns to zero or flips against the position.
    /// A reversal is a close crossing the fast EMA between the two points while
    /// back inside the band, so the breach that opened the trade never closes it.
    pub fn evaluate_exit(
        &self,
        previous: &IndicatorPoint,
        current: &IndicatorPoint,
        side: Side,
    ) -> Signal {
        let price = current.close;
        let exit_kind = match side {
            Side::Long => SignalKind::ExitLong,
            Side::Short => SignalKind::ExitShort,
        };

        let exhausted = match side {
            Side::Long => current.rsi > self.config.exit_rsi_long,
            Side::Short => current.rsi < self.config.exit_rsi_short,
        };
        let reversed = self.config.exit_on_fast_ema
            && match side {
                Side::Long => {
                    previous.close >= previous.fast_ema
                        && current.close < current.fast_ema
                        && current.close >= current.band_lower
                }
                Side::Short => {
                    previous.close <= previous.fast_ema
                        && current.close > current.fast_ema
                        && current.close <= current.band_upper
                }
            };

        let score = (self.config.mode == DecisionMode::Scored)
            .then(|| score_point(current, &self.config).total());
        let score_faded = match (score, side) {
            (Some(total), Side::Long) => total <= 0,
            (Some(total), Side::Short) => total >= 0,
            (None, _) => false,
        };

        if exhausted || reversed || score_faded {
            tracing::info!(
                "EXIT {}: rsi={:.1} exhausted={} close={:.2} fast_ema={:.2} reversed={} score={:?}",
                side,
                current.rsi,
                exhausted,
                current.close,
                current.fast_ema,
                reversed,
                score
            );
            let signal = Signal::new(exit_kind, price);
            return match score {
                Some(total) => signal.with_score(total),
                None => signal,
            };
        }

        match score {
            Some(total) => Signal::hold(price).with_score(total),
            None => Signal::hold(price),
        }
    }

    fn threshold_entry(&self, current: &IndicatorPoint) -> Signal {
        let price = current.close;

        let long_conditions = [
            current.fast_ema > current.slow_ema,
            current.rsi < self.config.rsi_oversold,
            current.close < current.band_lower,
        ];
        let short_conditions = [
            current.fast_ema < current.slow_ema,
            current.rsi > self.config.rsi_overbought,
            current.close > current.band_upper,
        ];

        tracing::debug!(
            "Threshold check: LONG trend={} rsi<{}={} below_band={} | SHORT trend={} rsi>{}={} above_band={}",
            long_conditions[0],
            self.config.rsi_oversold,
            long_conditions[1],
            long_conditions[2],
            short_conditions[0],
            self.config.rsi_overbought,
            short_conditions[1],
            short_conditions[2]
        );

        if long_conditions.iter().all(|&x| x) {
            tracing::info!(
                "ENTER LONG: close {:.2} under lower band {:.2}, RSI {:.1}, fast EMA {:.2} > slow {:.2}",
                current.close,
                current.band_lower,
                current.rsi,
                current.fast_ema,
                current.slow_ema
            );
            Signal::new(SignalKind::EnterLong, price)
        } else if short_conditions.iter().all(|&x| x) {
            tracing::info!(
                "ENTER SHORT: close {:.2} over upper band {:.2}, RSI {:.1}, fast EMA {:.2} < slow {:.2}",
                current.close,
                current.band_upper,
                current.rsi,
                current.fast_ema,
                current.slow_ema
            );
            Signal::new(SignalKind::EnterShort, price)
        } else {
            Signal::hold(price)
        }
    }

    fn breakout_entry(&self, previous: &IndicatorPoint, current: &IndicatorPoint) -> Signal {
        let price = current.close;

        if previous.close > previous.band_upper && current.rsi < self.config.rsi_overbought {
            tracing::info!(
                "BREAKOUT LONG: previous close {:.2} > upper band {:.2}, RSI {:.1}",
                previous.close,
                previous.band_upper,
                current.rsi
            );
            Signal::new(SignalKind::EnterLong, price)
        } else if previous.close < previous.band_lower && current.rsi > self.config.rsi_oversold {
            tracing::info!(
                "BREAKOUT SHORT: previous close {:.2} < lower band {:.2}, RSI {:.1}",
                previous.close,
                previous.band_lower,
                current.rsi
            );
            Signal::new(SignalKind::EnterShort, price)
        } else {
            Signal::hold(price)
        }
    }
}

impl Strategy for SignalEvaluator {
    fn evaluate(&self, snapshot: &IndicatorSnapshot, position: &PositionState) -> Signal {
        let Some((previous, current)) = snapshot.points() else {
            tracing::debug!("HOLD: indicators not yet defined");
            return Signal::hold(snapshot.last_close().unwrap_or(0.0));
        };

        match position.side() {
            Some(side) => self.evaluate_exit(previous, current, side),
            None => self.evaluate_entry(previous, current),
        }
    }

    fn name(&self) -> &str {
        match self.config.mode {
            DecisionMode::Threshold => "Threshold",
            DecisionMode::Scored => "Scored",
            DecisionMode::Breakout => "Breakout",
        }
    }
}
