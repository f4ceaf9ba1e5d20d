use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::models::{Candle, Timeframe};

/// Price path shapes for the paper feed
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MarketScenario {
    /// Drift up with small noise
    Uptrend,
    /// Drift down with small noise
    Downtrend,
    /// Mean-reverting chop around the start price
    #[default]
    Sideways,
    /// ±3% swings per candle
    Volatile,
    /// Every 50th candle is missing
    WithGaps,
}

/// Seeded OHLCV generator backing the paper exchange
pub struct SyntheticDataGenerator {
    rng: StdRng,
    scenario: MarketScenario,
    anchor_price: f64,
    base_volume: f64,
    /// Candles produced so far, drives the gap pattern
    produced: usize,
}

impl SyntheticDataGenerator {
    pub fn new(seed: u64, scenario: MarketScenario, anchor_price: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            scenario,
            anchor_price,
            base_volume: 1_000.0,
            produced: 0,
        }
    }

    /// `count` consecutive candles ending at `end`, oldest first
    pub fn history(&mut self, timeframe: Timeframe, count: usize, end: DateTime<Utc>) -> Vec<Candle> {
        let step = Duration::seconds(timeframe.seconds());
        let mut timestamp = end - step * count as i32;
        let mut price = self.anchor_price;
        let mut candles = Vec::with_capacity(count);

        for _ in 0..count {
            timestamp += step;
            if let Some(candle) = self.advance(price, timestamp) {
                price = candle.close;
                candles.push(candle);
            }
        }

        candles
    }

    /// Candle opening at `price` and stamped `timestamp`, or None for a skipped slot
    pub fn advance(&mut self, price: f64, timestamp: DateTime<Utc>) -> Option<Candle> {
        self.produced += 1;
        if self.scenario == MarketScenario::WithGaps && self.produced % 50 == 0 {
            return None;
        }

        let close = self.step_price(price).max(self.anchor_price * 0.2);
        Some(self.create_candle(price, close, timestamp))
    }

    fn step_price(&mut self, price: f64) -> f64 {
        match self.scenario {
            MarketScenario::Uptrend => price * (1.0 + 0.002 + self.rng.gen_range(-0.001..0.001)),
            MarketScenario::Downtrend => price * (1.0 - 0.002 + self.rng.gen_range(-0.001..0.001)),
            MarketScenario::Sideways | MarketScenario::WithGaps => {
                // 10% pull back to the anchor
                let reversion = (self.anchor_price - price) * 0.1;
                price + reversion + price * self.rng.gen_range(-0.01..0.01)
            }
            MarketScenario::Volatile => price * (1.0 + self.rng.gen_range(-0.03..0.03)),
        }
    }

    fn create_candle(&mut self, open: f64, close: f64, timestamp: DateTime<Utc>) -> Candle {
        // ±0.2% wicks beyond the body
        let wick = 0.002;
        let high = open.max(close) * (1.0 + self.rng.gen_range(0.0..wick));
        let low = open.min(close) * (1.0 - self.rng.gen_range(0.0..wick));
        let volume = self.base_volume * self.rng.gen_range(0.7..1.3);

        Candle {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}
