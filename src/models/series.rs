use std::collections::VecDeque;

use super::Candle;
use crate::error::BotError;

/// Bounded, time-ordered window of candles for one symbol
///
/// Most recent candle last. Pushing past capacity evicts the oldest candle.
/// Timestamps are strictly increasing.
#[derive(Debug, Clone)]
pub struct CandleSeries {
    symbol: String,
    candles: VecDeque<Candle>,
    max_candles: usize,
}

impl CandleSeries {
    /// Create an empty series
    ///
    /// # Arguments
    /// * `max_candles` - Maximum number of candles to keep
    pub fn new(symbol: impl Into<String>, max_candles: usize) -> Self {
        Self {
            symbol: symbol.into(),
            candles: VecDeque::with_capacity(max_candles),
            max_candles: max_candles.max(1),
        }
    }

    /// Build a series from fetched candles, keeping the newest `max_candles`
    ///
    /// Fails if timestamps are not strictly increasing.
    pub fn from_candles(
        symbol: impl Into<String>,
        candles: Vec<Candle>,
        max_candles: usize,
    ) -> Result<Self, BotError> {
        let mut series = Self::new(symbol, max_candles);
        for candle in candles {
            series.push(candle)?;
        }
        Ok(series)
    }

    /// Append a candle
    ///
    /// If the series is full, removes the oldest candle
    pub fn push(&mut self, candle: Candle) -> Result<(), BotError> {
        if let Some(last) = self.candles.back() {
            if candle.timestamp <= last.timestamp {
                return Err(BotError::MarketData(format!(
                    "{}: candle at {} is not after {}",
                    self.symbol,
                    candle.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    last.timestamp.format("%Y-%m-%d %H:%M:%S")
                )));
            }
        }

        self.candles.push_back(candle);

        while self.candles.len() > self.max_candles {
            self.candles.pop_front();
        }

        Ok(())
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candle> {
        self.candles.iter()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.volume).collect()
    }

    /// Count of spacings wider than 1.5x the expected interval
    ///
    /// Gaps do not invalidate the series, they only make indicators less reliable.
    pub fn count_gaps(&self, expected_interval_secs: i64) -> usize {
        let max_gap_secs = expected_interval_secs + expected_interval_secs / 2;

        self.candles
            .iter()
            .zip(self.candles.iter().skip(1))
            .filter(|(a, b)| (b.timestamp - a.timestamp).num_seconds() > max_gap_secs)
            .count()
    }
}
