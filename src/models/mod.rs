use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod series;

pub use series::CandleSeries;

/// OHLCV candlestick
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Candle interval
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    Min1,
    #[serde(rename = "5m")]
    Min5,
    #[serde(rename = "15m")]
    Min15,
    #[serde(rename = "30m")]
    Min30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "1d")]
    Day1,
}

impl Timeframe {
    pub fn seconds(&self) -> i64 {
        match self {
            Timeframe::Min1 => 60,
            Timeframe::Min5 => 300,
            Timeframe::Min15 => 900,
            Timeframe::Min30 => 1_800,
            Timeframe::Hour1 => 3_600,
            Timeframe::Hour4 => 14_400,
            Timeframe::Day1 => 86_400,
        }
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1m" => Ok(Timeframe::Min1),
            "5m" => Ok(Timeframe::Min5),
            "15m" => Ok(Timeframe::Min15),
            "30m" => Ok(Timeframe::Min30),
            "1h" => Ok(Timeframe::Hour1),
            "4h" => Ok(Timeframe::Hour4),
            "1d" => Ok(Timeframe::Day1),
            other => Err(format!("unknown timeframe '{}'", other)),
        }
    }
}

/// Direction of a position or order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// +1 for long, -1 for short
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Whether collateral is ring-fenced per position or shared account-wide
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MarginMode {
    #[default]
    Isolated,
    Cross,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SignalKind {
    EnterLong,
    EnterShort,
    ExitLong,
    ExitShort,
    Hold,
}

impl SignalKind {
    /// Side a position would be opened on, for entry signals
    pub fn entry_side(&self) -> Option<Side> {
        match self {
            SignalKind::EnterLong => Some(Side::Long),
            SignalKind::EnterShort => Some(Side::Short),
            _ => None,
        }
    }

    /// Side of the position being closed, for exit signals
    pub fn exit_side(&self) -> Option<Side> {
        match self {
            SignalKind::ExitLong => Some(Side::Long),
            SignalKind::ExitShort => Some(Side::Short),
            _ => None,
        }
    }
}

/// Trading signal with its reference price and, in scored mode, the score behind it
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    pub kind: SignalKind,
    pub price: f64,
    pub score: Option<i32>,
}

impl Signal {
    pub fn new(kind: SignalKind, price: f64) -> Self {
        Self {
            kind,
            price,
            score: None,
        }
    }

    pub fn hold(price: f64) -> Self {
        Self::new(SignalKind::Hold, price)
    }

    pub fn with_score(mut self, score: i32) -> Self {
        self.score = Some(score);
        self
    }

    pub fn is_hold(&self) -> bool {
        self.kind == SignalKind::Hold
    }
}

/// Open position as reported by the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub side: Side,
    pub entry_price: f64,
    /// Size in exchange order units (contracts), always positive
    pub contract_qty: f64,
    /// 0 when the exchange did not report it
    pub leverage: u32,
    pub margin_mode: MarginMode,
    pub unrealized_pnl: f64,
    pub percentage: f64,
}

impl OpenPosition {
    /// Fractional price move in the position's favour (0.01 = +1%)
    pub fn price_move_pct(&self, current_price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        self.side.sign() * (current_price - self.entry_price) / self.entry_price
    }
}

/// Local mirror of the exchange position for the traded symbol.
///
/// Rebuilt from exchange data every cycle, never persisted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum PositionState {
    #[default]
    Flat,
    Open(OpenPosition),
}

impl PositionState {
    pub fn is_open(&self) -> bool {
        matches!(self, PositionState::Open(_))
    }

    pub fn open_position(&self) -> Option<&OpenPosition> {
        match self {
            PositionState::Open(position) => Some(position),
            PositionState::Flat => None,
        }
    }

    pub fn side(&self) -> Option<Side> {
        self.open_position().map(|p| p.side)
    }
}

/// Market order to submit; lives only for the duration of the submit step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub leverage: u32,
    pub margin_mode: MarginMode,
    /// Closing order for an existing position
    pub reduce_only: bool,
    pub take_profit_price: Option<f64>,
    pub stop_loss_price: Option<f64>,
    pub client_order_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderConfirmation {
    pub order_id: String,
    pub client_order_id: String,
}

/// Account equity in quote currency
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquitySnapshot {
    pub available: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ticker {
    pub last_price: f64,
}

/// Contract metadata needed to quantize orders
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    /// Smallest order size in contracts
    pub min_qty: f64,
    /// Order size increment in contracts
    pub qty_step: f64,
    pub price_step: f64,
    /// Base-asset units per contract
    pub contract_size: f64,
}

impl Default for Instrument {
    fn default() -> Self {
        Self {
            min_qty: 1.0,
            qty_step: 1.0,
            price_step: 0.1,
            contract_size: 0.0001,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_at(entry_price: f64) -> OpenPosition {
        OpenPosition {
            side: Side::Long,
            entry_price,
            contract_qty: 10.0,
            leverage: 10,
            margin_mode: MarginMode::Isolated,
            unrealized_pnl: 0.0,
            percentage: 0.0,
        }
    }

    #[test]
    fn test_signal_sides() {
        assert_eq!(SignalKind::EnterLong.entry_side(), Some(Side::Long));
        assert_eq!(SignalKind::EnterShort.entry_side(), Some(Side::Short));
        assert_eq!(SignalKind::ExitShort.exit_side(), Some(Side::Short));
        assert_eq!(SignalKind::Hold.entry_side(), None);
        assert_eq!(SignalKind::ExitLong.entry_side(), None);
    }

    #[test]
    fn test_price_move_pct_respects_side() {
        let long = long_at(100.0);
        assert!((long.price_move_pct(110.0) - 0.10).abs() < 1e-12);

        let short = OpenPosition {
            side: Side::Short,
            ..long_at(100.0)
        };
        assert!((short.price_move_pct(110.0) + 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_position_state_accessors() {
        let flat = PositionState::Flat;
        assert!(!flat.is_open());
        assert_eq!(flat.side(), None);

        let open = PositionState::Open(long_at(50_000.0));
        assert!(open.is_open());
        assert_eq!(open.side(), Some(Side::Long));
    }

    #[test]
    fn test_timeframe_parsing() {
        assert_eq!("15m".parse::<Timeframe>().unwrap(), Timeframe::Min15);
        assert_eq!(Timeframe::Hour4.seconds(), 14_400);
        assert!("7m".parse::<Timeframe>().is_err());
    }
}
