//! Market data feed adapter
//!
//! Everything the engine reads from or writes to the exchange goes through
//! [`Exchange`], so the live client and the paper exchange are interchangeable.

pub mod mexc;
pub mod paper;
pub mod synthetic;

pub use mexc::MexcClient;
pub use paper::{PaperConfig, PaperExchange};
pub use synthetic::{MarketScenario, SyntheticDataGenerator};

use async_trait::async_trait;

use crate::error::BotError;
use crate::models::{
    Candle, EquitySnapshot, Instrument, MarginMode, OrderConfirmation, OrderRequest, Side,
    Ticker, Timeframe,
};

/// Position record as the exchange reports it
///
/// Fields are optional because exchanges omit or null them freely; the position
/// tracker turns these into a typed `PositionState`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPosition {
    pub symbol: Option<String>,
    /// "long" / "short" / "buy" / "sell", exchange dependent
    pub side: Option<String>,
    /// Size in contracts; may be signed on exchanges without a side field
    pub contracts: Option<f64>,
    pub entry_price: Option<f64>,
    pub unrealized_pnl: Option<f64>,
    pub percentage: Option<f64>,
    pub leverage: Option<f64>,
    pub margin_mode: Option<String>,
}

#[async_trait]
pub trait Exchange: Send + Sync {
    /// Most recent `limit` candles, oldest first
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, BotError>;

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, BotError>;

    async fn fetch_positions(&self, symbol: &str) -> Result<Vec<RawPosition>, BotError>;

    /// Free and total equity in `currency`
    async fn fetch_balance(&self, currency: &str) -> Result<EquitySnapshot, BotError>;

    async fn fetch_instrument(&self, symbol: &str) -> Result<Instrument, BotError>;

    /// Set leverage and margin mode for the side about to be opened
    async fn set_leverage(
        &self,
        symbol: &str,
        leverage: u32,
        margin_mode: MarginMode,
        side: Side,
    ) -> Result<(), BotError>;

    /// Submit a market order
    async fn create_order(&self, order: &OrderRequest) -> Result<OrderConfirmation, BotError>;

    fn name(&self) -> &str;
}
