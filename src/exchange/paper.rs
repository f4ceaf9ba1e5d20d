use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use super::synthetic::{MarketScenario, SyntheticDataGenerator};
use super::{Exchange, RawPosition};
use crate::error::BotError;
use crate::models::{
    Candle, EquitySnapshot, Instrument, MarginMode, OrderConfirmation, OrderRequest, Side,
    Ticker, Timeframe,
};

const MAX_LEVERAGE: u32 = 200;

/// Simulated account settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    /// Starting USDT wallet balance
    pub starting_balance: f64,
    pub start_price: f64,
    pub scenario: MarketScenario,
    pub seed: u64,
    /// Charged on notional for every fill
    pub taker_fee_rate: f64,
    /// Append one synthetic candle per `fetch_candles` call
    pub advance_on_fetch: bool,
    pub instrument: Instrument,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            starting_balance: 1_000.0,
            start_price: 50_000.0,
            scenario: MarketScenario::default(),
            seed: 42,
            taker_fee_rate: 0.0006,
            advance_on_fetch: true,
            instrument: Instrument::default(),
        }
    }
}

#[derive(Debug, Clone)]
struct PaperPosition {
    side: Side,
    contracts: f64,
    entry_price: f64,
    margin: f64,
    leverage: u32,
    margin_mode: MarginMode,
    take_profit: Option<f64>,
    stop_loss: Option<f64>,
}

struct PaperState {
    wallet: f64,
    last_price: f64,
    candles: Vec<Candle>,
    position: Option<PaperPosition>,
    leverage: Option<(u32, MarginMode)>,
    scripted_rejections: VecDeque<BotError>,
    orders: Vec<OrderRequest>,
    next_order_id: u64,
    generator: SyntheticDataGenerator,
}

/// In-process exchange for paper trading and tests
///
/// Fills market orders at the last price with a taker fee, keeps isolated-margin
/// accounting, and fires attached take-profit / stop-loss brackets when a candle
/// or price update crosses them.
pub struct PaperExchange {
    config: PaperConfig,
    state: Mutex<PaperState>,
}

impl PaperExchange {
    pub fn new(config: PaperConfig) -> Self {
        let generator =
            SyntheticDataGenerator::new(config.seed, config.scenario, config.start_price);
        let state = PaperState {
            wallet: config.starting_balance,
            last_price: config.start_price,
            candles: Vec::new(),
            position: None,
            leverage: None,
            scripted_rejections: VecDeque::new(),
            orders: Vec::new(),
            next_order_id: 1,
            generator,
        };

        Self {
            config,
            state: Mutex::new(state),
        }
    }

    /// Paper exchange serving a fixed candle history
    pub fn with_candles(config: PaperConfig, candles: Vec<Candle>) -> Self {
        let exchange = Self::new(PaperConfig {
            advance_on_fetch: false,
            ..config
        });
        {
            let mut state = exchange.lock();
            if let Some(last) = candles.last() {
                state.last_price = last.close;
            }
            state.candles = candles;
        }
        exchange
    }

    fn lock(&self) -> MutexGuard<'_, PaperState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Move the mark price; brackets are checked against it
    pub fn set_price(&self, price: f64) {
        let mut state = self.lock();
        state.last_price = price;
        self.check_brackets(&mut state, price, price);
    }

    /// Fail the next `create_order` with `error`
    pub fn reject_next_order(&self, error: BotError) {
        self.lock().scripted_rejections.push_back(error);
    }

    /// Every order accepted so far
    pub fn orders(&self) -> Vec<OrderRequest> {
        self.lock().orders.clone()
    }

    pub fn leverage(&self) -> Option<(u32, MarginMode)> {
        self.lock().leverage
    }

    pub fn wallet_balance(&self) -> f64 {
        self.lock().wallet
    }

    fn apply_candle(&self, state: &mut PaperState, candle: Candle) {
        state.last_price = candle.close;
        self.check_brackets(state, candle.low, candle.high);
        state.candles.push(candle);
    }

    fn ensure_history(&self, state: &mut PaperState, timeframe: Timeframe, limit: usize) {
        if !state.candles.is_empty() {
            return;
        }
        let end = Self::align(Utc::now(), timeframe);
        state.candles = state.generator.history(timeframe, limit.max(200), end);
        if let Some(last) = state.candles.last() {
            state.last_price = last.close;
        }
    }

    fn align(now: DateTime<Utc>, timeframe: Timeframe) -> DateTime<Utc> {
        let secs = timeframe.seconds();
        let aligned = now.timestamp() - now.timestamp().rem_euclid(secs);
        DateTime::<Utc>::from_timestamp(aligned, 0).unwrap_or(now)
    }

    fn advance_feed(&self, state: &mut PaperState, timeframe: Timeframe) {
        let Some(last) = state.candles.last().cloned() else {
            return;
        };
        let step = Duration::seconds(timeframe.seconds());
        let mut timestamp = last.timestamp;
        // A skipped slot leaves a gap in the served history
        let candle = loop {
            timestamp += step;
            if let Some(candle) = state.generator.advance(last.close, timestamp) {
                break candle;
            }
        };
        self.apply_candle(state, candle);
    }

    /// Close the position if the traded range `[low, high]` touches a bracket
    fn check_brackets(&self, state: &mut PaperState, low: f64, high: f64) {
        let Some(position) = state.position.as_ref() else {
            return;
        };

        let (stop_hit, target_hit) = match position.side {
            Side::Long => (
                position.stop_loss.filter(|&sl| low <= sl),
                position.take_profit.filter(|&tp| high >= tp),
            ),
            Side::Short => (
                position.stop_loss.filter(|&sl| high >= sl),
                position.take_profit.filter(|&tp| low <= tp),
            ),
        };

        // Stop wins when one range touches both
        if let Some(price) = stop_hit.or(target_hit) {
            let contracts = position.contracts;
            let pnl = self.close_contracts(state, contracts, price);
            tracing::info!(
                "📄 Paper bracket fill at {:.4} ({}), pnl {:.4}",
                price,
                if stop_hit.is_some() { "stop loss" } else { "take profit" },
                pnl
            );
        }
    }

    fn unrealized(&self, position: &PaperPosition, price: f64) -> f64 {
        position.side.sign()
            * (price - position.entry_price)
            * position.contracts
            * self.config.instrument.contract_size
    }

    fn used_margin(state: &PaperState) -> f64 {
        state.position.as_ref().map(|p| p.margin).unwrap_or(0.0)
    }

    /// Realize `contracts` of the open position at `price`, returning net pnl
    fn close_contracts(&self, state: &mut PaperState, contracts: f64, price: f64) -> f64 {
        let Some(position) = state.position.as_mut() else {
            return 0.0;
        };

        let contracts = contracts.min(position.contracts);
        let contract_size = self.config.instrument.contract_size;
        let gross = position.side.sign() * (price - position.entry_price) * contracts * contract_size;
        let fee = contracts * contract_size * price * self.config.taker_fee_rate;
        let released = position.margin * contracts / position.contracts;

        position.contracts -= contracts;
        position.margin -= released;
        if position.contracts <= f64::EPSILON {
            state.position = None;
        }

        state.wallet += gross - fee;
        gross - fee
    }

    fn open_contracts(&self, state: &mut PaperState, order: &OrderRequest) -> Result<(), BotError> {
        let price = state.last_price;
        let contract_size = self.config.instrument.contract_size;
        let notional = order.quantity * contract_size * price;
        let leverage = order.leverage.max(1);
        let margin = notional / leverage as f64;
        let fee = notional * self.config.taker_fee_rate;

        if state.position.as_ref().is_some_and(|p| p.side != order.side) {
            return Err(BotError::rejection(
                Some(2009),
                "Opposite position open; close it before reversing",
            ));
        }

        let available = state.wallet - Self::used_margin(state);
        if margin + fee > available {
            return Err(BotError::rejection(
                Some(2005),
                format!("Insufficient balance: need {:.4}, available {:.4}", margin + fee, available),
            ));
        }

        state.wallet -= fee;
        match state.position.as_mut() {
            Some(position) => {
                let contracts = position.contracts + order.quantity;
                position.entry_price = (position.entry_price * position.contracts
                    + price * order.quantity)
                    / contracts;
                position.contracts = contracts;
                position.margin += margin;
                position.take_profit = order.take_profit_price.or(position.take_profit);
                position.stop_loss = order.stop_loss_price.or(position.stop_loss);
            }
            None => {
                state.position = Some(PaperPosition {
                    side: order.side,
                    contracts: order.quantity,
                    entry_price: price,
                    margin,
                    leverage,
                    margin_mode: order.margin_mode,
                    take_profit: order.take_profit_price,
                    stop_loss: order.stop_loss_price,
                });
            }
        }
        Ok(())
    }

    fn validate_order(&self, order: &OrderRequest) -> Result<(), BotError> {
        let instrument = &self.config.instrument;
        if !order.quantity.is_finite() || order.quantity <= 0.0 {
            return Err(BotError::rejection(Some(2011), "Order quantity must be positive"));
        }
        if order.quantity + 1e-12 < instrument.min_qty {
            return Err(BotError::rejection(
                Some(2011),
                format!("Order quantity {} below minimum {}", order.quantity, instrument.min_qty),
            ));
        }
        let steps = order.quantity / instrument.qty_step;
        if (steps - steps.round()).abs() > 1e-6 {
            return Err(BotError::rejection(
                Some(2011),
                format!("Order quantity {} not a multiple of {}", order.quantity, instrument.qty_step),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Exchange for PaperExchange {
    async fn fetch_candles(
        &self,
        _symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, BotError> {
        let mut state = self.lock();
        if self.config.advance_on_fetch {
            if state.candles.is_empty() {
                self.ensure_history(&mut state, timeframe, limit);
            } else {
                self.advance_feed(&mut state, timeframe);
            }
        }

        let start = state.candles.len().saturating_sub(limit);
        Ok(state.candles[start..].to_vec())
    }

    async fn fetch_ticker(&self, _symbol: &str) -> Result<Ticker, BotError> {
        Ok(Ticker {
            last_price: self.lock().last_price,
        })
    }

    async fn fetch_positions(&self, symbol: &str) -> Result<Vec<RawPosition>, BotError> {
        let state = self.lock();
        let Some(position) = state.position.as_ref() else {
            return Ok(Vec::new());
        };

        let unrealized = self.unrealized(position, state.last_price);
        let percentage = if position.margin > 0.0 {
            unrealized / position.margin * 100.0
        } else {
            0.0
        };

        Ok(vec![RawPosition {
            symbol: Some(symbol.to_string()),
            side: Some(
                match position.side {
                    Side::Long => "long",
                    Side::Short => "short",
                }
                .to_string(),
            ),
            contracts: Some(position.contracts),
            entry_price: Some(position.entry_price),
            unrealized_pnl: Some(unrealized),
            percentage: Some(percentage),
            leverage: Some(position.leverage as f64),
            margin_mode: Some(
                match position.margin_mode {
                    MarginMode::Isolated => "isolated",
                    MarginMode::Cross => "cross",
                }
                .to_string(),
            ),
        }])
    }

    async fn fetch_balance(&self, _currency: &str) -> Result<EquitySnapshot, BotError> {
        let state = self.lock();
        let unrealized = state
            .position
            .as_ref()
            .map(|p| self.unrealized(p, state.last_price))
            .unwrap_or(0.0);

        Ok(EquitySnapshot {
            available: state.wallet - Self::used_margin(&state),
            total: state.wallet + unrealized,
        })
    }

    async fn fetch_instrument(&self, _symbol: &str) -> Result<Instrument, BotError> {
        Ok(self.config.instrument)
    }

    async fn set_leverage(
        &self,
        _symbol: &str,
        leverage: u32,
        margin_mode: MarginMode,
        _side: Side,
    ) -> Result<(), BotError> {
        if leverage == 0 || leverage > MAX_LEVERAGE {
            return Err(BotError::rejection(
                Some(600),
                format!("Leverage {} out of range 1..={}", leverage, MAX_LEVERAGE),
            ));
        }

        let mut state = self.lock();
        if state.leverage == Some((leverage, margin_mode)) {
            return Err(BotError::rejection(Some(600), "leverage not modified"));
        }
        state.leverage = Some((leverage, margin_mode));
        Ok(())
    }

    async fn create_order(&self, order: &OrderRequest) -> Result<OrderConfirmation, BotError> {
        let mut state = self.lock();
        if let Some(error) = state.scripted_rejections.pop_front() {
            return Err(error);
        }
        self.validate_order(order)?;

        if order.reduce_only {
            let Some(position) = state.position.as_ref() else {
                return Err(BotError::rejection(Some(2009), "No position to reduce"));
            };
            if position.side == order.side {
                return Err(BotError::rejection(
                    Some(2009),
                    "Reduce-only order must oppose the position",
                ));
            }
            let price = state.last_price;
            self.close_contracts(&mut state, order.quantity, price);
        } else {
            self.open_contracts(&mut state, order)?;
        }

        let order_id = format!("paper-{}", state.next_order_id);
        state.next_order_id += 1;
        state.orders.push(order.clone());

        tracing::info!(
            "📄 Paper fill {} {} {} x{} @ {:.4}{}",
            order_id,
            order.side,
            order.quantity,
            order.leverage,
            state.last_price,
            if order.reduce_only { " (reduce only)" } else { "" }
        );

        Ok(OrderConfirmation {
            order_id,
            client_order_id: order.client_order_id.clone(),
        })
    }

    fn name(&self) -> &str {
        "paper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PaperConfig {
        PaperConfig {
            starting_balance: 1_000.0,
            start_price: 100.0,
            taker_fee_rate: 0.0,
            instrument: Instrument {
                min_qty: 1.0,
                qty_step: 1.0,
                price_step: 0.01,
                contract_size: 1.0,
            },
            ..PaperConfig::default()
        }
    }

    fn order(side: Side, quantity: f64, reduce_only: bool) -> OrderRequest {
        OrderRequest {
            symbol: "BTC_USDT".to_string(),
            side,
            quantity,
            leverage: 10,
            margin_mode: MarginMode::Isolated,
            reduce_only,
            take_profit_price: None,
            stop_loss_price: None,
            client_order_id: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_open_and_close_long_realizes_pnl() {
        let exchange = PaperExchange::new(config());

        exchange.create_order(&order(Side::Long, 10.0, false)).await.unwrap();
        let balance = exchange.fetch_balance("USDT").await.unwrap();
        // 10 contracts × 100 / 10x = 100 margin
        assert_eq!(balance.available, 900.0);
        assert_eq!(balance.total, 1_000.0);

        exchange.set_price(110.0);
        let balance = exchange.fetch_balance("USDT").await.unwrap();
        assert_eq!(balance.total, 1_100.0);

        exchange.create_order(&order(Side::Short, 10.0, true)).await.unwrap();
        assert!(exchange.fetch_positions("BTC_USDT").await.unwrap().is_empty());
        assert_eq!(exchange.wallet_balance(), 1_100.0);
    }

    #[tokio::test]
    async fn test_fee_is_charged_on_fill() {
        let exchange = PaperExchange::new(PaperConfig {
            taker_fee_rate: 0.001,
            ..config()
        });

        exchange.create_order(&order(Side::Long, 10.0, false)).await.unwrap();
        // 1000 notional × 0.1%
        assert!((exchange.wallet_balance() - 999.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_reports_position_fields() {
        let exchange = PaperExchange::new(config());
        exchange.create_order(&order(Side::Short, 5.0, false)).await.unwrap();
        exchange.set_price(90.0);

        let positions = exchange.fetch_positions("BTC_USDT").await.unwrap();
        assert_eq!(positions.len(), 1);
        let position = &positions[0];
        assert_eq!(position.side.as_deref(), Some("short"));
        assert_eq!(position.contracts, Some(5.0));
        assert_eq!(position.entry_price, Some(100.0));
        assert_eq!(position.unrealized_pnl, Some(50.0));
        assert_eq!(position.margin_mode.as_deref(), Some("isolated"));
    }

    #[tokio::test]
    async fn test_unchanged_leverage_is_rejected_as_already_configured() {
        let exchange = PaperExchange::new(config());
        exchange
            .set_leverage("BTC_USDT", 10, MarginMode::Isolated, Side::Long)
            .await
            .unwrap();

        let err = exchange
            .set_leverage("BTC_USDT", 10, MarginMode::Isolated, Side::Long)
            .await
            .unwrap_err();
        assert!(err.is_already_configured());
        assert_eq!(exchange.leverage(), Some((10, MarginMode::Isolated)));
    }

    #[tokio::test]
    async fn test_insufficient_margin_is_rejected() {
        let exchange = PaperExchange::new(config());
        let err = exchange
            .create_order(&order(Side::Long, 200.0, false))
            .await
            .unwrap_err();

        assert!(matches!(err, BotError::ExchangeRejection { .. }));
        assert!(exchange.orders().is_empty());
    }

    #[tokio::test]
    async fn test_reduce_only_without_position_is_rejected() {
        let exchange = PaperExchange::new(config());
        let err = exchange
            .create_order(&order(Side::Short, 1.0, true))
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::ExchangeRejection { .. }));
    }

    #[tokio::test]
    async fn test_scripted_rejection_consumed_once() {
        let exchange = PaperExchange::new(config());
        exchange.reject_next_order(BotError::rejection(Some(1), "maintenance"));

        assert!(exchange.create_order(&order(Side::Long, 1.0, false)).await.is_err());
        assert!(exchange.create_order(&order(Side::Long, 1.0, false)).await.is_ok());
    }

    #[tokio::test]
    async fn test_stop_loss_bracket_fires() {
        let exchange = PaperExchange::new(config());
        let mut entry = order(Side::Long, 10.0, false);
        entry.stop_loss_price = Some(95.0);
        entry.take_profit_price = Some(110.0);
        exchange.create_order(&entry).await.unwrap();

        exchange.set_price(94.0);

        assert!(exchange.fetch_positions("BTC_USDT").await.unwrap().is_empty());
        // Filled at the stop, not the mark
        assert_eq!(exchange.wallet_balance(), 950.0);
    }

    #[tokio::test]
    async fn test_fetch_candles_advances_feed() {
        let exchange = PaperExchange::new(config());

        let first = exchange.fetch_candles("BTC_USDT", Timeframe::Min15, 50).await.unwrap();
        let second = exchange.fetch_candles("BTC_USDT", Timeframe::Min15, 50).await.unwrap();

        assert_eq!(first.len(), 50);
        assert_eq!(second.len(), 50);
        assert!(second.last().unwrap().timestamp > first.last().unwrap().timestamp);
        let ticker = exchange.fetch_ticker("BTC_USDT").await.unwrap();
        assert_eq!(ticker.last_price, second.last().unwrap().close);
    }

    #[tokio::test]
    async fn test_fixed_history_is_served_unchanged() {
        let candles = SyntheticDataGenerator::new(1, MarketScenario::Sideways, 100.0)
            .history(Timeframe::Min15, 30, Utc::now());
        let exchange = PaperExchange::with_candles(config(), candles.clone());

        let served = exchange.fetch_candles("BTC_USDT", Timeframe::Min15, 50).await.unwrap();
        assert_eq!(served, candles);
    }

    #[tokio::test]
    async fn test_quantity_off_step_is_rejected() {
        let exchange = PaperExchange::new(config());
        let err = exchange
            .create_order(&order(Side::Long, 1.5, false))
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::ExchangeRejection { .. }));
    }
}
