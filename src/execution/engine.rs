use std::future::Future;
use std::sync::Arc;

use crate::config::BotConfig;
use crate::error::BotError;
use crate::exchange::Exchange;
use crate::execution::coordinator::{
    CoordinatorPhase, EntryFill, ExecutionAction, ExecutionDecision, ExitFill, OrderCoordinator,
};
use crate::execution::position_tracker::PositionTracker;
use crate::indicators::{compute_snapshot, IndicatorSnapshot};
use crate::models::{CandleSeries, Instrument, PositionState, Signal};
use crate::notify::Notifier;
use crate::strategy::Strategy;

const CHANNEL_STATUS: &str = "status";
const CHANNEL_TRADES: &str = "trades";
const CHANNEL_ERRORS: &str = "errors";

/// State carried from one cycle to the next
///
/// Everything else is re-fetched from the exchange every cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineState {
    /// Total equity recorded when the current position was entered
    pub pre_trade_equity: Option<f64>,
    /// Position observed by the previous cycle
    pub previous_position: PositionState,
    pub cycles: u64,
}

/// What one cycle saw and did
#[derive(Debug)]
pub struct CycleReport {
    pub snapshot: IndicatorSnapshot,
    pub signal: Signal,
    pub position: PositionState,
    pub decision: ExecutionDecision,
    pub phase: CoordinatorPhase,
    pub entry: Option<EntryFill>,
    pub exit: Option<ExitFill>,
    pub realized_pnl: Option<f64>,
    /// `DataInsufficient` when the indicators were not ready and the signal was forced to Hold
    pub data_warning: Option<BotError>,
    /// Order-side failure; the cycle itself still completed
    pub execution_error: Option<BotError>,
}

/// Single-symbol poll loop
pub struct Engine {
    config: BotConfig,
    exchange: Arc<dyn Exchange>,
    strategy: Box<dyn Strategy>,
    notifier: Box<dyn Notifier>,
    tracker: PositionTracker,
    coordinator: OrderCoordinator,
    instrument: Option<Instrument>,
}

impl Engine {
    pub fn new(
        config: BotConfig,
        exchange: Arc<dyn Exchange>,
        strategy: Box<dyn Strategy>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        let tracker = PositionTracker::new(&config.exchange.symbol, config.trading.margin_mode);
        let coordinator = OrderCoordinator::new(
            &config.exchange.symbol,
            &config.exchange.quote_currency,
            config.trading.clone(),
        );

        Self {
            config,
            exchange,
            strategy,
            notifier,
            tracker,
            coordinator,
            instrument: None,
        }
    }

    /// Contract metadata, fetched on first use
    async fn instrument(&mut self) -> Result<Instrument, BotError> {
        if let Some(instrument) = self.instrument {
            return Ok(instrument);
        }
        let instrument = self
            .exchange
            .fetch_instrument(&self.config.exchange.symbol)
            .await?;
        tracing::info!(
            "📐 {} contract: size {}, min {} step {}, price step {}",
            self.config.exchange.symbol,
            instrument.contract_size,
            instrument.min_qty,
            instrument.qty_step,
            instrument.price_step
        );
        self.instrument = Some(instrument);
        Ok(instrument)
    }

    /// Fetch, evaluate and act once
    ///
    /// Market data and position failures abort the cycle with `Err` and the
    /// caller keeps its previous state. Order failures are reported in
    /// `CycleReport::execution_error` with the exchange position unchanged.
    pub async fn run_cycle(
        &mut self,
        state: &EngineState,
    ) -> Result<(EngineState, CycleReport), BotError> {
        let symbol = self.config.exchange.symbol.clone();
        let timeframe = self.config.exchange.timeframe;

        let candles = self
            .exchange
            .fetch_candles(&symbol, timeframe, self.config.exchange.candle_limit)
            .await?;
        let series = CandleSeries::from_candles(&symbol, candles, self.config.exchange.candle_limit)?;

        let gaps = series.count_gaps(timeframe.seconds());
        if gaps > 0 {
            tracing::warn!("⚠️  {} candle gaps in {} series", gaps, symbol);
        }

        let snapshot = compute_snapshot(&series, &self.config.indicators);
        let data_warning = (!snapshot.is_ready()).then(|| {
            BotError::DataInsufficient(format!(
                "{} candles, need {}",
                series.len(),
                self.config.indicators.min_candles()
            ))
        });
        if let Some(warning) = &data_warning {
            tracing::warn!("⚠️  {}, holding", warning);
        }

        let position = self.tracker.fetch(self.exchange.as_ref()).await?;
        let mut next = EngineState {
            pre_trade_equity: state.pre_trade_equity,
            previous_position: position.clone(),
            cycles: state.cycles + 1,
        };

        if state.previous_position.is_open() && !position.is_open() {
            tracing::info!("📭 {} position closed", symbol);
        }

        let mut realized_pnl = None;
        if !position.is_open() {
            if let Some(pre) = state.pre_trade_equity {
                let post = self
                    .exchange
                    .fetch_balance(&self.config.exchange.quote_currency)
                    .await?
                    .total;
                let pnl = post - pre;
                realized_pnl = Some(pnl);
                next.pre_trade_equity = None;

                tracing::info!("💰 Realized PnL {:+.4} (equity {:.4} -> {:.4})", pnl, pre, post);
                self.notifier
                    .send_message(
                        CHANNEL_TRADES,
                        &format!("Realized PnL {:+.4} {}", pnl, self.config.exchange.quote_currency),
                    )
                    .await;
            }
        }

        let signal = self.strategy.evaluate(&snapshot, &position);
        let current_price = series.last().map(|c| c.close).unwrap_or(signal.price);
        let decision = self.coordinator.decide(&signal, &position, current_price);

        tracing::info!(
            "📊 Cycle {} | {} {:.4} | {:?}{} | {:?} | {}",
            next.cycles,
            symbol,
            current_price,
            signal.kind,
            signal.score.map(|s| format!(" (score {})", s)).unwrap_or_default(),
            position.side(),
            decision.reason
        );

        let mut entry = None;
        let mut exit = None;
        let mut execution_error = None;

        match decision.action {
            ExecutionAction::Enter { side } => {
                let result = match self.instrument().await {
                    Ok(instrument) => {
                        self.coordinator
                            .execute_entry(self.exchange.as_ref(), side, &instrument)
                            .await
                    }
                    Err(e) => Err(e),
                };
                match result {
                    Ok(fill) => {
                        next.pre_trade_equity = Some(fill.pre_trade_equity);
                        self.notifier
                            .send_message(CHANNEL_TRADES, &Self::entry_message(&symbol, &fill))
                            .await;
                        entry = Some(fill);
                    }
                    Err(e) => execution_error = Some(e),
                }
            }
            ExecutionAction::Exit {
                side,
                quantity,
                reason,
            } => {
                match self
                    .coordinator
                    .execute_exit(self.exchange.as_ref(), side, quantity, reason)
                    .await
                {
                    Ok(fill) => {
                        self.notifier
                            .send_message(
                                CHANNEL_TRADES,
                                &format!(
                                    "{} {} closed ({}) at ~{:.4}",
                                    symbol, side, reason, current_price
                                ),
                            )
                            .await;
                        exit = Some(fill);
                    }
                    Err(e) => execution_error = Some(e),
                }
            }
            ExecutionAction::Skip => {}
        }

        if let Some(e) = &execution_error {
            tracing::error!("❌ Order failed: {}", e);
            self.notifier
                .send_message(CHANNEL_ERRORS, &format!("Order failed: {}", e))
                .await;
        }

        let report = CycleReport {
            snapshot,
            signal,
            position,
            decision,
            phase: self.coordinator.phase(),
            entry,
            exit,
            realized_pnl,
            data_warning,
            execution_error,
        };

        Ok((next, report))
    }

    fn entry_message(symbol: &str, fill: &EntryFill) -> String {
        let mut message = format!(
            "{} {} entered: {} contracts at ~{:.4}",
            symbol, fill.side, fill.quantity, fill.reference_price
        );
        if let Some(brackets) = fill.brackets {
            message.push_str(&format!(
                " | TP {:.4} SL {:.4}",
                brackets.take_profit, brackets.stop_loss
            ));
        }
        message
    }

    /// Poll until `shutdown` resolves
    ///
    /// Shutdown is only observed while sleeping, so an in-flight order always
    /// completes first. Transient failures sleep the error backoff, everything
    /// else keeps the normal cadence.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);

        self.notifier
            .send_message(
                CHANNEL_STATUS,
                &format!(
                    "Bot online: {} {:?} {}x on {}",
                    self.config.exchange.symbol,
                    self.config.exchange.timeframe,
                    self.config.trading.leverage,
                    self.exchange.name()
                ),
            )
            .await;

        let mut state = EngineState::default();
        loop {
            let delay = match self.run_cycle(&state).await {
                Ok((next, report)) => {
                    state = next;
                    self.config
                        .schedule
                        .delay_after(report.execution_error.as_ref())
                }
                Err(e) => {
                    tracing::error!("❌ Cycle failed: {}", e);
                    self.notifier
                        .send_message(CHANNEL_ERRORS, &format!("Cycle error: {}", e))
                        .await;
                    self.config.schedule.delay_after(Some(&e))
                }
            };

            tracing::debug!("Sleeping {:?}", delay);
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("⚠️  Shutdown requested, stopping poll loop");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.notifier
            .send_message(CHANNEL_STATUS, "Bot stopped")
            .await;
    }
}
