use std::fmt;

use crate::config::TradingConfig;
use crate::error::BotError;
use crate::exchange::Exchange;
use crate::models::{
    Instrument, OrderConfirmation, OrderRequest, PositionState, Side, Signal, SignalKind,
};
use crate::risk::{calculate_order_quantity, compute_brackets, Brackets};

/// Entry/exit lifecycle phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorPhase {
    Idle,
    Sizing,
    Configuring,
    Submitting,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Evaluator emitted Exit*
    Signal,
    TakeProfit,
    StopLoss,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Signal => write!(f, "exit signal"),
            ExitReason::TakeProfit => write!(f, "take profit"),
            ExitReason::StopLoss => write!(f, "stop loss"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionAction {
    Enter {
        side: Side,
    },
    /// Close `quantity` contracts of the open `side`
    Exit {
        side: Side,
        quantity: f64,
        reason: ExitReason,
    },
    Skip,
}

#[derive(Debug, Clone)]
pub struct ExecutionDecision {
    pub action: ExecutionAction,
    pub reason: String,
}

impl ExecutionDecision {
    fn skip(reason: impl Into<String>) -> Self {
        Self {
            action: ExecutionAction::Skip,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EntryFill {
    pub side: Side,
    pub quantity: f64,
    pub reference_price: f64,
    pub brackets: Option<Brackets>,
    pub confirmation: OrderConfirmation,
    /// Total equity before the order, for realized PnL once flat again
    pub pre_trade_equity: f64,
}

#[derive(Debug, Clone)]
pub struct ExitFill {
    pub side: Side,
    pub quantity: f64,
    pub reason: ExitReason,
    pub confirmation: OrderConfirmation,
}

/// Turns signals into orders for one symbol
///
/// Entries walk `Idle → Sizing → Configuring → Submitting → Confirmed`; any
/// error moves to `Failed` and is returned to the caller without retrying.
pub struct OrderCoordinator {
    symbol: String,
    quote_currency: String,
    trading: TradingConfig,
    phase: CoordinatorPhase,
}

impl OrderCoordinator {
    pub fn new(
        symbol: impl Into<String>,
        quote_currency: impl Into<String>,
        trading: TradingConfig,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            quote_currency: quote_currency.into(),
            trading,
            phase: CoordinatorPhase::Idle,
        }
    }

    pub fn phase(&self) -> CoordinatorPhase {
        self.phase
    }

    fn transition(&mut self, next: CoordinatorPhase) {
        tracing::debug!("Coordinator {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    fn fail(&mut self, error: BotError) -> BotError {
        self.transition(CoordinatorPhase::Failed);
        error
    }

    /// Decide what to do with a signal given the exchange position
    ///
    /// Pure. Entries only happen when flat; with a position open and no exit
    /// signal the configured TP/SL distances are checked against `current_price`.
    pub fn decide(
        &self,
        signal: &Signal,
        position: &PositionState,
        current_price: f64,
    ) -> ExecutionDecision {
        match (signal.kind.entry_side(), signal.kind, position) {
            (Some(_), _, PositionState::Open(open)) => ExecutionDecision::skip(format!(
                "{} position already open, no pyramiding",
                open.side
            )),
            (Some(side), _, PositionState::Flat) => ExecutionDecision {
                action: ExecutionAction::Enter { side },
                reason: format!("{} entry signal while flat", side),
            },
            (None, SignalKind::ExitLong | SignalKind::ExitShort, PositionState::Open(open))
                if signal.kind.exit_side() == Some(open.side) =>
            {
                ExecutionDecision {
                    action: ExecutionAction::Exit {
                        side: open.side,
                        quantity: open.contract_qty,
                        reason: ExitReason::Signal,
                    },
                    reason: format!("Exit signal for open {}", open.side),
                }
            }
            (None, SignalKind::ExitLong | SignalKind::ExitShort, _) => {
                ExecutionDecision::skip("Exit signal does not match any open position")
            }
            (None, SignalKind::Hold, PositionState::Open(open)) if self.trading.monitor_targets => {
                let move_pct = open.price_move_pct(current_price);
                let reason = if move_pct >= self.trading.take_profit_pct() {
                    Some(ExitReason::TakeProfit)
                } else if move_pct <= -self.trading.stop_loss_pct {
                    Some(ExitReason::StopLoss)
                } else {
                    None
                };

                match reason {
                    Some(reason) => ExecutionDecision {
                        action: ExecutionAction::Exit {
                            side: open.side,
                            quantity: open.contract_qty,
                            reason,
                        },
                        reason: format!("{} reached ({:+.2}%)", reason, move_pct * 100.0),
                    },
                    None => ExecutionDecision::skip(format!(
                        "Holding {} ({:+.2}%)",
                        open.side,
                        move_pct * 100.0
                    )),
                }
            }
            (None, _, _) => ExecutionDecision::skip("Hold signal"),
        }
    }

    /// Size, configure leverage and submit an entry
    pub async fn execute_entry(
        &mut self,
        exchange: &dyn Exchange,
        side: Side,
        instrument: &Instrument,
    ) -> Result<EntryFill, BotError> {
        self.phase = CoordinatorPhase::Idle;
        match self.run_entry(exchange, side, instrument).await {
            Ok(fill) => Ok(fill),
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn run_entry(
        &mut self,
        exchange: &dyn Exchange,
        side: Side,
        instrument: &Instrument,
    ) -> Result<EntryFill, BotError> {
        self.transition(CoordinatorPhase::Sizing);
        let equity = exchange.fetch_balance(&self.quote_currency).await?;
        let ticker = exchange.fetch_ticker(&self.symbol).await?;
        let price = ticker.last_price;
        let quantity =
            calculate_order_quantity(&equity, &self.trading.sizing_params(), price, instrument)?;

        self.transition(CoordinatorPhase::Configuring);
        match exchange
            .set_leverage(&self.symbol, self.trading.leverage, self.trading.margin_mode, side)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_already_configured() => {
                tracing::debug!("Leverage already {}x, continuing: {}", self.trading.leverage, e);
            }
            Err(e) => return Err(e),
        }

        self.transition(CoordinatorPhase::Submitting);
        let brackets = if self.trading.attach_brackets {
            compute_brackets(
                side,
                price,
                self.trading.stop_loss_pct,
                self.trading.reward_ratio,
                instrument.price_step,
            )
        } else {
            None
        };

        let order = OrderRequest {
            symbol: self.symbol.clone(),
            side,
            quantity,
            leverage: self.trading.leverage,
            margin_mode: self.trading.margin_mode,
            reduce_only: false,
            take_profit_price: brackets.map(|b| b.take_profit),
            stop_loss_price: brackets.map(|b| b.stop_loss),
            client_order_id: uuid::Uuid::new_v4().simple().to_string(),
        };
        let confirmation = exchange.create_order(&order).await?;

        self.transition(CoordinatorPhase::Confirmed);
        tracing::info!(
            "✅ Entered {} {} x {} @ ~{:.4} (order {})",
            side,
            self.symbol,
            quantity,
            price,
            confirmation.order_id
        );

        Ok(EntryFill {
            side,
            quantity,
            reference_price: price,
            brackets,
            confirmation,
            pre_trade_equity: equity.total,
        })
    }

    /// Close `quantity` contracts of the open `side` with a reduce-only market order
    pub async fn execute_exit(
        &mut self,
        exchange: &dyn Exchange,
        side: Side,
        quantity: f64,
        reason: ExitReason,
    ) -> Result<ExitFill, BotError> {
        self.phase = CoordinatorPhase::Idle;
        self.transition(CoordinatorPhase::Submitting);

        let order = OrderRequest {
            symbol: self.symbol.clone(),
            side: side.opposite(),
            quantity,
            leverage: self.trading.leverage,
            margin_mode: self.trading.margin_mode,
            reduce_only: true,
            take_profit_price: None,
            stop_loss_price: None,
            client_order_id: uuid::Uuid::new_v4().simple().to_string(),
        };

        match exchange.create_order(&order).await {
            Ok(confirmation) => {
                self.transition(CoordinatorPhase::Confirmed);
                tracing::info!(
                    "✅ Closed {} {} x {} ({}, order {})",
                    side,
                    self.symbol,
                    quantity,
                    reason,
                    confirmation.order_id
                );
                Ok(ExitFill {
                    side,
                    quantity,
                    reason,
                    confirmation,
                })
            }
            Err(e) => Err(self.fail(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{PaperConfig, PaperExchange};
    use crate::models::{MarginMode, OpenPosition};
    use crate::risk::SizingPolicy;

    fn trading() -> TradingConfig {
        TradingConfig {
            leverage: 10,
            margin_mode: MarginMode::Isolated,
            capital_fraction: 0.5,
            sizing_policy: SizingPolicy::Available,
            stop_loss_pct: 0.01,
            reward_ratio: 2.0,
            attach_brackets: true,
            monitor_targets: true,
        }
    }

    fn instrument() -> Instrument {
        Instrument {
            min_qty: 1.0,
            qty_step: 1.0,
            price_step: 0.01,
            contract_size: 1.0,
        }
    }

    fn paper() -> PaperExchange {
        PaperExchange::new(PaperConfig {
            starting_balance: 1_000.0,
            start_price: 100.0,
            taker_fee_rate: 0.0,
            instrument: instrument(),
            ..PaperConfig::default()
        })
    }

    fn coordinator() -> OrderCoordinator {
        OrderCoordinator::new("BTC_USDT", "USDT", trading())
    }

    fn open(side: Side, entry_price: f64) -> PositionState {
        PositionState::Open(OpenPosition {
            side,
            entry_price,
            contract_qty: 7.0,
            leverage: 10,
            margin_mode: MarginMode::Isolated,
            unrealized_pnl: 0.0,
            percentage: 0.0,
        })
    }

    #[test]
    fn test_never_enters_while_open() {
        let coordinator = coordinator();
        for kind in [SignalKind::EnterLong, SignalKind::EnterShort] {
            let decision = coordinator.decide(&Signal::new(kind, 100.0), &open(Side::Long, 100.0), 100.0);
            assert_eq!(decision.action, ExecutionAction::Skip);
        }
    }

    #[test]
    fn test_enters_when_flat() {
        let decision = coordinator().decide(
            &Signal::new(SignalKind::EnterShort, 100.0),
            &PositionState::Flat,
            100.0,
        );
        assert_eq!(decision.action, ExecutionAction::Enter { side: Side::Short });
    }

    #[test]
    fn test_exit_uses_full_position_size() {
        let decision = coordinator().decide(
            &Signal::new(SignalKind::ExitLong, 100.0),
            &open(Side::Long, 100.0),
            100.0,
        );
        assert_eq!(
            decision.action,
            ExecutionAction::Exit {
                side: Side::Long,
                quantity: 7.0,
                reason: ExitReason::Signal
            }
        );
    }

    #[test]
    fn test_exit_for_other_side_is_skipped() {
        let decision = coordinator().decide(
            &Signal::new(SignalKind::ExitShort, 100.0),
            &open(Side::Long, 100.0),
            100.0,
        );
        assert_eq!(decision.action, ExecutionAction::Skip);
    }

    #[test]
    fn test_price_targets_close_position_on_hold() {
        let coordinator = coordinator();

        // Long +2.5% with a 2% target
        let decision = coordinator.decide(&Signal::hold(102.5), &open(Side::Long, 100.0), 102.5);
        assert!(matches!(
            decision.action,
            ExecutionAction::Exit { reason: ExitReason::TakeProfit, .. }
        ));

        // Short, price up 1.5% against a 1% stop
        let decision = coordinator.decide(&Signal::hold(101.5), &open(Side::Short, 100.0), 101.5);
        assert!(matches!(
            decision.action,
            ExecutionAction::Exit { reason: ExitReason::StopLoss, .. }
        ));

        let decision = coordinator.decide(&Signal::hold(100.5), &open(Side::Long, 100.0), 100.5);
        assert_eq!(decision.action, ExecutionAction::Skip);
    }

    #[test]
    fn test_targets_ignored_when_monitoring_disabled() {
        let coordinator = OrderCoordinator::new(
            "BTC_USDT",
            "USDT",
            TradingConfig {
                monitor_targets: false,
                ..trading()
            },
        );
        let decision = coordinator.decide(&Signal::hold(150.0), &open(Side::Long, 100.0), 150.0);
        assert_eq!(decision.action, ExecutionAction::Skip);
    }

    #[tokio::test]
    async fn test_entry_sizes_configures_and_submits() {
        let exchange = paper();
        let mut coordinator = coordinator();

        let fill = coordinator
            .execute_entry(&exchange, Side::Long, &instrument())
            .await
            .unwrap();

        // 1000 × 0.5 × 10 / 100
        assert_eq!(fill.quantity, 50.0);
        assert_eq!(fill.pre_trade_equity, 1_000.0);
        assert_eq!(coordinator.phase(), CoordinatorPhase::Confirmed);
        assert_eq!(exchange.leverage(), Some((10, MarginMode::Isolated)));

        let orders = exchange.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, Side::Long);
        assert!(!orders[0].reduce_only);
        assert_eq!(orders[0].stop_loss_price, Some(99.0));
        assert_eq!(orders[0].take_profit_price, Some(102.0));
    }

    #[tokio::test]
    async fn test_leverage_already_set_does_not_abort_submit() {
        let exchange = paper();
        exchange
            .set_leverage("BTC_USDT", 10, MarginMode::Isolated, Side::Long)
            .await
            .unwrap();
        let mut coordinator = coordinator();

        let result = coordinator
            .execute_entry(&exchange, Side::Long, &instrument())
            .await;

        assert!(result.is_ok());
        assert_eq!(coordinator.phase(), CoordinatorPhase::Confirmed);
        assert_eq!(exchange.orders().len(), 1);
    }

    #[tokio::test]
    async fn test_rejection_fails_and_leaves_position_flat() {
        let exchange = paper();
        exchange.reject_next_order(BotError::rejection(Some(2005), "Insufficient margin"));
        let mut coordinator = coordinator();

        let err = coordinator
            .execute_entry(&exchange, Side::Short, &instrument())
            .await
            .unwrap_err();

        assert!(matches!(err, BotError::ExchangeRejection { .. }));
        assert_eq!(coordinator.phase(), CoordinatorPhase::Failed);
        assert!(exchange.fetch_positions("BTC_USDT").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sizing_failure_submits_nothing() {
        let exchange = paper();
        let mut coordinator = coordinator();
        let big_minimum = Instrument {
            min_qty: 1_000.0,
            ..instrument()
        };

        let err = coordinator
            .execute_entry(&exchange, Side::Long, &big_minimum)
            .await
            .unwrap_err();

        assert!(matches!(err, BotError::Sizing(_)));
        assert_eq!(coordinator.phase(), CoordinatorPhase::Failed);
        assert!(exchange.orders().is_empty());
    }

    #[tokio::test]
    async fn test_exit_inverts_side_and_reduces_only() {
        let exchange = paper();
        let mut coordinator = coordinator();
        let fill = coordinator
            .execute_entry(&exchange, Side::Short, &instrument())
            .await
            .unwrap();

        let exit = coordinator
            .execute_exit(&exchange, Side::Short, fill.quantity, ExitReason::Signal)
            .await
            .unwrap();

        assert_eq!(exit.quantity, 50.0);
        let orders = exchange.orders();
        assert_eq!(orders[1].side, Side::Long);
        assert!(orders[1].reduce_only);
        assert_eq!(orders[1].quantity, 50.0);
        assert!(exchange.fetch_positions("BTC_USDT").await.unwrap().is_empty());
    }
}
