use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use swapbot::exchange::{Exchange, MarketScenario, PaperConfig, PaperExchange, SyntheticDataGenerator};
use swapbot::execution::{Engine, EngineState};
use swapbot::indicators::IndicatorSnapshot;
use swapbot::notify::Notifier;
use swapbot::strategy::SignalEvaluator;
use swapbot::*;

/// Replays a fixed list of signal kinds, then holds
struct ScriptedStrategy {
    script: Mutex<VecDeque<SignalKind>>,
}

impl ScriptedStrategy {
    fn boxed(kinds: &[SignalKind]) -> Box<dyn Strategy> {
        Box::new(Self {
            script: Mutex::new(kinds.iter().copied().collect()),
        })
    }
}

impl Strategy for ScriptedStrategy {
    fn evaluate(&self, snapshot: &IndicatorSnapshot, _position: &PositionState) -> Signal {
        let kind = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SignalKind::Hold);
        Signal::new(kind, snapshot.last_close().unwrap_or(0.0))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[derive(Clone, Default)]
struct RecordingNotifier {
    messages: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_message(&self, channel: &str, text: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((channel.to_string(), text.to_string()));
    }
}

fn paper_config(fee: f64) -> PaperConfig {
    PaperConfig {
        starting_balance: 1_000.0,
        start_price: 100.0,
        taker_fee_rate: fee,
        instrument: Instrument {
            min_qty: 1.0,
            qty_step: 1.0,
            price_step: 0.01,
            contract_size: 1.0,
        },
        ..PaperConfig::default()
    }
}

fn bot_config() -> BotConfig {
    let mut config = BotConfig::default();
    config.trading.capital_fraction = 0.5;
    config
}

fn fixed_history_exchange(fee: f64) -> Arc<PaperExchange> {
    let candles = SyntheticDataGenerator::new(11, MarketScenario::Sideways, 100.0)
        .history(Timeframe::Min15, 60, Utc::now());
    Arc::new(PaperExchange::with_candles(paper_config(fee), candles))
}

#[tokio::test]
async fn test_round_trip_realizes_equity_difference() {
    let _ = tracing_subscriber::fmt::try_init();

    let exchange = fixed_history_exchange(0.0006);
    let notifier = RecordingNotifier::default();
    let mut engine = Engine::new(
        bot_config(),
        exchange.clone(),
        ScriptedStrategy::boxed(&[
            SignalKind::EnterLong,
            SignalKind::Hold,
            SignalKind::ExitLong,
            SignalKind::Hold,
        ]),
        Box::new(notifier.clone()),
    );

    // 1. Enter
    let (state, report) = engine.run_cycle(&EngineState::default()).await.unwrap();
    let entry = report.entry.expect("entry fill");
    let pre = state.pre_trade_equity.expect("pre-trade equity recorded");
    assert_eq!(pre, 1_000.0);
    let entry_price = exchange.fetch_ticker("BTC_USDT").await.unwrap().last_price;

    // 2. Hold while the price drifts up half a percent
    let exit_price = entry_price * 1.005;
    exchange.set_price(exit_price);
    let (state, report) = engine.run_cycle(&state).await.unwrap();
    assert!(report.position.is_open());
    assert!(report.exit.is_none());

    // 3. Exit signal closes the full size
    let (state, report) = engine.run_cycle(&state).await.unwrap();
    let exit = report.exit.expect("exit fill");
    assert_eq!(exit.quantity, entry.quantity);

    // 4. Flat again, PnL reported
    let (state, report) = engine.run_cycle(&state).await.unwrap();
    let post = exchange.fetch_balance("USDT").await.unwrap().total;
    let pnl = report.realized_pnl.expect("realized pnl");

    assert!((pnl - (post - pre)).abs() < 1e-9);
    let gross = entry.quantity * (exit_price - entry_price);
    let fees = entry.quantity * (entry_price + exit_price) * 0.0006;
    assert!((pnl - (gross - fees)).abs() < 1e-6, "pnl {} vs {}", pnl, gross - fees);
    assert_eq!(report.position, PositionState::Flat);
    assert_eq!(state.pre_trade_equity, None);

    let messages = notifier.messages.lock().unwrap();
    assert!(messages.iter().any(|(_, m)| m.contains("entered")));
    assert!(messages.iter().any(|(_, m)| m.contains("Realized PnL")));
}

#[tokio::test]
async fn test_exchange_side_stop_is_reported_as_realized_loss() {
    let exchange = fixed_history_exchange(0.0);
    let mut engine = Engine::new(
        bot_config(),
        exchange.clone(),
        ScriptedStrategy::boxed(&[SignalKind::EnterShort]),
        Box::new(RecordingNotifier::default()),
    );

    let (state, report) = engine.run_cycle(&EngineState::default()).await.unwrap();
    let entry = report.entry.expect("entry fill");
    let brackets = entry.brackets.expect("brackets attached");
    assert!(brackets.stop_loss > entry.reference_price);

    // Price runs through the stop between polls
    exchange.set_price(entry.reference_price * 1.03);

    let (state, report) = engine.run_cycle(&state).await.unwrap();
    assert_eq!(report.position, PositionState::Flat);
    let pnl = report.realized_pnl.expect("realized pnl");
    let expected = -entry.quantity * (brackets.stop_loss - entry.reference_price);
    assert!((pnl - expected).abs() < 1e-6, "pnl {} vs {}", pnl, expected);
    assert!(state.pre_trade_equity.is_none());
}

#[tokio::test]
async fn test_live_feed_never_pyramids() {
    let exchange = Arc::new(PaperExchange::new(PaperConfig {
        scenario: MarketScenario::Volatile,
        seed: 9,
        ..paper_config(0.0006)
    }));
    let mut config = bot_config();
    config.signals.mode = swapbot::strategy::DecisionMode::Scored;
    config.signals.score_threshold = 2;
    let strategy = SignalEvaluator::new(config.signals.clone());
    let mut engine = Engine::new(
        config,
        exchange.clone(),
        Box::new(strategy),
        Box::new(RecordingNotifier::default()),
    );

    let mut state = EngineState::default();
    for _ in 0..120 {
        let (next, report) = engine.run_cycle(&state).await.unwrap();
        if report.entry.is_some() {
            assert_eq!(report.position, PositionState::Flat);
        }
        if let Some(e) = &report.execution_error {
            assert!(
                !matches!(e, BotError::ExchangeRejection { .. }),
                "unexpected rejection: {}",
                e
            );
        }
        state = next;
    }

    assert_eq!(state.cycles, 120);
    let positions = exchange.fetch_positions("BTC_USDT").await.unwrap();
    assert!(positions.len() <= 1);
}

#[tokio::test]
async fn test_once_mode_cycle_on_insufficient_history_holds() {
    let candles = SyntheticDataGenerator::new(2, MarketScenario::Uptrend, 100.0)
        .history(Timeframe::Min15, 5, Utc::now());
    let exchange = Arc::new(PaperExchange::with_candles(paper_config(0.0), candles));
    let mut engine = Engine::new(
        bot_config(),
        exchange.clone(),
        Box::new(SignalEvaluator::default()),
        Box::new(RecordingNotifier::default()),
    );

    let result = engine.run_cycle(&EngineState::default()).await;
    let (_, report) = tokio_test::assert_ok!(result);

    assert!(report.signal.is_hold());
    assert!(matches!(report.data_warning, Some(BotError::DataInsufficient(_))));
    assert!(exchange.orders().is_empty());
}
