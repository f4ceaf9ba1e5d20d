use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use swapbot::config::{mexc_credentials_from_env, telegram_from_env};
use swapbot::exchange::{Exchange, MexcClient, PaperExchange};
use swapbot::execution::{Engine, EngineState};
use swapbot::notify::{LogNotifier, Notifier, TelegramNotifier};
use swapbot::strategy::SignalEvaluator;
use swapbot::BotConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Single-symbol leveraged swap trading bot")]
struct Args {
    /// TOML config file (defaults to ./swapbot.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Trade against the in-process paper exchange
    #[arg(long)]
    paper: bool,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();

    tracing::info!("🚀 swapbot starting");

    let config = BotConfig::load(args.config.as_deref()).context("loading configuration")?;
    let exchange = create_exchange(&config, args.paper)?;
    let notifier = create_notifier(&config)?;
    let strategy = Box::new(SignalEvaluator::new(config.signals.clone()));

    log_configuration(&config, exchange.name());

    let mut engine = Engine::new(config, exchange, strategy, notifier);

    if args.once {
        let (_, report) = engine
            .run_cycle(&EngineState::default())
            .await
            .context("running cycle")?;
        if let Some(warning) = &report.data_warning {
            tracing::warn!("{}", warning);
        }
        tracing::info!("Decision: {}", report.decision.reason);
        if let Some(e) = report.execution_error {
            tracing::error!("Order failed: {}", e);
        }
        return Ok(());
    }

    tracing::info!("\nPress Ctrl+C to stop...\n");
    engine
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    tracing::info!("👋 swapbot stopped");
    Ok(())
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("swapbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn create_exchange(config: &BotConfig, paper: bool) -> anyhow::Result<Arc<dyn Exchange>> {
    if paper {
        tracing::info!("📄 Paper trading mode ({:?} feed)", config.paper.scenario);
        return Ok(Arc::new(PaperExchange::new(config.paper.clone())));
    }

    let credentials = mexc_credentials_from_env().context("live trading needs API credentials")?;
    let client = MexcClient::new(
        &config.exchange.base_url,
        Some(credentials),
        Duration::from_secs(config.exchange.request_timeout_secs),
        config.exchange.requests_per_second,
    )?;
    Ok(Arc::new(client))
}

fn create_notifier(config: &BotConfig) -> anyhow::Result<Box<dyn Notifier>> {
    match telegram_from_env(&config.notify.telegram_base_url) {
        Some(telegram) => {
            tracing::info!("📨 Telegram notifications enabled");
            Ok(Box::new(TelegramNotifier::new(telegram)?))
        }
        None => {
            tracing::info!("Telegram not configured, notifications go to the log");
            Ok(Box::new(LogNotifier))
        }
    }
}

fn log_configuration(config: &BotConfig, exchange: &str) {
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Exchange: {}", exchange);
    tracing::info!(
        "  Symbol: {} ({:?}, {} candles)",
        config.exchange.symbol,
        config.exchange.timeframe,
        config.exchange.candle_limit
    );
    tracing::info!(
        "  Leverage: {}x {:?}",
        config.trading.leverage,
        config.trading.margin_mode
    );
    tracing::info!(
        "  Sizing: {:.2}% of {:?} equity",
        config.trading.capital_fraction * 100.0,
        config.trading.sizing_policy
    );
    tracing::info!(
        "  Brackets: SL {:.2}% / TP {:.2}%{}",
        config.trading.stop_loss_pct * 100.0,
        config.trading.take_profit_pct() * 100.0,
        if config.trading.attach_brackets { " (attached)" } else { "" }
    );
    tracing::info!("  Signals: {:?} mode", config.signals.mode);
    tracing::info!(
        "  Poll: every {}s, backoff {}s",
        config.schedule.poll_interval_secs,
        config.schedule.error_backoff_secs
    );
}
