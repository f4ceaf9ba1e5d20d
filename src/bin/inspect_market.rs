//! Market Inspection
//!
//! Fetches public candles for one contract and prints the indicator snapshot
//! and the signal a flat book would get. No credentials needed.

use std::time::Duration;

use clap::Parser;
use swapbot::exchange::{Exchange, MexcClient};
use swapbot::indicators::compute_snapshot;
use swapbot::models::{CandleSeries, PositionState, Timeframe};
use swapbot::strategy::{score_point, DecisionMode, SignalConfig, SignalEvaluator, Strategy};
use swapbot::BotConfig;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Contract symbol
    #[arg(short, long, default_value = "BTC_USDT")]
    symbol: String,

    /// Candle interval (1m, 5m, 15m, 30m, 1h, 4h, 1d)
    #[arg(short, long, default_value = "15m")]
    timeframe: Timeframe,

    /// Number of candles to fetch
    #[arg(short, long, default_value = "50")]
    limit: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = BotConfig::default();

    let client = MexcClient::new(
        &config.exchange.base_url,
        None,
        Duration::from_secs(config.exchange.request_timeout_secs),
        config.exchange.requests_per_second,
    )?;

    println!("\n╔══════════════════════════════════════════════════════╗");
    println!("║     MARKET INSPECTION                                ║");
    println!("╚══════════════════════════════════════════════════════╝\n");

    let ticker = client.fetch_ticker(&args.symbol).await?;
    let candles = client
        .fetch_candles(&args.symbol, args.timeframe, args.limit)
        .await?;
    println!(
        "✓ {} candles for {} ({:?}), last price {:.4}\n",
        candles.len(),
        args.symbol,
        args.timeframe,
        ticker.last_price
    );

    let series = CandleSeries::from_candles(&args.symbol, candles, args.limit)?;
    let gaps = series.count_gaps(args.timeframe.seconds());
    if gaps > 0 {
        println!("⚠️  {} gaps in series\n", gaps);
    }

    let snapshot = compute_snapshot(&series, &config.indicators);
    let Some((previous, current)) = snapshot.points() else {
        println!(
            "⚠️  Not enough data: {} candles, need {}",
            series.len(),
            config.indicators.min_candles()
        );
        return Ok(());
    };

    println!("            | Previous     | Current");
    println!("------------|--------------|-------------");
    println!("Close       | {:>12.4} | {:>12.4}", previous.close, current.close);
    println!("EMA fast    | {:>12.4} | {:>12.4}", previous.fast_ema, current.fast_ema);
    println!("EMA slow    | {:>12.4} | {:>12.4}", previous.slow_ema, current.slow_ema);
    println!("RSI         | {:>12.2} | {:>12.2}", previous.rsi, current.rsi);
    println!("Band upper  | {:>12.4} | {:>12.4}", previous.band_upper, current.band_upper);
    println!("Band lower  | {:>12.4} | {:>12.4}", previous.band_lower, current.band_lower);
    println!(
        "Volume/avg  | {:>12.2} | {:>12.2}",
        previous.volume / previous.volume_avg.max(f64::EPSILON),
        current.volume / current.volume_avg.max(f64::EPSILON)
    );

    println!("\nSignals for a flat book:");
    for mode in [DecisionMode::Threshold, DecisionMode::Scored, DecisionMode::Breakout] {
        let evaluator = SignalEvaluator::new(SignalConfig {
            mode,
            ..SignalConfig::default()
        });
        let signal = evaluator.evaluate(&snapshot, &PositionState::Flat);
        println!("  {:<10} {:?}", format!("{:?}", mode), signal.kind);
    }

    let breakdown = score_point(current, &SignalConfig::default());
    println!(
        "\nScore: trend {:+} oscillator {:+} band {:+} confirmation {:+} = {:+}",
        breakdown.trend,
        breakdown.oscillator,
        breakdown.band,
        breakdown.confirmation,
        breakdown.total()
    );

    Ok(())
}
