use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::BotError;
use crate::exchange::mexc::{MexcCredentials, MEXC_CONTRACT_API_BASE};
use crate::exchange::PaperConfig;
use crate::indicators::IndicatorConfig;
use crate::models::{MarginMode, Timeframe};
use crate::notify::telegram::{TelegramConfig, TELEGRAM_API_BASE};
use crate::risk::{SizingParams, SizingPolicy};
use crate::strategy::SignalConfig;

const ENV_PREFIX: &str = "SWAPBOT";

/// Immutable bot configuration, built once at startup
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub exchange: ExchangeConfig,
    pub trading: TradingConfig,
    pub indicators: IndicatorConfig,
    pub signals: SignalConfig,
    pub schedule: ScheduleConfig,
    pub notify: NotifyConfig,
    pub paper: PaperConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub base_url: String,
    /// Contract symbol, e.g. BTC_USDT
    pub symbol: String,
    /// Margin currency of the account
    pub quote_currency: String,
    pub timeframe: Timeframe,
    pub candle_limit: usize,
    pub request_timeout_secs: u64,
    pub requests_per_second: u32,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: MEXC_CONTRACT_API_BASE.to_string(),
            symbol: "BTC_USDT".to_string(),
            quote_currency: "USDT".to_string(),
            timeframe: Timeframe::Min15,
            candle_limit: 50,
            request_timeout_secs: 10,
            requests_per_second: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub leverage: u32,
    pub margin_mode: MarginMode,
    /// Share of the selected equity committed as margin per entry
    pub capital_fraction: f64,
    pub sizing_policy: SizingPolicy,
    /// Stop distance as a fraction of the entry price
    pub stop_loss_pct: f64,
    /// Take-profit distance in multiples of the stop distance
    pub reward_ratio: f64,
    /// Embed TP/SL prices in the entry order
    pub attach_brackets: bool,
    /// Close on the same TP/SL distances when the exchange did not
    pub monitor_targets: bool,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            leverage: 10,
            margin_mode: MarginMode::Isolated,
            capital_fraction: 0.01,
            sizing_policy: SizingPolicy::Available,
            stop_loss_pct: 0.01,
            reward_ratio: 2.0,
            attach_brackets: true,
            monitor_targets: true,
        }
    }
}

impl TradingConfig {
    pub fn sizing_params(&self) -> SizingParams {
        SizingParams {
            policy: self.sizing_policy,
            capital_fraction: self.capital_fraction,
            leverage: self.leverage,
        }
    }

    pub fn take_profit_pct(&self) -> f64 {
        self.stop_loss_pct * self.reward_ratio
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub poll_interval_secs: u64,
    /// Sleep after a transient network failure
    pub error_backoff_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            error_backoff_secs: 30,
        }
    }
}

impl ScheduleConfig {
    /// Sleep before the next cycle, given the error the last one ended with
    pub fn delay_after(&self, error: Option<&BotError>) -> Duration {
        match error {
            Some(e) if e.is_transient() => Duration::from_secs(self.error_backoff_secs),
            _ => Duration::from_secs(self.poll_interval_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub telegram_base_url: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            telegram_base_url: TELEGRAM_API_BASE.to_string(),
        }
    }
}

impl BotConfig {
    /// Defaults, then the TOML file, then `SWAPBOT_*` environment overrides
    ///
    /// Without an explicit path `swapbot.toml` in the working directory is used
    /// if present. Nested keys use `__`, e.g. `SWAPBOT_TRADING__LEVERAGE=5`.
    pub fn load(path: Option<&Path>) -> Result<Self, BotError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("swapbot").required(false),
        };

        let config: BotConfig = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BotError> {
        let invalid = |msg: String| Err(BotError::Configuration(msg));

        if self.exchange.symbol.trim().is_empty() {
            return invalid("exchange.symbol must not be empty".to_string());
        }
        if self.exchange.requests_per_second == 0 || self.exchange.request_timeout_secs == 0 {
            return invalid("exchange request rate and timeout must be positive".to_string());
        }

        self.indicators.validate().map_err(BotError::Configuration)?;
        self.signals.validate().map_err(BotError::Configuration)?;

        if self.exchange.candle_limit < self.indicators.min_candles() {
            return invalid(format!(
                "exchange.candle_limit ({}) must cover the indicator warm-up ({} candles)",
                self.exchange.candle_limit,
                self.indicators.min_candles()
            ));
        }

        self.trading
            .sizing_params()
            .validate()
            .map_err(|e| BotError::Configuration(e.to_string()))?;
        if !(self.trading.stop_loss_pct > 0.0 && self.trading.stop_loss_pct < 1.0) {
            return invalid(format!(
                "trading.stop_loss_pct must be in (0, 1), got {}",
                self.trading.stop_loss_pct
            ));
        }
        if self.trading.reward_ratio.is_nan() || self.trading.reward_ratio <= 0.0 {
            return invalid(format!(
                "trading.reward_ratio must be positive, got {}",
                self.trading.reward_ratio
            ));
        }

        if self.schedule.poll_interval_secs == 0 || self.schedule.error_backoff_secs == 0 {
            return invalid("schedule intervals must be positive".to_string());
        }

        Ok(())
    }
}

/// API keys from `MEXC_API_KEY` / `MEXC_SECRET`; missing keys are fatal
pub fn mexc_credentials_from_env() -> Result<MexcCredentials, BotError> {
    mexc_credentials(|key| std::env::var(key).ok())
}

/// Telegram settings from `TELEGRAM_TOKEN` / `TELEGRAM_CHAT_ID`, if both are set
pub fn telegram_from_env(base_url: &str) -> Option<TelegramConfig> {
    telegram(base_url, |key| std::env::var(key).ok())
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|v| !v.trim().is_empty())
}

fn mexc_credentials(lookup: impl Fn(&str) -> Option<String>) -> Result<MexcCredentials, BotError> {
    let api_key = non_empty(&lookup, "MEXC_API_KEY")
        .ok_or_else(|| BotError::Configuration("MEXC_API_KEY not set".to_string()))?;
    let secret = non_empty(&lookup, "MEXC_SECRET")
        .ok_or_else(|| BotError::Configuration("MEXC_SECRET not set".to_string()))?;
    Ok(MexcCredentials { api_key, secret })
}

fn telegram(base_url: &str, lookup: impl Fn(&str) -> Option<String>) -> Option<TelegramConfig> {
    Some(TelegramConfig {
        base_url: base_url.to_string(),
        token: non_empty(&lookup, "TELEGRAM_TOKEN")?,
        chat_id: non_empty(&lookup, "TELEGRAM_CHAT_ID")?,
    })
}
