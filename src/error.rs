use thiserror::Error;

use crate::risk::SizingError;

/// Error kinds surfaced by a trading cycle.
///
/// Only `Configuration` is fatal, and only at startup. Everything else is
/// caught by the poll loop, reported, and the loop keeps its cadence.
#[derive(Error, Debug)]
pub enum BotError {
    /// Timeouts, connection failures, rate limits, 5xx. Retried next cycle after backoff.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// The exchange refused the request (bad symbol, precision, margin, ...).
    #[error("exchange rejected request (code {code:?}): {message}")]
    ExchangeRejection { code: Option<i64>, message: String },

    /// Indicator warm-up window not met.
    #[error("insufficient data: {0}")]
    DataInsufficient(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed or out-of-order market data.
    #[error("invalid market data: {0}")]
    MarketData(String),

    #[error("position sizing failed: {0}")]
    Sizing(#[from] SizingError),
}

/// Phrases exchanges use when leverage or margin mode is already at the requested value.
const ALREADY_CONFIGURED_PHRASES: &[&str] = &[
    "already set",
    "already been set",
    "not modified",
    "no need to change",
    "same as",
    "unchanged",
];

impl BotError {
    pub fn rejection(code: Option<i64>, message: impl Into<String>) -> Self {
        Self::ExchangeRejection {
            code,
            message: message.into(),
        }
    }

    /// Whether the poll loop should apply the error backoff instead of the normal interval
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork(_))
    }

    /// True for a rejection that only says the requested setting is already in effect.
    pub fn is_already_configured(&self) -> bool {
        match self {
            Self::ExchangeRejection { message, .. } => {
                let message = message.to_lowercase();
                ALREADY_CONFIGURED_PHRASES
                    .iter()
                    .any(|phrase| message.contains(phrase))
                    || names_current_value(&message)
            }
            _ => false,
        }
    }
}

/// "already 10x", "already 20": the rejection quotes the value in effect
fn names_current_value(message: &str) -> bool {
    message.match_indices("already ").any(|(at, phrase)| {
        message[at + phrase.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit())
    })
}

impl From<reqwest::Error> for BotError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            return Self::TransientNetwork(e.to_string());
        }
        match e.status() {
            Some(status) if status.as_u16() == 429 || status.is_server_error() => {
                Self::TransientNetwork(e.to_string())
            }
            _ if e.is_decode() => Self::MarketData(e.to_string()),
            _ => Self::TransientNetwork(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for BotError {
    fn from(e: serde_json::Error) -> Self {
        Self::MarketData(e.to_string())
    }
}

impl From<config::ConfigError> for BotError {
    fn from(e: config::ConfigError) -> Self {
        Self::Configuration(e.to_string())
    }
}
