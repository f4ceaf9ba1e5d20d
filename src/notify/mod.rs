//! Operator notifications
//!
//! Delivery is best effort: a notifier never returns an error to the trading
//! cycle, it logs the failure and moves on.

pub mod telegram;

pub use telegram::{TelegramConfig, TelegramNotifier};

use async_trait::async_trait;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `text` to `channel`. Failures are logged, never raised.
    async fn send_message(&self, channel: &str, text: &str);
}

/// Notifier that only writes to the log, used when no chat is configured
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_message(&self, channel: &str, text: &str) {
        tracing::info!("🔔 [{}] {}", channel, text);
    }
}
