use crate::error::BotError;
use crate::exchange::{Exchange, RawPosition};
use crate::models::{MarginMode, OpenPosition, PositionState, Side};

/// Builds the local mirror of the exchange position for one symbol
///
/// Holds no state between cycles. Every call re-derives the position from what
/// the exchange reports.
pub struct PositionTracker {
    symbol: String,
    default_margin_mode: MarginMode,
}

impl PositionTracker {
    pub fn new(symbol: impl Into<String>, default_margin_mode: MarginMode) -> Self {
        Self {
            symbol: symbol.into(),
            default_margin_mode,
        }
    }

    /// Query the exchange and resolve the traded symbol's position
    pub async fn fetch(&self, exchange: &dyn Exchange) -> Result<PositionState, BotError> {
        let records = exchange.fetch_positions(&self.symbol).await?;
        Ok(self.resolve(&records))
    }

    /// First record with a nonzero size wins; null numbers become 0
    pub fn resolve(&self, records: &[RawPosition]) -> PositionState {
        let mut open = records
            .iter()
            .filter(|r| r.symbol.as_deref().map_or(true, |s| s == self.symbol))
            .filter(|r| r.contracts.unwrap_or(0.0) != 0.0);

        let Some(record) = open.next() else {
            return PositionState::Flat;
        };

        let extra = open.count();
        if extra > 0 {
            tracing::warn!(
                "⚠️  {} reported {} extra open positions, using the first",
                self.symbol,
                extra
            );
        }

        let contracts = record.contracts.unwrap_or(0.0);
        let side = record
            .side
            .as_deref()
            .and_then(parse_side)
            .unwrap_or(if contracts < 0.0 { Side::Short } else { Side::Long });

        let margin_mode = match record.margin_mode.as_deref().map(str::to_lowercase).as_deref() {
            Some("isolated") => MarginMode::Isolated,
            Some("cross") | Some("crossed") => MarginMode::Cross,
            _ => self.default_margin_mode,
        };

        let leverage = record
            .leverage
            .filter(|l| l.is_finite() && *l > 0.0)
            .map(|l| l.round() as u32)
            .unwrap_or(0);

        PositionState::Open(OpenPosition {
            side,
            entry_price: record.entry_price.unwrap_or(0.0),
            contract_qty: contracts.abs(),
            leverage,
            margin_mode,
            unrealized_pnl: record.unrealized_pnl.unwrap_or(0.0),
            percentage: record.percentage.unwrap_or(0.0),
        })
    }
}

fn parse_side(raw: &str) -> Option<Side> {
    match raw.trim().to_lowercase().as_str() {
        "long" | "buy" => Some(Side::Long),
        "short" | "sell" => Some(Side::Short),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> PositionTracker {
        PositionTracker::new("BTC_USDT", MarginMode::Isolated)
    }

    fn record(side: &str, contracts: f64) -> RawPosition {
        RawPosition {
            symbol: Some("BTC_USDT".to_string()),
            side: Some(side.to_string()),
            contracts: Some(contracts),
            entry_price: Some(50_000.0),
            leverage: Some(10.0),
            ..RawPosition::default()
        }
    }

    #[test]
    fn test_no_records_is_flat() {
        assert_eq!(tracker().resolve(&[]), PositionState::Flat);
    }

    #[test]
    fn test_zero_size_records_are_ignored() {
        let records = vec![record("long", 0.0), RawPosition::default()];
        assert_eq!(tracker().resolve(&records), PositionState::Flat);
    }

    #[test]
    fn test_first_nonzero_record_is_authoritative() {
        let records = vec![record("long", 0.0), record("short", 4.0), record("long", 9.0)];

        let state = tracker().resolve(&records);
        let position = state.open_position().unwrap();
        assert_eq!(position.side, Side::Short);
        assert_eq!(position.contract_qty, 4.0);
        assert_eq!(position.leverage, 10);
    }

    #[test]
    fn test_null_numbers_coerce_to_zero() {
        let records = vec![RawPosition {
            side: Some("buy".to_string()),
            contracts: Some(2.0),
            ..RawPosition::default()
        }];

        let state = tracker().resolve(&records);
        let position = state.open_position().unwrap();
        assert_eq!(position.side, Side::Long);
        assert_eq!(position.entry_price, 0.0);
        assert_eq!(position.unrealized_pnl, 0.0);
        assert_eq!(position.percentage, 0.0);
        assert_eq!(position.leverage, 0);
        assert_eq!(position.margin_mode, MarginMode::Isolated);
    }

    #[test]
    fn test_side_from_signed_size() {
        let records = vec![RawPosition {
            contracts: Some(-3.0),
            margin_mode: Some("cross".to_string()),
            ..RawPosition::default()
        }];

        let state = tracker().resolve(&records);
        let position = state.open_position().unwrap();
        assert_eq!(position.side, Side::Short);
        assert_eq!(position.contract_qty, 3.0);
        assert_eq!(position.margin_mode, MarginMode::Cross);
    }

    #[test]
    fn test_other_symbols_are_ignored() {
        let records = vec![RawPosition {
            symbol: Some("ETH_USDT".to_string()),
            ..record("long", 1.0)
        }];
        assert_eq!(tracker().resolve(&records), PositionState::Flat);
    }
}
