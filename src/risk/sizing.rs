use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use crate::models::{EquitySnapshot, Instrument};

/// Which equity figure the position size is derived from
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SizingPolicy {
    /// Free margin only
    #[default]
    Available,
    /// Total equity, including margin locked elsewhere
    Total,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SizingError {
    #[error("invalid market state: price is {0}")]
    InvalidMarketState(f64),

    #[error("no capital: equity component is {0}")]
    NoCapital(f64),

    #[error("insufficient capital: sized {quantity} contracts, instrument minimum is {minimum}")]
    InsufficientCapital { quantity: f64, minimum: f64 },

    #[error("invalid sizing parameter: {0}")]
    InvalidParameter(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingParams {
    pub policy: SizingPolicy,
    /// Share of the equity component committed as margin, 0 < f <= 1
    pub capital_fraction: f64,
    pub leverage: u32,
}

impl SizingParams {
    pub fn validate(&self) -> Result<(), SizingError> {
        if !(self.capital_fraction > 0.0 && self.capital_fraction <= 1.0) {
            return Err(SizingError::InvalidParameter(format!(
                "capital fraction must be in (0, 1], got {}",
                self.capital_fraction
            )));
        }
        if self.leverage < 1 {
            return Err(SizingError::InvalidParameter(
                "leverage must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Size an entry order in contracts
///
/// `raw = equity × fraction × leverage / (price × contract_size)`, quantized down to
/// the instrument step with exact decimal arithmetic. Never returns a zero or
/// sub-minimum quantity.
pub fn calculate_order_quantity(
    equity: &EquitySnapshot,
    params: &SizingParams,
    price: f64,
    instrument: &Instrument,
) -> Result<f64, SizingError> {
    params.validate()?;

    if !price.is_finite() || price <= 0.0 {
        return Err(SizingError::InvalidMarketState(price));
    }

    let equity_component = match params.policy {
        SizingPolicy::Available => equity.available,
        SizingPolicy::Total => equity.total,
    };
    if !equity_component.is_finite() || equity_component <= 0.0 {
        return Err(SizingError::NoCapital(equity_component));
    }

    if instrument.qty_step <= 0.0 || instrument.contract_size <= 0.0 {
        return Err(SizingError::InvalidParameter(format!(
            "instrument step {} / contract size {} must be positive",
            instrument.qty_step, instrument.contract_size
        )));
    }

    let equity_dec = to_decimal(equity_component)?;
    let fraction = to_decimal(params.capital_fraction)?;
    let price_dec = to_decimal(price)?;
    let contract_size = to_decimal(instrument.contract_size)?;
    let step = to_decimal(instrument.qty_step)?;

    let notional = equity_dec * fraction * Decimal::from(params.leverage);
    let raw = notional
        .checked_div(price_dec * contract_size)
        .ok_or(SizingError::InvalidMarketState(price))?;
    let quantized = (raw / step).floor() * step;

    let quantity = quantized.to_f64().unwrap_or(0.0);

    tracing::debug!(
        "Sizing: equity={:.4} ({:?}) x {} x {}x / ({} x {}) = {} -> {} (step {}, min {})",
        equity_component,
        params.policy,
        params.capital_fraction,
        params.leverage,
        price,
        instrument.contract_size,
        raw,
        quantized,
        instrument.qty_step,
        instrument.min_qty
    );

    if quantized <= Decimal::ZERO || quantity < instrument.min_qty {
        return Err(SizingError::InsufficientCapital {
            quantity,
            minimum: instrument.min_qty,
        });
    }

    Ok(quantity)
}

fn to_decimal(value: f64) -> Result<Decimal, SizingError> {
    Decimal::from_f64(value)
        .ok_or_else(|| SizingError::InvalidParameter(format!("{} is not representable", value)))
}
