use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::models::Side;

/// Take-profit and stop-loss prices attached to an entry order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Brackets {
    pub take_profit: f64,
    pub stop_loss: f64,
}

/// Fixed percentage brackets expressing a risk:reward ratio
///
/// With `stop_loss_pct = s` and `reward_ratio = r` a long gets SL at `P(1-s)` and
/// TP at `P(1+s·r)`; a short mirrors both. Prices are rounded to `price_step`.
pub fn compute_brackets(
    side: Side,
    reference_price: f64,
    stop_loss_pct: f64,
    reward_ratio: f64,
    price_step: f64,
) -> Option<Brackets> {
    if !reference_price.is_finite() || reference_price <= 0.0 {
        return None;
    }
    if stop_loss_pct <= 0.0 || stop_loss_pct >= 1.0 || reward_ratio <= 0.0 {
        return None;
    }

    let take_profit_pct = stop_loss_pct * reward_ratio;
    let (take_profit, stop_loss) = match side {
        Side::Long => (
            reference_price * (1.0 + take_profit_pct),
            reference_price * (1.0 - stop_loss_pct),
        ),
        Side::Short => (
            reference_price * (1.0 - take_profit_pct),
            reference_price * (1.0 + stop_loss_pct),
        ),
    };

    if take_profit <= 0.0 {
        return None;
    }

    Some(Brackets {
        take_profit: round_to_step(take_profit, price_step),
        stop_loss: round_to_step(stop_loss, price_step),
    })
}

/// Round a price to the nearest multiple of `step`
pub fn round_to_step(price: f64, step: f64) -> f64 {
    let (Some(price_dec), Some(step_dec)) = (Decimal::from_f64(price), Decimal::from_f64(step))
    else {
        return price;
    };
    if step_dec <= Decimal::ZERO {
        return price;
    }

    ((price_dec / step_dec).round() * step_dec)
        .to_f64()
        .unwrap_or(price)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_brackets_one_to_two() {
        let brackets = compute_brackets(Side::Long, 50_000.0, 0.01, 2.0, 0.1).unwrap();
        assert_eq!(brackets.stop_loss, 49_500.0);
        assert_eq!(brackets.take_profit, 51_000.0);
    }

    #[test]
    fn test_short_brackets_mirror() {
        let brackets = compute_brackets(Side::Short, 50_000.0, 0.01, 2.0, 0.1).unwrap();
        assert_eq!(brackets.stop_loss, 50_500.0);
        assert_eq!(brackets.take_profit, 49_000.0);
    }

    #[test]
    fn test_rounded_to_price_step() {
        let brackets = compute_brackets(Side::Long, 123.456, 0.01, 1.5, 0.01).unwrap();
        assert_eq!(brackets.stop_loss, 122.22);
        assert_eq!(brackets.take_profit, 125.31);
    }

    #[test]
    fn test_invalid_inputs_produce_no_brackets() {
        assert!(compute_brackets(Side::Long, 0.0, 0.01, 2.0, 0.1).is_none());
        assert!(compute_brackets(Side::Long, 100.0, 0.0, 2.0, 0.1).is_none());
        // Short take profit would be negative
        assert!(compute_brackets(Side::Short, 100.0, 0.6, 2.0, 0.1).is_none());
    }
}
