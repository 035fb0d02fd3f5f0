use core_types::{CloseReason, Position, Side};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Moves the trailing stop toward the price, never away from it.
///
/// LONG stops only rise, SHORT stops only fall. Returns `true` when the stop moved.
/// Positions without a trailing configuration are left untouched.
pub fn ratchet_trailing_stop(position: &mut Position, price: Decimal) -> bool {
    let (Some(trail_pct), Some(current)) = (position.trail_pct, position.trailing_stop_price) else {
        return false;
    };

    let candidate = match position.side {
        Side::Long => price * (dec!(1) - trail_pct),
        Side::Short => price * (dec!(1) + trail_pct),
    };
    let improves = match position.side {
        Side::Long => candidate > current,
        Side::Short => candidate < current,
    };
    if improves {
        position.trailing_stop_price = Some(candidate);
    }
    improves
}

/// The reason `position` must be force-closed at `price`, if any.
///
/// The stop-loss is checked before the trailing stop, and both before the take-profit.
pub fn check_triggers(position: &Position, price: Decimal) -> Option<CloseReason> {
    match position.side {
        Side::Long => {
            if price <= position.stop_loss_price {
                Some(CloseReason::StopLoss)
            } else if position.trailing_stop_price.is_some_and(|ts| price <= ts) {
                Some(CloseReason::TrailingStop)
            } else if price >= position.take_profit_price {
                Some(CloseReason::TakeProfit)
            } else {
                None
            }
        }
        Side::Short => {
            if price >= position.stop_loss_price {
                Some(CloseReason::StopLoss)
            } else if position.trailing_stop_price.is_some_and(|ts| price >= ts) {
                Some(CloseReason::TrailingStop)
            } else if price <= position.take_profit_price {
                Some(CloseReason::TakeProfit)
            } else {
                None
            }
        }
    }
}
