use crate::error::RiskError;
use crate::{EntryPlan, RiskManager};
use configuration::{MarginPolicy, RiskManagement, StopPolicy};
use core_types::Side;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// A concrete implementation of the `RiskManager` trait.
///
/// Margin is either fixed or a fraction of the free balance with a floor;
/// stops are fixed percentage offsets, ATR multiples, or fixed offsets with a
/// ratcheting trailing stop.
#[derive(Debug, Clone)]
pub struct SimpleRiskManager {
    params: RiskManagement,
    leverage: Decimal,
}

impl SimpleRiskManager {
    /// Creates a new `SimpleRiskManager`, validating that the parameters are logical.
    pub fn new(params: RiskManagement, leverage: Decimal) -> Result<Self, RiskError> {
        if leverage <= dec!(0) {
            return Err(RiskError::InvalidParameters("leverage must be greater than 0".to_string()));
        }

        match &params.margin {
            MarginPolicy::Fixed { amount } if *amount <= dec!(0) => {
                return Err(RiskError::InvalidParameters("margin amount must be greater than 0".to_string()));
            }
            MarginPolicy::FractionOfBalance { fraction, floor }
                if *fraction <= dec!(0) || *fraction > dec!(1) || *floor <= dec!(0) =>
            {
                return Err(RiskError::InvalidParameters(
                    "margin fraction must be in (0, 1] and floor greater than 0".to_string(),
                ));
            }
            _ => {}
        }

        match &params.stops {
            StopPolicy::FixedPct { stop_loss_pct, take_profit_pct } => {
                validate_pcts(*stop_loss_pct, *take_profit_pct)?;
            }
            StopPolicy::Atr { atr_sl_multiplier, atr_tp_multiplier } => {
                if *atr_sl_multiplier <= dec!(0) || *atr_tp_multiplier <= dec!(0) {
                    return Err(RiskError::InvalidParameters(
                        "ATR multipliers must be greater than 0".to_string(),
                    ));
                }
            }
            StopPolicy::Trailing { stop_loss_pct, take_profit_pct, trail_pct } => {
                validate_pcts(*stop_loss_pct, *take_profit_pct)?;
                if *trail_pct <= dec!(0) || *trail_pct >= dec!(1) {
                    return Err(RiskError::InvalidParameters("trail_pct must be between 0 and 1".to_string()));
                }
            }
        }

        Ok(Self { params, leverage })
    }
}

fn validate_pcts(stop_loss_pct: Decimal, take_profit_pct: Decimal) -> Result<(), RiskError> {
    if stop_loss_pct <= dec!(0) || stop_loss_pct >= dec!(1) {
        return Err(RiskError::InvalidParameters("stop_loss_pct must be between 0 and 1".to_string()));
    }
    if take_profit_pct <= dec!(0) {
        return Err(RiskError::InvalidParameters("take_profit_pct must be greater than 0".to_string()));
    }
    Ok(())
}

/// Offsets `price` away from the entry: below for a LONG stop, above for a SHORT stop.
fn pct_levels(side: Side, price: Decimal, sl_pct: Decimal, tp_pct: Decimal) -> (Decimal, Decimal) {
    match side {
        Side::Long => (price * (dec!(1) - sl_pct), price * (dec!(1) + tp_pct)),
        Side::Short => (price * (dec!(1) + sl_pct), price * (dec!(1) - tp_pct)),
    }
}

impl RiskManager for SimpleRiskManager {
    fn margin_for(&self, balance: Decimal) -> Decimal {
        match &self.params.margin {
            MarginPolicy::Fixed { amount } => *amount,
            MarginPolicy::FractionOfBalance { fraction, floor } => (balance * fraction).max(*floor),
        }
    }

    fn plan_entry(
        &self,
        side: Side,
        price: Decimal,
        balance: Decimal,
        atr: Option<Decimal>,
    ) -> Result<EntryPlan, RiskError> {
        // --- 1. Validation ---
        if price <= dec!(0) {
            return Err(RiskError::InvalidEntryPrice(price));
        }

        // --- 2. Margin ---
        let margin = self.margin_for(balance);
        if balance < margin {
            return Err(RiskError::InsufficientBalance { balance, required: margin });
        }

        // --- 3. Protective levels ---
        let mut trailing_stop_price = None;
        let mut trail_pct = None;
        let (stop_loss_price, take_profit_price) = match &self.params.stops {
            StopPolicy::FixedPct { stop_loss_pct, take_profit_pct } => {
                pct_levels(side, price, *stop_loss_pct, *take_profit_pct)
            }
            StopPolicy::Atr { atr_sl_multiplier, atr_tp_multiplier } => {
                let atr = match atr {
                    Some(atr) if atr > dec!(0) => atr,
                    other => return Err(RiskError::MissingAtr(other)),
                };
                match side {
                    Side::Long => (price - atr * atr_sl_multiplier, price + atr * atr_tp_multiplier),
                    Side::Short => (price + atr * atr_sl_multiplier, price - atr * atr_tp_multiplier),
                }
            }
            StopPolicy::Trailing { stop_loss_pct, take_profit_pct, trail_pct: pct } => {
                trail_pct = Some(*pct);
                trailing_stop_price = Some(match side {
                    Side::Long => price * (dec!(1) - pct),
                    Side::Short => price * (dec!(1) + pct),
                });
                pct_levels(side, price, *stop_loss_pct, *take_profit_pct)
            }
        };

        if stop_loss_price <= dec!(0) {
            return Err(RiskError::InvalidStopLoss(format!(
                "stop-loss {} at entry {} is not positive",
                stop_loss_price, price
            )));
        }
        if take_profit_price <= dec!(0) {
            return Err(RiskError::Calculation(format!(
                "take-profit {} at entry {} is not positive",
                take_profit_price, price
            )));
        }

        // --- 4. Size ---
        let size = margin
            .checked_mul(self.leverage)
            .and_then(|notional| notional.checked_div(price))
            .ok_or_else(|| RiskError::Calculation("position size overflowed".to_string()))?;
        if size.is_zero() {
            return Err(RiskError::Calculation("position size rounds to zero".to_string()));
        }

        tracing::debug!(%side, %price, %margin, %size, %stop_loss_price, %take_profit_price, "Planned entry");

        Ok(EntryPlan { margin, size, stop_loss_price, take_profit_price, trailing_stop_price, trail_pct })
    }
}
