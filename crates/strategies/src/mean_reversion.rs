use crate::error::StrategyError;
use crate::indicators::{Indicator, IndicatorSet};
use crate::{IndicatorRule, PolicyOutcome};
use configuration::MeanReversionParams;
use core_types::{Decision, Position, Side};

/// Fades Bollinger Band extremes confirmed by RSI and exits at the middle band.
#[derive(Debug, Clone)]
pub struct MeanReversion {
    params: MeanReversionParams,
}

impl MeanReversion {
    pub fn new(params: MeanReversionParams) -> Result<Self, StrategyError> {
        if params.rsi_oversold >= params.rsi_overbought {
            return Err(StrategyError::InvalidParameters(
                "rsi_oversold must be below rsi_overbought".to_string(),
            ));
        }
        Ok(Self { params })
    }

    /// Exit rule for an open position: revert to the mean, then close.
    pub fn exit(&self, position: &Position, price: f64, indicators: &IndicatorSet) -> PolicyOutcome {
        let Some(middle) = indicators.get(Indicator::BbMiddle) else {
            return PolicyOutcome::hold("middle band unavailable");
        };
        let reverted = match position.side {
            Side::Long => price >= middle,
            Side::Short => price <= middle,
        };
        if reverted {
            PolicyOutcome::new(
                Decision::Close,
                format!("{} reverted to middle band {:.4}", position.side, middle),
            )
        } else {
            PolicyOutcome::hold(format!("{} waiting for middle band {:.4}", position.side, middle))
        }
    }
}

impl IndicatorRule for MeanReversion {
    fn min_bars(&self) -> usize {
        self.params.min_bars
    }

    fn evaluate(&self, position: Option<&Position>, price: f64, indicators: &IndicatorSet) -> PolicyOutcome {
        if let Some(position) = position {
            return self.exit(position, price, indicators);
        }

        let bands = (
            indicators.get(Indicator::BbUpper),
            indicators.get(Indicator::BbLower),
            indicators.get(Indicator::Rsi),
        );
        let (Some(upper), Some(lower), Some(rsi)) = bands else {
            return PolicyOutcome::hold("bands or RSI unavailable");
        };

        if price <= lower && rsi < self.params.rsi_oversold {
            PolicyOutcome::new(
                Decision::EnterLong,
                format!("price {:.4} at lower band {:.4}, RSI {:.1} oversold", price, lower, rsi),
            )
        } else if price >= upper && rsi > self.params.rsi_overbought {
            PolicyOutcome::new(
                Decision::EnterShort,
                format!("price {:.4} at upper band {:.4}, RSI {:.1} overbought", price, upper, rsi),
            )
        } else {
            PolicyOutcome::hold(format!("price inside bands, RSI {:.1}", rsi))
        }
    }
}
