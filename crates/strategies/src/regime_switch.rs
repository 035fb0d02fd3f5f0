use crate::error::StrategyError;
use crate::indicators::{Indicator, IndicatorSet};
use crate::mean_reversion::MeanReversion;
use crate::trend_following::TrendFollowing;
use crate::{IndicatorRule, PolicyOutcome};
use configuration::RegimeSwitchParams;
use core_types::Position;

/// Routes each evaluation to trend-following or mean-reversion depending on
/// trend strength as measured by ADX. Between the two thresholds it holds.
#[derive(Debug, Clone)]
pub struct RegimeSwitch {
    params: RegimeSwitchParams,
    trend: TrendFollowing,
    range: MeanReversion,
    adx_warmup: usize,
}

impl RegimeSwitch {
    pub fn new(
        params: RegimeSwitchParams,
        trend: TrendFollowing,
        range: MeanReversion,
        adx_period: usize,
    ) -> Result<Self, StrategyError> {
        if params.adx_range_threshold > params.adx_trend_threshold {
            return Err(StrategyError::InvalidParameters(
                "adx_range_threshold must not exceed adx_trend_threshold".to_string(),
            ));
        }
        Ok(Self { params, trend, range, adx_warmup: 2 * adx_period })
    }
}

impl IndicatorRule for RegimeSwitch {
    fn min_bars(&self) -> usize {
        self.trend.min_bars().max(self.range.min_bars()).max(self.adx_warmup)
    }

    fn evaluate(&self, position: Option<&Position>, price: f64, indicators: &IndicatorSet) -> PolicyOutcome {
        let Some(adx) = indicators.get(Indicator::Adx) else {
            return PolicyOutcome::hold("ADX unavailable");
        };

        let (regime, mut outcome) = if adx > self.params.adx_trend_threshold {
            ("trending", self.trend.evaluate(position, price, indicators))
        } else if adx < self.params.adx_range_threshold {
            ("ranging", self.range.evaluate(position, price, indicators))
        } else {
            return PolicyOutcome::hold(format!("ADX {:.1} between regimes", adx));
        };

        outcome.rationale = format!("[{} ADX {:.1}] {}", regime, adx, outcome.rationale);
        outcome
    }
}
