use crate::error::StrategyError;
use crate::indicators::{Indicator, IndicatorSet};
use crate::{IndicatorRule, PolicyOutcome};
use configuration::TrendFollowingParams;
use core_types::{Decision, Position, Side};

/// EMA trend direction, confirmed by volume and a strong reversal candle at a
/// recent support or resistance level.
///
/// An open position is closed as soon as the trend flips against it.
#[derive(Debug, Clone)]
pub struct TrendFollowing {
    params: TrendFollowingParams,
}

impl TrendFollowing {
    pub fn new(params: TrendFollowingParams) -> Result<Self, StrategyError> {
        if !(params.body_ratio > 0.0 && params.body_ratio <= 1.0) {
            return Err(StrategyError::InvalidParameters(
                "body_ratio must be in (0, 1]".to_string(),
            ));
        }
        if params.volume_factor < 0.0 || params.level_tolerance < 0.0 {
            return Err(StrategyError::InvalidParameters(
                "volume_factor and level_tolerance must be non-negative".to_string(),
            ));
        }
        Ok(Self { params })
    }
}

impl IndicatorRule for TrendFollowing {
    fn min_bars(&self) -> usize {
        self.params.min_bars
    }

    fn evaluate(&self, position: Option<&Position>, _price: f64, indicators: &IndicatorSet) -> PolicyOutcome {
        let (Some(fast), Some(slow)) = (indicators.get(Indicator::EmaFast), indicators.get(Indicator::EmaSlow)) else {
            return PolicyOutcome::hold("EMA values unavailable");
        };
        let uptrend = fast > slow;
        let downtrend = fast < slow;
        if !uptrend && !downtrend {
            return PolicyOutcome::hold("trend is flat");
        }

        if let Some(position) = position {
            return match (position.side, uptrend) {
                (Side::Long, false) => PolicyOutcome::new(Decision::Close, "trend flipped down against LONG"),
                (Side::Short, true) => PolicyOutcome::new(Decision::Close, "trend flipped up against SHORT"),
                _ => PolicyOutcome::hold(format!("{} position still with trend", position.side)),
            };
        }

        let (Some(volume), Some(avg_volume)) = (indicators.get(Indicator::Volume), indicators.get(Indicator::VolumeAvg)) else {
            return PolicyOutcome::hold("volume history unavailable");
        };
        if volume < self.params.volume_factor * avg_volume {
            return PolicyOutcome::hold(format!("volume {:.2} below {:.2}x average {:.2}", volume, self.params.volume_factor, avg_volume));
        }

        let candle = (
            indicators.get(Indicator::LastOpen),
            indicators.get(Indicator::LastHigh),
            indicators.get(Indicator::LastLow),
            indicators.get(Indicator::LastClose),
        );
        let (Some(open), Some(high), Some(low), Some(close)) = candle else {
            return PolicyOutcome::hold("last candle unavailable");
        };
        let range = high - low;
        if range <= 0.0 {
            return PolicyOutcome::hold("last candle has no range");
        }
        let min_body = self.params.body_ratio * range;
        let tolerance = self.params.level_tolerance;

        if uptrend {
            let Some(support) = indicators.get(Indicator::Support) else {
                return PolicyOutcome::hold("support unavailable");
            };
            if close > open && close - open > min_body && low <= support * (1.0 + tolerance) {
                return PolicyOutcome::new(
                    Decision::EnterLong,
                    format!("uptrend bullish rejection of support {:.4}", support),
                );
            }
        } else {
            let Some(resistance) = indicators.get(Indicator::Resistance) else {
                return PolicyOutcome::hold("resistance unavailable");
            };
            if close < open && open - close > min_body && high >= resistance * (1.0 - tolerance) {
                return PolicyOutcome::new(
                    Decision::EnterShort,
                    format!("downtrend bearish rejection of resistance {:.4}", resistance),
                );
            }
        }

        PolicyOutcome::hold(if uptrend { "uptrend without entry setup" } else { "downtrend without entry setup" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{position, set};

    fn rule() -> TrendFollowing {
        TrendFollowing::new(TrendFollowingParams::default()).unwrap()
    }

    fn bullish_setup() -> IndicatorSet {
        set(&[
            (Indicator::EmaFast, 105.0),
            (Indicator::EmaSlow, 100.0),
            (Indicator::Volume, 1000.0),
            (Indicator::VolumeAvg, 900.0),
            (Indicator::LastOpen, 100.2),
            (Indicator::LastHigh, 101.1),
            (Indicator::LastLow, 100.0),
            (Indicator::LastClose, 101.0),
            (Indicator::Support, 100.0),
            (Indicator::Resistance, 110.0),
        ])
    }

    #[test]
    fn bullish_rejection_in_uptrend_enters_long() {
        let outcome = rule().evaluate(None, 101.0, &bullish_setup());
        assert_eq!(outcome.decision, Decision::EnterLong);
    }

    #[test]
    fn thin_volume_holds() {
        let mut indicators = bullish_setup();
        indicators.insert(Indicator::Volume, 500.0);
        assert_eq!(rule().evaluate(None, 101.0, &indicators).decision, Decision::Hold);
    }

    #[test]
    fn weak_body_holds() {
        let mut indicators = bullish_setup();
        indicators.insert(Indicator::LastClose, 100.5);
        assert_eq!(rule().evaluate(None, 100.5, &indicators).decision, Decision::Hold);
    }

    #[test]
    fn bearish_rejection_in_downtrend_enters_short() {
        let indicators = set(&[
            (Indicator::EmaFast, 95.0),
            (Indicator::EmaSlow, 100.0),
            (Indicator::Volume, 1000.0),
            (Indicator::VolumeAvg, 1000.0),
            (Indicator::LastOpen, 109.8),
            (Indicator::LastHigh, 110.0),
            (Indicator::LastLow, 108.9),
            (Indicator::LastClose, 109.0),
            (Indicator::Support, 100.0),
            (Indicator::Resistance, 110.0),
        ]);
        assert_eq!(rule().evaluate(None, 109.0, &indicators).decision, Decision::EnterShort);
    }

    #[test]
    fn trend_flip_closes_open_position() {
        let mut indicators = bullish_setup();
        indicators.insert(Indicator::EmaFast, 95.0);
        let long = position(Side::Long);
        assert_eq!(rule().evaluate(Some(&long), 101.0, &indicators).decision, Decision::Close);

        let short = position(Side::Short);
        assert_eq!(rule().evaluate(Some(&short), 101.0, &indicators).decision, Decision::Hold);
    }

    #[test]
    fn missing_emas_hold() {
        let outcome = rule().evaluate(None, 101.0, &IndicatorSet::default());
        assert_eq!(outcome.decision, Decision::Hold);
    }
}
