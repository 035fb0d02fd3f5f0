use crate::ai_confirmed::AiConfirmed;
use crate::error::StrategyError;
use crate::indicators::IndicatorEngine;
use crate::mean_reversion::MeanReversion;
use crate::regime_switch::RegimeSwitch;
use crate::trend_following::TrendFollowing;
use crate::{MarketContext, SignalPolicy, TechnicalPolicy};
use api_client::{MarketData, SentimentAnalyzer};
use configuration::StrategyConfig;
use core_types::PolicyId;
use std::sync::Arc;

/// Creates the configured policy, validating its parameters.
///
/// `analyzer` is only required by `PolicyId::AiConfirmed`.
pub fn create_policy(
    config: &StrategyConfig,
    market: Arc<dyn MarketData>,
    analyzer: Option<Arc<dyn SentimentAnalyzer>>,
) -> Result<Arc<dyn SignalPolicy>, StrategyError> {
    let engine = IndicatorEngine::new(config.indicators.clone())?;
    let context = MarketContext::new(market, engine, config.interval.clone(), config.history_limit);

    // The compiler errors here if a new PolicyId is added but not handled.
    match config.policy {
        PolicyId::TrendFollowing => {
            let rule = TrendFollowing::new(config.trend_following.clone())?;
            Ok(Arc::new(TechnicalPolicy::new(PolicyId::TrendFollowing, context, rule)))
        }
        PolicyId::MeanReversion => {
            let rule = MeanReversion::new(config.mean_reversion.clone())?;
            Ok(Arc::new(TechnicalPolicy::new(PolicyId::MeanReversion, context, rule)))
        }
        PolicyId::RegimeSwitch => {
            let rule = RegimeSwitch::new(
                config.regime_switch.clone(),
                TrendFollowing::new(config.trend_following.clone())?,
                MeanReversion::new(config.mean_reversion.clone())?,
                config.indicators.adx_period,
            )?;
            Ok(Arc::new(TechnicalPolicy::new(PolicyId::RegimeSwitch, context, rule)))
        }
        PolicyId::AiConfirmed => {
            let analyzer = analyzer.ok_or_else(|| {
                StrategyError::MissingDependency(PolicyId::AiConfirmed.to_string(), "sentiment analyzer".to_string())
            })?;
            let exit_rule = MeanReversion::new(config.mean_reversion.clone())?;
            Ok(Arc::new(AiConfirmed::new(config.ai_confirmed.clone(), context, analyzer, exit_rule)?))
        }
    }
}
