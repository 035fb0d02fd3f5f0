use crate::error::StrategyError;
use crate::indicators::{Indicator, IndicatorSet};
use crate::mean_reversion::MeanReversion;
use crate::{MarketContext, PolicyOutcome, SignalPolicy};
use api_client::SentimentAnalyzer;
use async_trait::async_trait;
use configuration::AiConfirmedParams;
use core_types::{Decision, PolicyId, Position, Side};
use rust_decimal::prelude::*;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

/// A technical pre-filter whose candidates are confirmed or rejected by an
/// external reasoning model.
///
/// The model is only consulted when the pre-filter finds an extreme (RSI or a
/// band breach). Any failure of the model, or a score short of the threshold in
/// the candidate's direction, yields HOLD. Open positions use the
/// mean-reversion middle-band exit.
pub struct AiConfirmed {
    params: AiConfirmedParams,
    context: MarketContext,
    analyzer: Arc<dyn SentimentAnalyzer>,
    exit_rule: MeanReversion,
}

impl AiConfirmed {
    pub fn new(
        params: AiConfirmedParams,
        context: MarketContext,
        analyzer: Arc<dyn SentimentAnalyzer>,
        exit_rule: MeanReversion,
    ) -> Result<Self, StrategyError> {
        if params.prefilter_rsi_low >= params.prefilter_rsi_high {
            return Err(StrategyError::InvalidParameters(
                "prefilter_rsi_low must be below prefilter_rsi_high".to_string(),
            ));
        }
        if !(params.confidence_threshold > 0.0 && params.confidence_threshold <= api_client::sentiment::MAX_CONFIDENCE) {
            return Err(StrategyError::InvalidParameters(
                "confidence_threshold must be in (0, 100]".to_string(),
            ));
        }
        Ok(Self { params, context, analyzer, exit_rule })
    }

    /// The direction worth asking about, if the indicators show an extreme.
    pub fn candidate(&self, price: f64, indicators: &IndicatorSet) -> Option<Side> {
        let rsi = indicators.get(Indicator::Rsi);
        let lower = indicators.get(Indicator::BbLower);
        let upper = indicators.get(Indicator::BbUpper);

        let oversold = rsi.is_some_and(|r| r <= self.params.prefilter_rsi_low) || lower.is_some_and(|l| price <= l);
        let overbought = rsi.is_some_and(|r| r >= self.params.prefilter_rsi_high) || upper.is_some_and(|u| price >= u);

        match (oversold, overbought) {
            (true, false) => Some(Side::Long),
            (false, true) => Some(Side::Short),
            _ => None,
        }
    }

    /// Maps a signed confidence score onto a decision for the candidate side.
    pub fn confirm(&self, candidate: Side, verdict_decision: Decision, score: f64) -> Decision {
        let threshold = self.params.confidence_threshold;
        match candidate {
            Side::Long if score >= threshold && verdict_decision == Decision::EnterLong => Decision::EnterLong,
            Side::Short if score <= -threshold && verdict_decision == Decision::EnterShort => Decision::EnterShort,
            _ => Decision::Hold,
        }
    }
}

/// Renders the market context the reasoning model is asked to judge.
pub fn build_prompt(symbol: &str, price: f64, candidate: Side, indicators: &IndicatorSet) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "You are a disciplined crypto futures analyst.");
    let _ = writeln!(prompt, "Symbol: {}", symbol);
    let _ = writeln!(prompt, "Current price: {:.6}", price);
    let _ = writeln!(prompt, "Technical pre-filter suggests: {}", candidate);
    let _ = writeln!(prompt, "Latest indicators:");
    for (indicator, value) in indicators.iter() {
        let _ = writeln!(prompt, "- {}: {:.4}", indicator, value);
    }
    let _ = writeln!(
        prompt,
        "Respond with a single JSON object and nothing else: \
         {{\"decision\": \"LONG\" | \"SHORT\" | \"HOLD\", \
         \"confidence_score\": <number from -100 (strongly bearish) to 100 (strongly bullish)>, \
         \"reason\": \"<one sentence>\"}}"
    );
    prompt
}

#[async_trait]
impl SignalPolicy for AiConfirmed {
    fn id(&self) -> PolicyId {
        PolicyId::AiConfirmed
    }

    async fn decide(
        &self,
        symbol: &str,
        open_positions: &BTreeMap<String, Position>,
        current_price: Decimal,
    ) -> PolicyOutcome {
        let indicators = match self.context.indicators(symbol, self.params.min_bars).await {
            Ok(indicators) => indicators,
            Err(rationale) => return PolicyOutcome::hold(rationale),
        };
        let atr = indicators.get(Indicator::Atr);
        let Some(price) = current_price.to_f64() else {
            return PolicyOutcome::hold("price not representable");
        };

        if let Some(position) = open_positions.get(symbol) {
            return self.exit_rule.exit(position, price, &indicators).with_atr(atr);
        }

        let Some(candidate) = self.candidate(price, &indicators) else {
            return PolicyOutcome::hold("no technical extreme to confirm");
        };

        let prompt = build_prompt(symbol, price, candidate, &indicators);
        let verdict = match self.analyzer.evaluate(&prompt).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(symbol, error = %e, "Reasoning service unavailable, holding");
                return PolicyOutcome::hold(format!("reasoning unavailable: {}", e));
            }
        };

        let decision = self.confirm(candidate, verdict.decision, verdict.confidence_score);
        PolicyOutcome::new(
            decision,
            format!(
                "{} candidate, model {} at {:.0}: {}",
                candidate, verdict.decision, verdict.confidence_score, verdict.reason
            ),
        )
        .with_atr(atr)
    }
}
